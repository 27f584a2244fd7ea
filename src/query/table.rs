//! Rows ⇄ Arrow `RecordBatch`
//!
//! Column types come from the first non-null value in each column:
//!
//! | JSON value        | Arrow type |
//! |-------------------|------------|
//! | bool              | Boolean    |
//! | integer           | Int64      |
//! | float             | Float64    |
//! | anything else     | Utf8       |
//!
//! An Int64 column that later meets a float widens to Float64. Utf8 columns
//! render every non-string value as JSON text, so lists and objects can be
//! matched with `LIKE`. The text uses `", "` between items and `": "` after
//! keys, so `tags = '["baseline", "v2"]'` matches a two-tag list. Non-ASCII
//! characters are written as-is.

use std::io;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Number, Value};

use super::{fail, Row};
use crate::{Error, Result};

/// Union of row keys in first-seen order.
pub(crate) fn column_names(rows: &[Row]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    names
}

/// Build a batch with one row per input row; missing cells are null.
pub(crate) fn to_batch(rows: &[Row], columns: &[String]) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

    for name in columns {
        let data_type = infer_type(rows, name);
        let cells = rows.iter().map(|row| row.get(name).unwrap_or(&Value::Null));
        let array: ArrayRef = match data_type {
            DataType::Boolean => Arc::new(
                cells
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Bool(b) => Ok(Some(*b)),
                        other => inconvertible(name, other, &data_type),
                    })
                    .collect::<Result<BooleanArray>>()?,
            ),
            DataType::Int64 => Arc::new(
                cells
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Number(n) if n.is_i64() => Ok(n.as_i64()),
                        other => inconvertible(name, other, &data_type),
                    })
                    .collect::<Result<Int64Array>>()?,
            ),
            DataType::Float64 => Arc::new(
                cells
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::Number(n) => Ok(n.as_f64()),
                        other => inconvertible(name, other, &data_type),
                    })
                    .collect::<Result<Float64Array>>()?,
            ),
            _ => Arc::new(
                cells
                    .map(|v| match v {
                        Value::Null => Ok(None),
                        Value::String(s) => Ok(Some(s.clone())),
                        other => json_text(other).map(Some),
                    })
                    .collect::<Result<StringArray>>()?,
            ),
        };
        fields.push(Field::new(name.as_str(), array.data_type().clone(), true));
        arrays.push(array);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// `serde_json` compact output with a space after `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn json_text(value: &Value) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, SpacedFormatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::InvalidInput(format!("cannot render {value} as text: {e}")))?;
    String::from_utf8(out).map_err(|e| Error::InvalidInput(e.to_string()))
}

fn infer_type(rows: &[Row], name: &str) -> DataType {
    let mut inferred: Option<DataType> = None;
    for value in rows.iter().filter_map(|row| row.get(name)) {
        let seen = match value {
            Value::Null => continue,
            Value::Bool(_) => DataType::Boolean,
            Value::Number(n) if n.is_i64() => DataType::Int64,
            Value::Number(_) => DataType::Float64,
            _ => DataType::Utf8,
        };
        match &inferred {
            None => inferred = Some(seen),
            Some(DataType::Int64) if seen == DataType::Float64 => inferred = Some(DataType::Float64),
            Some(_) => {}
        }
    }
    inferred.unwrap_or(DataType::Utf8)
}

fn inconvertible<T>(column: &str, value: &Value, data_type: &DataType) -> Result<T> {
    fail(format!("cannot convert {value} in column {column:?} to {data_type}"))
}

/// Convert a batch back to JSON rows, keeping column order.
pub(crate) fn to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let schema = batch.schema();
    let mut rows = vec![Row::new(); batch.num_rows()];

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        for (i, row) in rows.iter_mut().enumerate() {
            row.insert(field.name().clone(), cell(column.as_ref(), i)?);
        }
    }
    Ok(rows)
}

fn cell(column: &dyn Array, i: usize) -> Result<Value> {
    if column.is_null(i) {
        return Ok(Value::Null);
    }
    let any = column.as_any();
    let value = match column.data_type() {
        DataType::Boolean => any.downcast_ref::<BooleanArray>().map(|a| Value::Bool(a.value(i))),
        DataType::Int64 => any.downcast_ref::<Int64Array>().map(|a| Value::from(a.value(i))),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| Number::from_f64(a.value(i)).map_or(Value::Null, Value::Number)),
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|a| Value::String(a.value(i).to_string())),
        _ => None,
    };
    value.map_or_else(|| fail(format!("unsupported column type {}", column.data_type())), Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_column_union_first_seen_order() {
        let rows = rows(vec![json!({"id": "a", "lr": 0.1}), json!({"id": "b", "seed": 1})]);
        assert_eq!(column_names(&rows), vec!["id", "lr", "seed"]);
    }

    #[test]
    fn test_types_inferred_from_values() {
        let rows = rows(vec![json!({"b": true, "i": 1, "f": 0.5, "s": "x", "l": [1, 2]})]);
        let batch = to_batch(&rows, &column_names(&rows)).unwrap();
        let types: Vec<DataType> = batch.schema().fields().iter().map(|f| f.data_type().clone()).collect();
        assert_eq!(
            types,
            vec![DataType::Boolean, DataType::Int64, DataType::Float64, DataType::Utf8, DataType::Utf8]
        );
    }

    #[test]
    fn test_int_column_widens_to_float() {
        let rows = rows(vec![json!({"lr": 1}), json!({"lr": 0.5})]);
        let batch = to_batch(&rows, &column_names(&rows)).unwrap();
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_string_in_numeric_column_is_error() {
        let rows = rows(vec![json!({"lr": 1}), json!({"lr": "fast"})]);
        let err = to_batch(&rows, &column_names(&rows)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::QueryError);
    }

    #[test]
    fn test_missing_cells_round_trip_as_null() {
        let rows = rows(vec![json!({"id": "a", "lr": 0.1}), json!({"id": "b"})]);
        let columns = column_names(&rows);
        let back = to_rows(&to_batch(&rows, &columns).unwrap()).unwrap();
        assert_eq!(back[1]["lr"], Value::Null);
        assert_eq!(back[0]["lr"], json!(0.1));
    }

    #[test]
    fn test_lists_render_as_json_text() {
        let rows = rows(vec![json!({"tags": ["baseline", "v2"]})]);
        let back = to_rows(&to_batch(&rows, &column_names(&rows)).unwrap()).unwrap();
        assert_eq!(back[0]["tags"], json!("[\"baseline\", \"v2\"]"));
    }

    #[test]
    fn test_objects_render_with_spaced_separators() {
        let rows = rows(vec![json!({"id": "a", "opt": {"name": "adam", "betas": [0.9, 0.99]}})]);
        let back = to_rows(&to_batch(&rows, &column_names(&rows)).unwrap()).unwrap();
        assert_eq!(back[0]["opt"], json!("{\"name\": \"adam\", \"betas\": [0.9, 0.99]}"));
    }
}
