//! Predicate evaluation over Arrow batches
//!
//! Every sub-expression evaluates to a full-length array; literals are
//! broadcast to the batch length. Comparison and arithmetic operands are
//! coerced pairwise before the Arrow kernel runs:
//!
//! - a `NULL` side takes the other side's type
//! - mixed Int64 / Float64 becomes Float64
//! - a Utf8 side is cast to the other side's type (unparseable values become null)
//!
//! Boolean connectives use Kleene logic; rows whose mask is null are dropped.

use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow::compute::kernels::comparison::{ilike, like};
use arrow::compute::kernels::{boolean, cmp, numeric};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::DataType;
use sqlparser::ast::{BinaryOperator, Expr, Ident, UnaryOperator, Value};

use super::fail;
use crate::Result;

/// Keep the rows of `batch` for which `predicate` is true.
pub(crate) fn filter(batch: &RecordBatch, predicate: &Expr) -> Result<RecordBatch> {
    let mask = Evaluator { batch }.eval_boolean(predicate, "WHERE expression")?;
    Ok(filter_record_batch(batch, &mask)?)
}

struct Evaluator<'a> {
    batch: &'a RecordBatch,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Result<ArrayRef> {
        match expr {
            Expr::Identifier(ident) => self.column(ident),
            Expr::Value(value) => self.literal(value),
            Expr::Nested(inner) => self.eval(inner),
            Expr::UnaryOp { op, expr } => self.unary(op, expr),
            Expr::BinaryOp { left, op, right } => self.binary(op, left, right),
            Expr::IsNull(inner) => Ok(Arc::new(boolean::is_null(&self.eval(inner)?)?)),
            Expr::IsNotNull(inner) => Ok(Arc::new(boolean::is_not_null(&self.eval(inner)?)?)),
            Expr::IsTrue(inner) => self.truth(inner, true, false),
            Expr::IsNotTrue(inner) => self.truth(inner, true, true),
            Expr::IsFalse(inner) => self.truth(inner, false, false),
            Expr::IsNotFalse(inner) => self.truth(inner, false, true),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let value = self.eval(expr)?;
                let above = compare(&BinaryOperator::GtEq, value.clone(), self.eval(low)?)?;
                let below = compare(&BinaryOperator::LtEq, value, self.eval(high)?)?;
                negate_if(boolean::and_kleene(&above, &below)?, *negated)
            }
            Expr::InList { expr, list, negated } => {
                let value = self.eval(expr)?;
                let mut any: Option<BooleanArray> = None;
                for item in list {
                    let hit = compare(&BinaryOperator::Eq, value.clone(), self.eval(item)?)?;
                    any = Some(match any {
                        Some(acc) => boolean::or_kleene(&acc, &hit)?,
                        None => hit,
                    });
                }
                let any = any.unwrap_or_else(|| BooleanArray::from(vec![false; self.batch.num_rows()]));
                negate_if(any, *negated)
            }
            Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => self.pattern_match(expr, pattern, escape_char.is_some(), *negated, false),
            Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => self.pattern_match(expr, pattern, escape_char.is_some(), *negated, true),
            other => fail(format!("unsupported expression: {other}")),
        }
    }

    fn eval_boolean(&self, expr: &Expr, context: &str) -> Result<BooleanArray> {
        as_boolean(self.eval(expr)?, context)
    }

    fn column(&self, ident: &Ident) -> Result<ArrayRef> {
        let schema = self.batch.schema();
        let index = schema.index_of(&ident.value).ok().or_else(|| {
            if ident.quote_style.is_some() {
                return None;
            }
            schema
                .fields()
                .iter()
                .position(|f| f.name().eq_ignore_ascii_case(&ident.value))
        });
        match index {
            Some(i) => Ok(self.batch.column(i).clone()),
            None => fail(format!("Referenced column {:?} not found", ident.value)),
        }
    }

    fn literal(&self, value: &Value) -> Result<ArrayRef> {
        let n = self.batch.num_rows();
        let array: ArrayRef = match value {
            Value::Number(raw, _) => {
                if let Ok(int) = raw.parse::<i64>() {
                    Arc::new(Int64Array::from(vec![int; n]))
                } else if let Ok(float) = raw.parse::<f64>() {
                    Arc::new(Float64Array::from(vec![float; n]))
                } else {
                    return fail(format!("invalid number literal {raw}"));
                }
            }
            Value::SingleQuotedString(s) => Arc::new(StringArray::from(vec![s.as_str(); n])),
            Value::Boolean(b) => Arc::new(BooleanArray::from(vec![*b; n])),
            Value::Null => new_null_array(&DataType::Null, n),
            other => return fail(format!("unsupported literal: {other}")),
        };
        Ok(array)
    }

    fn unary(&self, op: &UnaryOperator, expr: &Expr) -> Result<ArrayRef> {
        match op {
            UnaryOperator::Not => Ok(Arc::new(boolean::not(&self.eval_boolean(expr, "NOT operand")?)?)),
            UnaryOperator::Minus | UnaryOperator::Plus => {
                let value = self.eval(expr)?;
                let value = match value.data_type() {
                    DataType::Null => cast(&value, &DataType::Int64)?,
                    DataType::Int64 | DataType::Float64 => value,
                    other => return fail(format!("cannot apply {op} to {other}")),
                };
                if matches!(op, UnaryOperator::Minus) {
                    Ok(numeric::neg(&value)?)
                } else {
                    Ok(value)
                }
            }
            other => fail(format!("unsupported operator: {other}")),
        }
    }

    fn binary(&self, op: &BinaryOperator, left: &Expr, right: &Expr) -> Result<ArrayRef> {
        match op {
            BinaryOperator::And => {
                let l = self.eval_boolean(left, "AND operand")?;
                let r = self.eval_boolean(right, "AND operand")?;
                Ok(Arc::new(boolean::and_kleene(&l, &r)?))
            }
            BinaryOperator::Or => {
                let l = self.eval_boolean(left, "OR operand")?;
                let r = self.eval_boolean(right, "OR operand")?;
                Ok(Arc::new(boolean::or_kleene(&l, &r)?))
            }
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => Ok(Arc::new(compare(op, self.eval(left)?, self.eval(right)?)?)),
            BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo => arithmetic(op, self.eval(left)?, self.eval(right)?),
            other => fail(format!("unsupported operator: {other}")),
        }
    }

    fn truth(&self, expr: &Expr, want: bool, negated: bool) -> Result<ArrayRef> {
        let values = self.eval_boolean(expr, "IS TRUE / IS FALSE operand")?;
        let out: BooleanArray = values
            .iter()
            .map(|v| Some((v == Some(want)) != negated))
            .collect();
        Ok(Arc::new(out))
    }

    fn pattern_match(
        &self,
        expr: &Expr,
        pattern: &Expr,
        has_escape: bool,
        negated: bool,
        case_insensitive: bool,
    ) -> Result<ArrayRef> {
        if has_escape {
            return fail("ESCAPE is not supported in LIKE patterns");
        }
        let value = as_utf8(self.eval(expr)?, "LIKE operand")?;
        let pattern = as_utf8(self.eval(pattern)?, "LIKE pattern")?;
        let matched = if case_insensitive {
            ilike(&value, &pattern)?
        } else {
            like(&value, &pattern)?
        };
        negate_if(matched, negated)
    }
}

fn negate_if(mask: BooleanArray, negated: bool) -> Result<ArrayRef> {
    if negated {
        Ok(Arc::new(boolean::not(&mask)?))
    } else {
        Ok(Arc::new(mask))
    }
}

fn compare(op: &BinaryOperator, left: ArrayRef, right: ArrayRef) -> Result<BooleanArray> {
    let (l, r) = coerce_comparison(left, right)?;
    let out = match op {
        BinaryOperator::Eq => cmp::eq(&l, &r)?,
        BinaryOperator::NotEq => cmp::neq(&l, &r)?,
        BinaryOperator::Lt => cmp::lt(&l, &r)?,
        BinaryOperator::LtEq => cmp::lt_eq(&l, &r)?,
        BinaryOperator::Gt => cmp::gt(&l, &r)?,
        BinaryOperator::GtEq => cmp::gt_eq(&l, &r)?,
        other => return fail(format!("unsupported comparison: {other}")),
    };
    Ok(out)
}

fn coerce_comparison(left: ArrayRef, right: ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    let lt = left.data_type().clone();
    let rt = right.data_type().clone();
    if lt == rt {
        return Ok((left, right));
    }
    match (&lt, &rt) {
        (DataType::Null, _) => Ok((cast(&left, &rt)?, right)),
        (_, DataType::Null) => Ok((left, cast(&right, &lt)?)),
        (a, b) if is_numeric(a) && is_numeric(b) => Ok((
            cast(&left, &DataType::Float64)?,
            cast(&right, &DataType::Float64)?,
        )),
        (DataType::Utf8, _) => Ok((cast(&left, &rt)?, right)),
        (_, DataType::Utf8) => Ok((left, cast(&right, &lt)?)),
        _ => fail(format!("cannot compare {lt} with {rt}")),
    }
}

fn arithmetic(op: &BinaryOperator, left: ArrayRef, right: ArrayRef) -> Result<ArrayRef> {
    let (l, r) = coerce_numeric(op, left, right)?;
    let out = match op {
        BinaryOperator::Plus => numeric::add(&l, &r)?,
        BinaryOperator::Minus => numeric::sub(&l, &r)?,
        BinaryOperator::Multiply => numeric::mul(&l, &r)?,
        BinaryOperator::Divide => numeric::div(&l, &r)?,
        BinaryOperator::Modulo => numeric::rem(&l, &r)?,
        other => return fail(format!("unsupported operator: {other}")),
    };
    Ok(out)
}

/// Division always yields Float64, matching `1 / 2 = 0.5`.
fn coerce_numeric(op: &BinaryOperator, left: ArrayRef, right: ArrayRef) -> Result<(ArrayRef, ArrayRef)> {
    let numeric_or_null = |a: &ArrayRef| -> Result<ArrayRef> {
        match a.data_type() {
            DataType::Null => Ok(cast(a, &DataType::Int64)?),
            DataType::Int64 | DataType::Float64 => Ok(a.clone()),
            other => fail(format!("cannot apply {op} to {other}")),
        }
    };
    let l = numeric_or_null(&left)?;
    let r = numeric_or_null(&right)?;
    if l.data_type() == r.data_type() && !matches!(op, BinaryOperator::Divide) {
        return Ok((l, r));
    }
    Ok((cast(&l, &DataType::Float64)?, cast(&r, &DataType::Float64)?))
}

fn is_numeric(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Int64 | DataType::Float64)
}

fn as_boolean(array: ArrayRef, context: &str) -> Result<BooleanArray> {
    let array = match array.data_type() {
        DataType::Boolean => array,
        DataType::Null => cast(&array, &DataType::Boolean)?,
        other => return fail(format!("{context} must be boolean, got {other}")),
    };
    match array.as_any().downcast_ref::<BooleanArray>() {
        Some(mask) => Ok(mask.clone()),
        None => fail(format!("{context} must be boolean")),
    }
}

fn as_utf8(array: ArrayRef, context: &str) -> Result<ArrayRef> {
    match array.data_type() {
        DataType::Utf8 => Ok(array),
        DataType::Null => Ok(cast(&array, &DataType::Utf8)?),
        other => fail(format!("{context} must be text, got {other}")),
    }
}
