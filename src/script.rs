//! ConfigContract Discovery - load a training script's contract and entry point
//!
//! Scripts run in their own interpreter process, chosen by file extension.
//! The loader talks to a script through the environment and stdout:
//!
//! ```text
//! describe:  OX_MODE=describe            stdout: one JSON symbol table
//! run:       OX_MODE=run OX_CONFIG=<json> stdout: free text and protocol lines
//!            @ox {"metrics": {"loss": 0.5}, "step": 1}
//! ```
//!
//! The symbol table must export `Config` (kind `schema`, with a field list)
//! and `main` (kind `callable`). Scripts execute arbitrary code in both modes;
//! the only isolation is the process boundary.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::contract::{ConfigContract, ConfigInstance, FieldSpec};
use crate::tracker::Tracker;
use crate::{Error, Result};

/// Environment variable selecting the script mode.
pub const MODE_ENV: &str = "OX_MODE";
/// Environment variable carrying the resolved config in run mode.
pub const CONFIG_ENV: &str = "OX_CONFIG";
/// Prefix of stdout lines forwarded to the tracker.
pub const PROTOCOL_PREFIX: &str = "@ox ";

const CONTRACT_SYMBOL: &str = "Config";
const ENTRY_SYMBOL: &str = "main";

#[derive(Debug, Deserialize)]
struct SymbolDescriptor {
    kind: String,
    #[serde(default)]
    fields: Option<Vec<FieldSpec>>,
}

#[derive(Debug, Deserialize)]
struct ProtocolMessage {
    #[serde(default)]
    metrics: Map<String, Value>,
    #[serde(default)]
    step: Option<u64>,
}

/// Discovers contracts and entry points in scripts.
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    interpreters: BTreeMap<String, Vec<String>>,
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::new()
            .with_interpreter("py", ["python3"])
            .with_interpreter("sh", ["sh"])
    }
}

impl ScriptLoader {
    /// Loader with no interpreters registered.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interpreters: BTreeMap::new(),
        }
    }

    /// Register (or replace) the command that runs scripts with `extension`.
    /// The script path is appended after `command`.
    #[must_use]
    pub fn with_interpreter<I, S>(mut self, extension: &str, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = command.into_iter().map(Into::into).collect();
        self.interpreters
            .insert(extension.trim_start_matches('.').to_string(), command);
        self
    }

    /// Interpreter command for a script path.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when no interpreter is registered for the extension.
    pub fn interpreter_for(&self, path: &Path) -> Result<&[String]> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        self.interpreters
            .get(extension)
            .filter(|command| !command.is_empty())
            .map(Vec::as_slice)
            .ok_or_else(|| {
                let known: Vec<&str> = self.interpreters.keys().map(String::as_str).collect();
                Error::InvalidInput(format!(
                    "No interpreter registered for {} (known extensions: {})",
                    path.display(),
                    known.join(", ")
                ))
            })
    }

    /// Run `path` in describe mode and extract its contract and entry point.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the path does not exist
    /// - `InvalidInput` if it is not a file or has no registered interpreter
    /// - `LoadError` if the describe run fails or prints a malformed table
    /// - `ContractMissing` if no `Config` schema is exported
    /// - `EntryMissing` if no callable `main` is exported
    pub fn discover(&self, path: &Path) -> Result<DiscoveredScript> {
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Script not found: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(Error::InvalidInput(format!(
                "Expected a script file: {}",
                path.display()
            )));
        }
        let interpreter = self.interpreter_for(path)?.to_vec();

        let output = command(&interpreter, path)
            .env(MODE_ENV, "describe")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::load(path, format!("failed to start {}: {e}", interpreter[0])))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::load(
                path,
                format!("describe run exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let symbols = parse_symbol_table(&stdout).ok_or_else(|| {
            Error::load(path, "describe output is not a JSON object of exported symbols")
        })?;

        let contract = extract_contract(path, &symbols)?;
        match symbols.get(ENTRY_SYMBOL).map(descriptor) {
            Some(Ok(entry)) if entry.kind == "callable" => {}
            Some(Err(e)) => return Err(Error::load(path, format!("malformed descriptor for {ENTRY_SYMBOL}: {e}"))),
            _ => {
                return Err(Error::EntryMissing {
                    path: path.to_path_buf(),
                })
            }
        }

        debug!(script = %path.display(), fields = contract.fields().len(), "discovered script contract");
        Ok(DiscoveredScript {
            contract,
            entry: EntryPoint {
                path: path.to_path_buf(),
                interpreter,
            },
        })
    }
}

/// Discover with the default interpreter table.
///
/// # Errors
///
/// See [`ScriptLoader::discover`].
pub fn discover(path: &Path) -> Result<DiscoveredScript> {
    ScriptLoader::default().discover(path)
}

/// The whole stdout, or failing that its last non-empty line, as a JSON object.
fn parse_symbol_table(stdout: &str) -> Option<Map<String, Value>> {
    let whole = serde_json::from_str::<Map<String, Value>>(stdout.trim()).ok();
    whole.or_else(|| {
        let last = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
        serde_json::from_str(last.trim()).ok()
    })
}

fn descriptor(value: &Value) -> std::result::Result<SymbolDescriptor, serde_json::Error> {
    SymbolDescriptor::deserialize(value)
}

fn extract_contract(path: &Path, symbols: &Map<String, Value>) -> Result<ConfigContract> {
    let missing = || Error::ContractMissing {
        path: path.to_path_buf(),
    };
    let value = symbols.get(CONTRACT_SYMBOL).ok_or_else(missing)?;
    let symbol = descriptor(value)
        .map_err(|e| Error::load(path, format!("malformed descriptor for {CONTRACT_SYMBOL}: {e}")))?;
    if symbol.kind != "schema" {
        return Err(missing());
    }
    let fields = symbol
        .fields
        .ok_or_else(|| Error::load(path, format!("{CONTRACT_SYMBOL} schema declares no fields")))?;
    ConfigContract::new(CONTRACT_SYMBOL, fields).map_err(|e| Error::load(path, e))
}

fn command(interpreter: &[String], path: &Path) -> Command {
    let mut cmd = Command::new(&interpreter[0]);
    cmd.args(&interpreter[1..]).arg(path);
    cmd
}

/// A script whose contract and entry point were found.
#[derive(Debug, Clone)]
pub struct DiscoveredScript {
    /// Declared config contract
    pub contract: ConfigContract,
    /// Callable training entry point
    pub entry: EntryPoint,
}

/// Handle on a script's `main`.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    path: PathBuf,
    interpreter: Vec<String>,
}

impl EntryPoint {
    /// Script path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the script with `config`, forwarding protocol lines to `tracker`.
    ///
    /// # Errors
    ///
    /// `EntryFailed` if the process cannot start or exits unsuccessfully;
    /// any tracker error stops the run and is returned as is.
    pub fn invoke(&self, config: &ConfigInstance, tracker: &mut dyn Tracker) -> Result<()> {
        let mut child = command(&self.interpreter, &self.path)
            .env(MODE_ENV, "run")
            .env(CONFIG_ENV, config.to_json().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::EntryFailed(format!("failed to start {}: {e}", self.path.display()))
            })?;

        if let Err(e) = self.forward_output(&mut child, tracker) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(Error::EntryFailed(format!(
                "{} exited with {status}",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn forward_output(&self, child: &mut Child, tracker: &mut dyn Tracker) -> Result<()> {
        let Some(stdout) = child.stdout.take() else {
            return Ok(());
        };
        let script = self.path.display();
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let decoded = String::from_utf8_lossy(&buf);
            let line = decoded.trim_end_matches(['\n', '\r']);
            let Some(payload) = line.strip_prefix(PROTOCOL_PREFIX) else {
                info!(%script, "{line}");
                continue;
            };
            match serde_json::from_str::<ProtocolMessage>(payload) {
                Ok(message) => tracker.log(&message.metrics, message.step)?,
                Err(e) => warn!(%script, error = %e, "skipping malformed protocol line"),
            }
        }
        Ok(())
    }
}
