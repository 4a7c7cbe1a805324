//! Call arguments for a Space endpoint.
//!
//! Command-line parameters come in two shapes: `key=value` pairs (keyword)
//! and bare values (positional). Values are JSON-decoded when they parse as
//! JSON and kept as strings otherwise. A value that names an existing file
//! with a known media/data extension becomes a file input, which the session
//! uploads before calling the endpoint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

use super::{EndpointInfo, RunnerError, RunnerResult};

pub const FILE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".wav", ".mp3", ".txt", ".json", ".csv", ".glb", ".gltf",
    ".mp4", ".avi", ".mov",
];

#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Json(Value),
    File(PathBuf),
}

impl InputValue {
    /// Parses a single command-line value.
    pub fn parse(raw: &str) -> Self {
        if has_file_extension(raw) {
            let path = Path::new(raw);
            if path.exists() {
                return InputValue::File(path.to_path_buf());
            }
            warn!("File path '{}' does not exist. Passing as string.", raw);
            return InputValue::Json(Value::String(raw.to_string()));
        }
        match serde_json::from_str(raw) {
            Ok(value) => InputValue::Json(value),
            Err(_) => InputValue::Json(Value::String(raw.to_string())),
        }
    }

    /// JSON form used when recording the parameters of a run.
    pub fn to_json(&self) -> Value {
        match self {
            InputValue::Json(value) => value.clone(),
            InputValue::File(path) => Value::String(path.display().to_string()),
        }
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Json(value)
    }
}

fn has_file_extension(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    FILE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<InputValue>,
    pub keyword: BTreeMap<String, InputValue>,
}

impl CallArgs {
    pub fn positional(values: impl IntoIterator<Item = InputValue>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keyword: BTreeMap::new(),
        }
    }

    pub fn parse<S: AsRef<str>>(params: &[S]) -> Self {
        let mut args = CallArgs::default();
        for item in params {
            let item = item.as_ref();
            match item.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    args.keyword.insert(key.to_string(), InputValue::parse(value));
                }
                _ => args.positional.push(InputValue::parse(item)),
            }
        }
        args
    }

    /// Parameters as stored alongside a result: keywords when given,
    /// otherwise positionals keyed `arg0`, `arg1`, ...
    pub fn to_parameters_json(&self) -> Value {
        let map: Map<String, Value> = if self.keyword.is_empty() {
            self.positional
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("arg{}", i), v.to_json()))
                .collect()
        } else {
            self.keyword
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect()
        };
        Value::Object(map)
    }

    /// Lays the arguments out in the endpoint's declared parameter order.
    ///
    /// Positionals fill the leading slots, keywords fill slots by name, and
    /// any slot left over takes its declared default.
    pub fn resolve(&self, api_name: &str, endpoint: &EndpointInfo) -> RunnerResult<Vec<InputValue>> {
        if self.keyword.is_empty() {
            return Ok(self.positional.clone());
        }

        let mut remaining = self.keyword.clone();
        let mut inputs = Vec::with_capacity(endpoint.parameters.len());

        for (index, param) in endpoint.parameters.iter().enumerate() {
            if let Some(value) = self.positional.get(index) {
                inputs.push(value.clone());
                continue;
            }
            let name = param
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("param_{}", index));
            if let Some(value) = remaining.remove(&name) {
                inputs.push(value);
            } else if param.parameter_has_default {
                inputs.push(InputValue::Json(
                    param.parameter_default.clone().unwrap_or(Value::Null),
                ));
            } else {
                return Err(RunnerError::MissingArgument {
                    api_name: api_name.to_string(),
                    parameter: name,
                });
            }
        }

        if let Some(argument) = remaining.into_keys().next() {
            return Err(RunnerError::UnknownArgument {
                api_name: api_name.to_string(),
                argument,
            });
        }
        Ok(inputs)
    }
}
