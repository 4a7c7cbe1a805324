use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured API description served by a Space's `/info` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiInfo {
    #[serde(default)]
    pub named_endpoints: BTreeMap<String, EndpointInfo>,
    #[serde(default)]
    pub unnamed_endpoints: BTreeMap<String, EndpointInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointInfo {
    #[serde(default)]
    pub parameters: Vec<ApiParameter>,
    #[serde(default)]
    pub returns: Vec<ApiReturn>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiParameter {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parameter_name: Option<String>,
    #[serde(default)]
    pub parameter_has_default: bool,
    #[serde(default)]
    pub parameter_default: Option<Value>,
    #[serde(default)]
    pub python_type: Option<PythonType>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub example_input: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiReturn {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub python_type: Option<PythonType>,
    #[serde(default)]
    pub component: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PythonType {
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub description: String,
}

impl ApiInfo {
    /// Looks up a named endpoint, with or without the leading slash.
    pub fn endpoint(&self, api_name: &str) -> Option<&EndpointInfo> {
        let name = normalize_api_name(api_name);
        self.named_endpoints.get(&name)
    }
}

impl ApiParameter {
    /// Keyword under which callers address this parameter.
    pub fn name(&self) -> Option<&str> {
        self.parameter_name.as_deref().or(self.label.as_deref())
    }
}

pub(crate) fn normalize_api_name(api_name: &str) -> String {
    format!("/{}", api_name.trim_start_matches('/'))
}

fn type_name(python_type: &Option<PythonType>) -> &str {
    python_type
        .as_ref()
        .map(|t| t.type_name.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or("Any")
}

fn snake_label(label: &Option<String>, fallback: &str) -> String {
    label
        .as_deref()
        .map(|l| l.trim().to_lowercase().replace([' ', '-'], "_"))
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

impl fmt::Display for ApiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Client.predict() Usage Info")?;
        writeln!(f, "---------------------------")?;
        writeln!(f, "Named API endpoints: {}", self.named_endpoints.len())?;

        for (api_name, endpoint) in &self.named_endpoints {
            let params = endpoint
                .parameters
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    p.name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("param_{}", i))
                })
                .collect::<Vec<_>>();
            let returns = endpoint
                .returns
                .iter()
                .enumerate()
                .map(|(i, r)| snake_label(&r.label, &format!("value_{}", i)))
                .collect::<Vec<_>>();

            let mut signature = params.join(", ");
            if !signature.is_empty() {
                signature.push_str(", ");
            }
            writeln!(f)?;
            writeln!(
                f,
                " - predict({}api_name=\"{}\") -> {}",
                signature,
                api_name,
                if returns.is_empty() {
                    "None".to_string()
                } else {
                    returns.join(", ")
                }
            )?;

            writeln!(f, "    Parameters:")?;
            if endpoint.parameters.is_empty() {
                writeln!(f, "     - None")?;
            }
            for (param, name) in endpoint.parameters.iter().zip(&params) {
                let requirement = if param.parameter_has_default {
                    format!(
                        "not required, defaults to: {}",
                        param.parameter_default.clone().unwrap_or(Value::Null)
                    )
                } else {
                    "required".to_string()
                };
                writeln!(
                    f,
                    "     - [{}] {}: {} ({})",
                    param.component.as_deref().unwrap_or("Component"),
                    name,
                    type_name(&param.python_type),
                    requirement
                )?;
            }

            writeln!(f, "    Returns:")?;
            if endpoint.returns.is_empty() {
                writeln!(f, "     - None")?;
            }
            for (ret, name) in endpoint.returns.iter().zip(&returns) {
                writeln!(
                    f,
                    "     - [{}] {}: {}",
                    ret.component.as_deref().unwrap_or("Component"),
                    name,
                    type_name(&ret.python_type)
                )?;
            }
        }

        if !self.unnamed_endpoints.is_empty() {
            writeln!(f)?;
            writeln!(f, "Unnamed API endpoints: {}", self.unnamed_endpoints.len())?;
        }
        Ok(())
    }
}
