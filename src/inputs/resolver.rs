use crate::error::{AppError, Result};
use crate::models::{ExecutionInputs, ServiceType};
use crate::paths;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Turns input files and request inputs into `torero` command-line flags.
#[derive(Debug, Clone)]
pub struct InputResolver {
    data_dir: PathBuf,
}

impl InputResolver {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        paths::resolve_data_path(&self.data_dir, path)
    }

    pub fn load_input_file(&self, file_path: &str) -> Result<ExecutionInputs> {
        let path = self.resolve_path(file_path);
        if !path.is_file() {
            return Err(AppError::InputFile(format!(
                "input file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let document: Value = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_error(&path, e))?,
            "json" => serde_json::from_str(&content).map_err(|e| parse_error(&path, e))?,
            "tfvars" => return Ok(parse_tfvars(&content)),
            other => {
                return Err(AppError::InputFile(format!(
                    "unsupported input file format: .{}",
                    other
                )));
            }
        };

        inputs_from_document(document, &path)
    }

    /// File values first, then request values on top.
    pub fn resolve_inputs(
        &self,
        user_inputs: Option<&ExecutionInputs>,
        input_file: Option<&str>,
    ) -> Result<ExecutionInputs> {
        let mut resolved = match input_file {
            Some(file) if !file.trim().is_empty() => self.load_input_file(file)?,
            _ => ExecutionInputs::default(),
        };

        if let Some(user) = user_inputs {
            resolved
                .variables
                .extend(user.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
            if !user.secrets.is_empty() {
                resolved.secrets = user.secrets.clone();
            }
            if !user.files.is_empty() {
                resolved.files = user.files.clone();
            }
        }

        Ok(resolved)
    }

    pub fn to_cli_args(&self, service_type: ServiceType, inputs: &ExecutionInputs) -> Vec<String> {
        let mut args = Vec::new();

        for (key, value) in &inputs.variables {
            args.push("--set".to_string());
            args.push(format!("{}={}", key, flatten_value(value)));
        }

        for secret in &inputs.secrets {
            args.push("--set-secret".to_string());
            args.push(secret.clone());
        }

        if service_type == ServiceType::OpentofuPlan {
            if let Some(state_file) = inputs.files.get("state_file") {
                args.push("--state".to_string());
                args.push(format!("@{}", self.resolve_path(state_file).display()));
            }
        }

        args
    }
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::InputFile(format!("failed to parse {}: {}", path.display(), err))
}

fn inputs_from_document(document: Value, path: &Path) -> Result<ExecutionInputs> {
    match document {
        Value::Null => Ok(ExecutionInputs::default()),
        Value::Object(map)
            if ["variables", "secrets", "files"]
                .iter()
                .any(|key| map.contains_key(*key)) =>
        {
            serde_json::from_value(Value::Object(map)).map_err(|e| parse_error(path, e))
        }
        Value::Object(map) => Ok(ExecutionInputs {
            variables: map.into_iter().collect(),
            ..Default::default()
        }),
        _ => Err(AppError::InputFile(format!(
            "{} must contain a mapping",
            path.display()
        ))),
    }
}

/// CLI representation of a variable value.
fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Minimal `.tfvars` reader: `key = value` lines, `#` comments, and `{ ... }`
/// blocks spanning several lines joined with spaces.
fn parse_tfvars(content: &str) -> ExecutionInputs {
    let mut variables = BTreeMap::new();
    let mut block: Option<(String, Vec<String>)> = None;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, parts)) = block.as_mut() {
            parts.push(line.to_string());
            if line.ends_with('}') {
                variables.insert(key.clone(), Value::String(parts.join(" ")));
                block = None;
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim();

        if value.starts_with('{') && !value.ends_with('}') {
            block = Some((key, vec![value.to_string()]));
            continue;
        }

        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        variables.insert(key, Value::String(value.to_string()));
    }

    ExecutionInputs {
        variables,
        ..Default::default()
    }
}
