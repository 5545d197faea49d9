use serde_json::Value;

use super::WorkerError;

pub const REPOSITORY_NAME_FIELD: &str = "repository.name";

/// Pull `repository.name` out of a normalized push event.
///
/// The name ends up inside git URLs, so anything git could read as an option
/// or that no forge would accept as a repository name is refused.
pub fn repository_name(event: &Value) -> Result<String, WorkerError> {
    let name = match event.get("repository").and_then(|r| r.get("name")) {
        None | Some(Value::Null) => return Err(WorkerError::MissingField(REPOSITORY_NAME_FIELD)),
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(invalid(format!("expected a string, got {}", json_type(other))));
        }
    };

    if name.is_empty() {
        return Err(invalid("must not be empty".to_string()));
    }
    if name.starts_with('-') {
        return Err(invalid("must not start with '-'".to_string()));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid(
            "must not contain whitespace or control characters".to_string(),
        ));
    }

    Ok(name.clone())
}

fn invalid(reason: String) -> WorkerError {
    WorkerError::InvalidField {
        field: REPOSITORY_NAME_FIELD,
        reason,
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
