use context_kernel::KernelError;
use serde::Serialize;
use serde_json::Value;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolOutput;

pub(crate) fn json_tool_output(value: Value, success: bool) -> ToolOutput {
    let content = serde_json::to_string(&value).unwrap_or_else(|err| {
        format!(
            "{{\"success\":false,\"error_code\":\"serialization_error\",\"error_message\":\"{err}\"}}"
        )
    });
    ToolOutput { content, success }
}

pub(crate) fn error_value(
    code: &str,
    message: impl Into<String>,
    suggestion: Option<&str>,
) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("success".to_string(), Value::Bool(false));
    map.insert("error_code".to_string(), Value::String(code.to_string()));
    map.insert("error_message".to_string(), Value::String(message.into()));
    if let Some(suggestion) = suggestion {
        map.insert(
            "suggestion".to_string(),
            Value::String(suggestion.to_string()),
        );
    }
    Value::Object(map)
}

/// Serialize `payload` as an object and mark it successful.
pub(crate) fn success_value(payload: &impl Serialize) -> Result<Value, FunctionCallError> {
    let mut value = serde_json::to_value(payload)
        .map_err(|err| FunctionCallError::Internal(format!("failed to serialize result: {err}")))?;
    if let Value::Object(map) = &mut value {
        map.insert("success".to_string(), Value::Bool(true));
    }
    Ok(value)
}

/// Error payload with the kind-specific fields of each kernel error.
pub(crate) fn kernel_error_value(err: &KernelError) -> Value {
    let mut value = error_value(err.code(), err.to_string(), Some(err.suggestion()));
    let Value::Object(map) = &mut value else {
        return value;
    };
    match err {
        KernelError::VariableNotFound { name, available } => {
            map.insert("name".to_string(), Value::String(name.clone()));
            map.insert("available".to_string(), serde_json::json!(available));
        }
        KernelError::HandleNotFound { handle } => {
            map.insert("handle".to_string(), Value::String(handle.clone()));
        }
        KernelError::QuotaExceeded {
            session,
            current,
            limit,
        } => {
            map.insert("session".to_string(), Value::String(session.clone()));
            map.insert("current_size".to_string(), serde_json::json!(current));
            map.insert("limit".to_string(), serde_json::json!(limit));
        }
        KernelError::InvalidPattern { pattern, detail } => {
            map.insert("pattern".to_string(), Value::String(pattern.clone()));
            map.insert("details".to_string(), Value::String(detail.clone()));
        }
        KernelError::UnknownOperation { name } => {
            map.insert("name".to_string(), Value::String(name.clone()));
        }
        KernelError::ExecutionFault { kind, .. } => {
            map.insert("kind".to_string(), Value::String(kind.clone()));
        }
        KernelError::Internal(_) => {}
    }
    value
}

pub(crate) fn function_call_error_value(err: &FunctionCallError) -> Value {
    match err {
        FunctionCallError::InvalidArguments(message) => error_value(
            "invalid_arguments",
            message.clone(),
            Some("Check the tool arguments and try again"),
        ),
        FunctionCallError::Kernel(err) => kernel_error_value(err),
        FunctionCallError::Internal(message) => {
            error_value("internal_error", message.clone(), Some("Retry the operation"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn variable_not_found_lists_available_names() {
        let err = KernelError::VariableNotFound {
            name: "gamma".to_string(),
            available: vec!["alpha".to_string()],
        };
        assert_eq!(
            kernel_error_value(&err),
            serde_json::json!({
                "success": false,
                "error_code": "variable_not_found",
                "error_message": "variable not found: gamma",
                "suggestion": "Use list_vars to see all available variables",
                "name": "gamma",
                "available": ["alpha"],
            })
        );
    }

    #[test]
    fn success_value_marks_objects() {
        let value = success_value(&serde_json::json!({"handle": "ctx_s_log_001"})).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"handle": "ctx_s_log_001", "success": true})
        );
    }

    #[test]
    fn invalid_arguments_payload() {
        let err = FunctionCallError::InvalidArguments("missing field `name`".to_string());
        let value = function_call_error_value(&err);
        assert_eq!(value["error_code"], "invalid_arguments");
        assert_eq!(value["error_message"], "missing field `name`");
    }
}
