use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutput;
use crate::tools::handlers::default_content_type;
use crate::tools::handlers::parse_arguments;
use crate::tools::handlers::types::json_tool_output;
use crate::tools::handlers::types::success_value;
use crate::tools::registry::ToolHandler;

pub(crate) struct LoadHandler;

#[derive(Deserialize)]
struct LoadArgs {
    name: String,
    content: String,
    #[serde(default = "default_content_type")]
    content_type: String,
    #[serde(default)]
    metadata: Option<Value>,
}

#[async_trait]
impl ToolHandler for LoadHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let ToolInvocation {
            broker,
            session,
            arguments,
            ..
        } = invocation;
        let args: LoadArgs = parse_arguments(&arguments)?;
        let metadata = args
            .metadata
            .filter(|value| !value.is_null())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let idle_timeout = broker.idle_timeout();
        let load_session = session.clone();
        // hashing and line indexing are proportional to the content size
        let summary = tokio::task::spawn_blocking(move || {
            broker.load(
                &load_session,
                &args.name,
                args.content,
                &args.content_type,
                metadata,
            )
        })
        .await
        .map_err(|err| FunctionCallError::Internal(err.to_string()))??;

        let mut value = success_value(&summary)?;
        if let Value::Object(map) = &mut value {
            map.insert("session".to_string(), Value::String(session));
            map.insert(
                "expires_in".to_string(),
                Value::String(describe_idle_timeout(idle_timeout)),
            );
        }
        Ok(json_tool_output(value, true))
    }
}

fn describe_idle_timeout(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    match secs {
        60 => "1 minute if not accessed".to_string(),
        _ if secs > 0 && secs % 60 == 0 => format!("{} minutes if not accessed", secs / 60),
        1 => "1 second if not accessed".to_string(),
        _ => format!("{secs} seconds if not accessed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn idle_timeout_reads_naturally() {
        assert_eq!(
            describe_idle_timeout(Duration::from_secs(300)),
            "5 minutes if not accessed"
        );
        assert_eq!(
            describe_idle_timeout(Duration::from_secs(60)),
            "1 minute if not accessed"
        );
        assert_eq!(
            describe_idle_timeout(Duration::from_secs(90)),
            "90 seconds if not accessed"
        );
    }
}
