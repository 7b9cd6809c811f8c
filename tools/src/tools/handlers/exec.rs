use async_trait::async_trait;
use context_kernel::ExecutionResult;
use context_kernel::KernelError;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutput;
use crate::tools::handlers::parse_arguments;
use crate::tools::handlers::types::json_tool_output;
use crate::tools::registry::ToolHandler;

pub(crate) struct EvalCodeHandler;

#[derive(Deserialize)]
struct EvalCodeArgs {
    code: String,
}

#[async_trait]
impl ToolHandler for EvalCodeHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let ToolInvocation {
            broker,
            session,
            arguments,
            ..
        } = invocation;
        let args: EvalCodeArgs = parse_arguments(&arguments)?;

        let result = tokio::task::spawn_blocking(move || broker.eval_code(&session, &args.code))
            .await
            .map_err(|err| FunctionCallError::Internal(err.to_string()))??;

        Ok(build_exec_response(result))
    }
}

fn build_exec_response(result: ExecutionResult) -> ToolOutput {
    let mut warnings = Vec::new();
    if result.truncated {
        warnings.push("output_truncated");
    }
    if result.timed_out {
        warnings.push("execution_timed_out");
    }

    let fault = result.fault();
    let success = result.success;
    let mut value = json!({
        "success": result.success,
        "stdout": result.stdout,
        "stderr": result.stderr,
        "error": result.error,
        "execution_time_seconds": result.execution_time_seconds,
        "timed_out": result.timed_out,
        "pending_llm_queries": result.pending_llm_queries,
        "defined_variables": result.defined_variables,
    });
    if let Value::Object(map) = &mut value {
        if !warnings.is_empty() {
            map.insert("warnings".to_string(), json!(warnings));
        }
        if let Some(fault) = fault {
            map.insert("error_code".to_string(), json!(fault.code()));
            map.insert("suggestion".to_string(), json!(fault.suggestion()));
            if let KernelError::ExecutionFault { kind, .. } = fault {
                map.insert("kind".to_string(), json!(kind));
            }
        }
    }
    json_tool_output(value, success)
}
