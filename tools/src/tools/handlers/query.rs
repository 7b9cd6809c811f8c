use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutput;
use crate::tools::handlers::parse_arguments;
use crate::tools::handlers::types::json_tool_output;
use crate::tools::registry::ToolHandler;

const PARENT_INSTRUCTIONS: &str =
    "Parent agent should fulfill these queries and call eval_code with results";

pub(crate) struct LlmQueryHandler;

#[derive(Deserialize)]
struct LlmQueryArgs {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl ToolHandler for LlmQueryHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let ToolInvocation {
            broker,
            session,
            arguments,
            ..
        } = invocation;
        let args: LlmQueryArgs = parse_arguments(&arguments)?;

        // may start the session's interpreter or wait behind a running eval
        let outcome = tokio::task::spawn_blocking(move || {
            broker.llm_query(&session, args.prompt, args.model)
        })
        .await
        .map_err(|err| FunctionCallError::Internal(err.to_string()))??;

        let message = outcome.results.first().cloned().unwrap_or_default();
        Ok(json_tool_output(
            json!({
                "success": true,
                "status": "deferred",
                "message": message,
                "pending_queries": outcome.pending_queries,
                "instructions": PARENT_INSTRUCTIONS,
            }),
            true,
        ))
    }
}

pub(crate) struct LlmQueryBatchedHandler;

#[derive(Deserialize)]
struct LlmQueryBatchedArgs {
    prompts: Vec<String>,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl ToolHandler for LlmQueryBatchedHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let ToolInvocation {
            broker,
            session,
            arguments,
            ..
        } = invocation;
        let args: LlmQueryBatchedArgs = parse_arguments(&arguments)?;
        let count = args.prompts.len();

        let outcome = tokio::task::spawn_blocking(move || {
            broker.llm_query_batched(&session, args.prompts, args.model)
        })
        .await
        .map_err(|err| FunctionCallError::Internal(err.to_string()))??;

        Ok(json_tool_output(
            json!({
                "success": true,
                "status": "deferred",
                "count": count,
                "results": outcome.results,
                "pending_queries": outcome.pending_queries,
                "instructions": PARENT_INSTRUCTIONS,
            }),
            true,
        ))
    }
}
