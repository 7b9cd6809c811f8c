use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutput;
use crate::tools::handlers::parse_arguments;
use crate::tools::handlers::types::json_tool_output;
use crate::tools::handlers::types::success_value;
use crate::tools::registry::ToolHandler;

pub(crate) struct PeekHandler;

#[derive(Deserialize)]
struct PeekArgs {
    name: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: Option<i64>,
}

#[async_trait]
impl ToolHandler for PeekHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let args: PeekArgs = parse_arguments(&invocation.arguments)?;
        let view = invocation
            .broker
            .peek(&invocation.session, &args.name, args.offset, args.limit)?;
        Ok(json_tool_output(success_value(&view)?, true))
    }
}

pub(crate) struct ScanHandler;

#[derive(Deserialize)]
struct ScanArgs {
    name: String,
    pattern: String,
    #[serde(default)]
    context_lines: i64,
    #[serde(default)]
    max_matches: Option<i64>,
}

#[async_trait]
impl ToolHandler for ScanHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let args: ScanArgs = parse_arguments(&invocation.arguments)?;
        let view = invocation.broker.scan(
            &invocation.session,
            &args.name,
            &args.pattern,
            args.context_lines,
            args.max_matches,
        )?;
        Ok(json_tool_output(success_value(&view)?, true))
    }
}
