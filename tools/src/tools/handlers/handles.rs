use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutput;
use crate::tools::handlers::default_content_type;
use crate::tools::handlers::parse_arguments;
use crate::tools::handlers::types::json_tool_output;
use crate::tools::handlers::types::success_value;
use crate::tools::registry::ToolHandler;

pub(crate) struct RegisterHandleHandler;

#[derive(Deserialize)]
struct RegisterArgs {
    name: String,
    #[serde(default = "default_content_type")]
    content_type: String,
}

#[async_trait]
impl ToolHandler for RegisterHandleHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let args: RegisterArgs = parse_arguments(&invocation.arguments)?;
        let handle =
            invocation
                .broker
                .register_handle(&invocation.session, &args.name, &args.content_type)?;
        Ok(json_tool_output(
            json!({
                "success": true,
                "handle": handle,
                "var_name": args.name,
                "type": args.content_type,
            }),
            true,
        ))
    }
}

pub(crate) struct ResolveHandleHandler;

#[derive(Deserialize)]
struct ResolveArgs {
    handle: String,
}

#[async_trait]
impl ToolHandler for ResolveHandleHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let args: ResolveArgs = parse_arguments(&invocation.arguments)?;
        let target = invocation.broker.resolve_handle(&args.handle)?;
        Ok(json_tool_output(success_value(&target)?, true))
    }
}
