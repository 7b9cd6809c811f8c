use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutput;
use crate::tools::handlers::parse_arguments;
use crate::tools::handlers::types::json_tool_output;
use crate::tools::handlers::types::success_value;
use crate::tools::registry::ToolHandler;

#[derive(Deserialize)]
struct NameArgs {
    name: String,
}

pub(crate) struct ListVarsHandler;

#[async_trait]
impl ToolHandler for ListVarsHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let listing = invocation.broker.list_vars(&invocation.session);
        Ok(json_tool_output(success_value(&listing)?, true))
    }
}

pub(crate) struct VarInfoHandler;

#[async_trait]
impl ToolHandler for VarInfoHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let args: NameArgs = parse_arguments(&invocation.arguments)?;
        let info = invocation.broker.var_info(&invocation.session, &args.name)?;
        Ok(json_tool_output(success_value(&info)?, true))
    }
}

pub(crate) struct UnloadHandler;

#[async_trait]
impl ToolHandler for UnloadHandler {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError> {
        let args: NameArgs = parse_arguments(&invocation.arguments)?;
        invocation.broker.unload(&invocation.session, &args.name)?;
        Ok(json_tool_output(
            json!({"success": true, "unloaded": args.name}),
            true,
        ))
    }
}
