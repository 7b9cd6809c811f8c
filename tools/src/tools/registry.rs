use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use context_kernel::KernelError;

use crate::tools::context::FunctionCallError;
use crate::tools::context::ToolInvocation;
use crate::tools::context::ToolOutput;
use crate::tools::handlers;
use crate::tools::handlers::types::function_call_error_value;
use crate::tools::handlers::types::json_tool_output;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, invocation: ToolInvocation) -> Result<ToolOutput, FunctionCallError>;
}

/// Name-based dispatch over the registered handlers.
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every broker operation; `load_context` aliases `load`.
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::empty();
        let load: Arc<dyn ToolHandler> = Arc::new(handlers::LoadHandler);
        registry.register_arc("load", Arc::clone(&load));
        registry.register_arc("load_context", load);
        registry.register("peek", handlers::PeekHandler);
        registry.register("scan", handlers::ScanHandler);
        registry.register("list_vars", handlers::ListVarsHandler);
        registry.register("var_info", handlers::VarInfoHandler);
        registry.register("unload", handlers::UnloadHandler);
        registry.register("register_handle", handlers::RegisterHandleHandler);
        registry.register("resolve_handle", handlers::ResolveHandleHandler);
        registry.register("eval_code", handlers::EvalCodeHandler);
        registry.register("llm_query", handlers::LlmQueryHandler);
        registry.register("llm_query_batched", handlers::LlmQueryBatchedHandler);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, handler: impl ToolHandler + 'static) {
        self.register_arc(name, Arc::new(handler));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Run the named tool. Every failure becomes an error payload.
    pub async fn dispatch(&self, invocation: ToolInvocation) -> ToolOutput {
        let tool_name = invocation.tool_name.clone();
        let result = match self.handlers.get(&tool_name) {
            Some(handler) => handler.handle(invocation).await,
            None => Err(FunctionCallError::Kernel(KernelError::UnknownOperation {
                name: tool_name.clone(),
            })),
        };
        match result {
            Ok(output) => output,
            Err(err) => {
                tracing::debug!(tool = %tool_name, "tool call failed: {err}");
                json_tool_output(function_call_error_value(&err), false)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}
