use std::sync::Arc;

use context_kernel::ContextBroker;
use context_kernel::KernelError;
use serde_json::Value;
use thiserror::Error;

/// One tool call against the broker.
#[derive(Clone)]
pub struct ToolInvocation {
    pub broker: Arc<ContextBroker>,
    /// Resolved session key.
    pub session: String,
    pub tool_name: String,
    /// Raw JSON arguments.
    pub arguments: String,
}

/// Serialized tool result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub success: bool,
}

impl ToolOutput {
    /// Parse the content back into JSON.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.content)
    }
}

/// Failure inside a handler; converted to an error payload at dispatch.
#[derive(Debug, Error)]
pub enum FunctionCallError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("{0}")]
    Internal(String),
}
