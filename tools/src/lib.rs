//! Tool boundary for the context kernel.
//!
//! Decodes JSON arguments, calls the [`ContextBroker`] and renders every
//! outcome, errors included, as a JSON payload.

pub mod session;
pub mod tools;

use std::sync::Arc;

use context_kernel::ContextBroker;

pub use session::derive_session_id;
pub use session::session_id_from_env;
pub use tools::context::FunctionCallError;
pub use tools::context::ToolInvocation;
pub use tools::context::ToolOutput;
pub use tools::registry::ToolHandler;
pub use tools::registry::ToolRegistry;

/// A broker, its tool registry and the session key calls are made under.
pub struct ContextTools {
    broker: Arc<ContextBroker>,
    registry: ToolRegistry,
    session: String,
}

impl ContextTools {
    pub fn new(broker: Arc<ContextBroker>, session: impl Into<String>) -> Self {
        Self {
            broker,
            registry: ToolRegistry::with_default_handlers(),
            session: session.into(),
        }
    }

    /// Session taken from `OPENCODE_SESSION_ID` / `PARENT_SESSION_ID`.
    pub fn from_env(broker: Arc<ContextBroker>) -> Self {
        Self::new(broker, session_id_from_env())
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn broker(&self) -> &Arc<ContextBroker> {
        &self.broker
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn call(&self, tool_name: &str, arguments: &str) -> ToolOutput {
        self.call_as(&self.session, tool_name, arguments).await
    }

    /// Like [`Self::call`] under an explicit session key.
    pub async fn call_as(&self, session: &str, tool_name: &str, arguments: &str) -> ToolOutput {
        let invocation = ToolInvocation {
            broker: Arc::clone(&self.broker),
            session: session.to_string(),
            tool_name: tool_name.to_string(),
            arguments: arguments.to_string(),
        };
        self.registry.dispatch(invocation).await
    }
}
