//! Context Kernel: session-scoped context broker for sub-agents.
//!
//! A parent agent loads large text artifacts once; sub-agents page through
//! them, regex-search them, pass opaque handles around and run sandboxed
//! Python against them. Everything lives in process memory and is evicted
//! after an idle timeout.

pub mod accessor;
pub mod clock;
pub mod config;
pub mod error;
pub mod handles;
pub mod lifecycle;
pub mod namespace;
pub mod python;

pub use config::AccessConfig;
pub use config::ExecConfig;
pub use config::KernelConfig;
pub use config::LifecycleConfig;
pub use config::QuotaConfig;

// Error types
pub use error::KernelError;
pub use error::Result;

// Time
pub use clock::Clock;
pub use clock::IdlePolicy;
pub use clock::ManualClock;
pub use clock::SystemClock;

// Store and views
pub use accessor::PeekView;
pub use accessor::ScanMatch;
pub use accessor::ScanView;
pub use handles::HandleTarget;
pub use namespace::LoadSummary;
pub use namespace::VariableInfo;
pub use namespace::VariableRecord;
pub use namespace::VariableSummary;
pub use namespace::estimate_tokens;

// Python runtime
pub use python::DeferredQuery;
pub use python::ExecutionResult;
pub use python::QueryOutcome;

// Lifecycle
pub use lifecycle::BrokerStats;
pub use lifecycle::ContextBroker;
pub use lifecycle::SweepReport;
pub use lifecycle::VariableListing;
