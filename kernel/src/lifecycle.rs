//! Session lifecycle: the process-scoped broker owning every session's
//! namespace, the handle registry and the execution environments.
//!
//! Every operation starts with [`ContextBroker::sweep`], so idle state is
//! evicted lazily without a background task. Locks are always taken in the
//! order sessions, handles, environments and are never held across Python
//! execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::accessor::PeekView;
use crate::accessor::ScanView;
use crate::clock::Clock;
use crate::clock::IdlePolicy;
use crate::clock::SystemClock;
use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::error::Result;
use crate::handles::HandleRegistry;
use crate::handles::HandleTarget;
use crate::namespace::LoadSummary;
use crate::namespace::SessionNamespace;
use crate::namespace::VariableInfo;
use crate::namespace::VariableRecord;
use crate::namespace::VariableSummary;
use crate::python::ExecutionEnvironment;
use crate::python::ExecutionResult;
use crate::python::QueryOutcome;

#[derive(Debug)]
struct SessionState {
    namespace: SessionNamespace,
    accessed: DateTime<Utc>,
}

impl SessionState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            namespace: SessionNamespace::new(),
            accessed: now,
        }
    }
}

/// Result of `list_vars`.
#[derive(Clone, Debug, Serialize)]
pub struct VariableListing {
    pub session: String,
    pub variables: Vec<VariableSummary>,
    /// Accounted usage: variable content plus handle metadata.
    pub total_size: usize,
}

/// What a sweep removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: Vec<String>,
    pub handles: usize,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct BrokerStats {
    pub sessions: usize,
    pub handles: usize,
    pub environments: usize,
}

pub struct ContextBroker {
    config: KernelConfig,
    clock: Arc<dyn Clock>,
    policy: IdlePolicy,
    sessions: StdMutex<HashMap<String, SessionState>>,
    handles: StdMutex<HandleRegistry>,
    environments: StdMutex<HashMap<String, Arc<ExecutionEnvironment>>>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ContextBroker {
    pub fn new(config: KernelConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: KernelConfig, clock: Arc<dyn Clock>) -> Self {
        let policy = IdlePolicy::new(config.lifecycle.idle_timeout());
        Self {
            config,
            clock,
            policy,
            sessions: StdMutex::new(HashMap::new()),
            handles: StdMutex::new(HandleRegistry::new()),
            environments: StdMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn idle_timeout(&self) -> Duration {
        self.policy.idle_timeout()
    }

    /// Evict idle handles and idle sessions.
    ///
    /// An evicted session loses its namespace, handle sequence and execution
    /// environment together. Handles pointing into it are left to expire on
    /// their own timestamps.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        let mut handles = lock(&self.handles);

        let removed_handles = handles.sweep(now, &self.policy);
        if !removed_handles.is_empty() {
            tracing::info!(count = removed_handles.len(), "evicted idle handles");
        }

        let mut stale: Vec<String> = sessions
            .iter()
            .filter(|(_, state)| self.policy.is_stale(state.accessed, now))
            .map(|(session, _)| session.clone())
            .collect();
        stale.sort();
        if stale.is_empty() {
            return SweepReport {
                sessions: stale,
                handles: removed_handles.len(),
            };
        }

        let mut environments = lock(&self.environments);
        for session in &stale {
            let vars = sessions
                .remove(session)
                .map(|state| state.namespace.len())
                .unwrap_or_default();
            handles.forget_session(session);
            environments.remove(session);
            tracing::info!(session = %session, vars, "evicted idle session");
        }
        SweepReport {
            sessions: stale,
            handles: removed_handles.len(),
        }
    }

    pub fn stats(&self) -> BrokerStats {
        let sessions = lock(&self.sessions);
        let handles = lock(&self.handles);
        let environments = lock(&self.environments);
        BrokerStats {
            sessions: sessions.len(),
            handles: handles.len(),
            environments: environments.len(),
        }
    }

    /// Store `content` under `name`, replacing any same-named variable.
    pub fn load(
        &self,
        session: &str,
        name: &str,
        content: String,
        type_tag: &str,
        metadata: serde_json::Value,
    ) -> Result<LoadSummary> {
        self.sweep();
        let now = self.clock.now();
        let record = VariableRecord::new(name, content, type_tag, metadata, now);

        let mut sessions = lock(&self.sessions);
        let handles = lock(&self.handles);
        let state = Self::enter(&mut sessions, session, now);
        let other_usage = handles.metadata_bytes(session);
        let result = state.namespace.load(
            session,
            record,
            other_usage,
            self.config.quota.max_session_bytes,
        );
        match &result {
            Ok(summary) => tracing::debug!(
                session = %session,
                name = %summary.name,
                size = summary.size,
                lines = summary.line_count,
                "loaded variable"
            ),
            Err(err) => tracing::warn!(session = %session, name = %name, "load rejected: {err}"),
        }
        result
    }

    pub fn peek(
        &self,
        session: &str,
        name: &str,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<PeekView> {
        let record = self.touch_record(session, name)?;
        Ok(PeekView::new(record, offset, limit, &self.config.access))
    }

    pub fn scan(
        &self,
        session: &str,
        name: &str,
        pattern: &str,
        context_lines: i64,
        max_matches: Option<i64>,
    ) -> Result<ScanView> {
        let record = self.touch_record(session, name)?;
        ScanView::run(
            record,
            pattern,
            context_lines,
            max_matches,
            &self.config.access,
        )
    }

    pub fn list_vars(&self, session: &str) -> VariableListing {
        self.sweep();
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        let handles = lock(&self.handles);
        let state = Self::enter(&mut sessions, session, now);
        let mut variables = state.namespace.list();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        VariableListing {
            session: session.to_string(),
            variables,
            total_size: state.namespace.total_size() + handles.metadata_bytes(session),
        }
    }

    pub fn var_info(&self, session: &str, name: &str) -> Result<VariableInfo> {
        self.sweep();
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        Self::enter(&mut sessions, session, now).namespace.info(name)
    }

    pub fn unload(&self, session: &str, name: &str) -> Result<()> {
        self.sweep();
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        let namespace = &mut Self::enter(&mut sessions, session, now).namespace;
        if namespace.unload(name) {
            tracing::debug!(session = %session, name = %name, "unloaded variable");
            Ok(())
        } else {
            Err(KernelError::VariableNotFound {
                name: name.to_string(),
                available: namespace.names(),
            })
        }
    }

    /// Issue a handle for an existing variable.
    pub fn register_handle(&self, session: &str, name: &str, type_tag: &str) -> Result<String> {
        self.sweep();
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        let state = Self::enter(&mut sessions, session, now);
        state.namespace.get(name)?;
        let handle = lock(&self.handles).register(session, name, type_tag, now);
        tracing::debug!(session = %session, name = %name, handle = %handle, "registered handle");
        Ok(handle)
    }

    /// Resolve a handle without checking that its variable still exists.
    pub fn resolve_handle(&self, handle: &str) -> Result<HandleTarget> {
        self.sweep();
        let now = self.clock.now();
        lock(&self.handles)
            .resolve(handle, now)
            .ok_or_else(|| KernelError::HandleNotFound {
                handle: handle.to_string(),
            })
    }

    /// Run `code` in the session's environment with its variables bound.
    ///
    /// Blocks for the duration of the execution.
    pub fn eval_code(&self, session: &str, code: &str) -> Result<ExecutionResult> {
        self.sweep();
        let now = self.clock.now();
        let variables = {
            let mut sessions = lock(&self.sessions);
            Self::enter(&mut sessions, session, now).namespace.snapshot()
        };
        let environment = self.environment(session)?;
        let result = environment.execute(code, &variables)?;
        tracing::debug!(
            session = %session,
            success = result.success,
            elapsed = result.execution_time_seconds,
            "executed code"
        );
        Ok(result)
    }

    pub fn llm_query(
        &self,
        session: &str,
        prompt: String,
        model: Option<String>,
    ) -> Result<QueryOutcome> {
        self.enter_session(session);
        Ok(self.environment(session)?.query(prompt, model))
    }

    pub fn llm_query_batched(
        &self,
        session: &str,
        prompts: Vec<String>,
        model: Option<String>,
    ) -> Result<QueryOutcome> {
        self.enter_session(session);
        Ok(self.environment(session)?.query_batched(prompts, model))
    }

    /// Names persisted in the session's environment, if it has one.
    pub fn persisted_locals(&self, session: &str) -> Result<Vec<String>> {
        let environment = lock(&self.environments).get(session).cloned();
        match environment {
            Some(environment) => Ok(environment.local_names()?),
            None => Ok(Vec::new()),
        }
    }

    fn enter_session(&self, session: &str) {
        self.sweep();
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        Self::enter(&mut sessions, session, now);
    }

    /// Fetch or create the session and refresh its access time.
    fn enter<'a>(
        sessions: &'a mut HashMap<String, SessionState>,
        session: &str,
        now: DateTime<Utc>,
    ) -> &'a mut SessionState {
        let state = sessions
            .entry(session.to_string())
            .or_insert_with(|| SessionState::new(now));
        state.accessed = now;
        state
    }

    fn touch_record(&self, session: &str, name: &str) -> Result<Arc<VariableRecord>> {
        self.sweep();
        let now = self.clock.now();
        let mut sessions = lock(&self.sessions);
        Self::enter(&mut sessions, session, now)
            .namespace
            .touch(name, now)
    }

    fn environment(&self, session: &str) -> Result<Arc<ExecutionEnvironment>> {
        if let Some(environment) = lock(&self.environments).get(session) {
            return Ok(Arc::clone(environment));
        }
        // built outside the lock; interpreter start-up attaches to Python
        let created = Arc::new(ExecutionEnvironment::new(session, self.config.exec.clone())?);
        let mut environments = lock(&self.environments);
        let environment = environments
            .entry(session.to_string())
            .or_insert(created);
        Ok(Arc::clone(environment))
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::ManualClock;

    use super::*;
    use pretty_assertions::assert_eq;

    fn broker() -> (ContextBroker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let broker = ContextBroker::with_clock(KernelConfig::default(), clock.clone());
        (broker, clock)
    }

    #[test]
    fn sessions_are_isolated() {
        let (broker, _) = broker();
        broker
            .load("a", "ctx", "alpha".to_string(), "custom", serde_json::json!({}))
            .unwrap();
        assert!(broker.peek("b", "ctx", 0, None).is_err());
        assert_eq!(broker.peek("a", "ctx", 0, None).unwrap().content(), "alpha");
    }

    #[test]
    fn access_keeps_session_alive() {
        let (broker, clock) = broker();
        broker
            .load("s", "ctx", "x".to_string(), "custom", serde_json::json!({}))
            .unwrap();
        clock.advance(Duration::from_secs(200));
        broker.list_vars("s");
        clock.advance(Duration::from_secs(200));
        assert_eq!(broker.list_vars("s").variables.len(), 1);

        clock.advance(Duration::from_secs(301));
        let report = broker.sweep();
        assert_eq!(report.sessions, vec!["s".to_string()]);
        assert_eq!(broker.stats().sessions, 0);
    }

    #[test]
    fn unload_missing_reports_available() {
        let (broker, _) = broker();
        broker
            .load("s", "kept", "x".to_string(), "custom", serde_json::json!({}))
            .unwrap();
        match broker.unload("s", "gone").unwrap_err() {
            KernelError::VariableNotFound { available, .. } => {
                assert_eq!(available, vec!["kept".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn handle_metadata_counts_toward_usage() {
        let (broker, _) = broker();
        broker
            .load("s", "ctx", "12345".to_string(), "log", serde_json::json!({}))
            .unwrap();
        let handle = broker.register_handle("s", "ctx", "log").unwrap();
        assert_eq!(handle, "ctx_s_log_001");
        let listing = broker.list_vars("s");
        assert_eq!(
            listing.total_size,
            5 + handle.len() + "s".len() + "ctx".len() + "log".len()
        );
    }

    #[test]
    fn register_handle_requires_variable() {
        let (broker, _) = broker();
        let err = broker.register_handle("s", "missing", "custom").unwrap_err();
        assert_eq!(err.code(), "variable_not_found");
        assert_eq!(broker.stats().handles, 0);
    }
}
