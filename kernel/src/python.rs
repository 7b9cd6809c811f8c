use std::collections::HashMap;
use std::collections::HashSet;
use std::ffi::CString;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Duration;
use std::time::Instant;

use anyhow::Result;
use anyhow::anyhow;
use pyo3::exceptions::PyKeyError;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::Serialize;

use crate::config::ExecConfig;
use crate::error::KernelError;
use crate::namespace::VariableRecord;

/// Names bound by the environment itself; never persisted as locals.
const HELPER_NAMES: &[&str] = &["llm_query", "llm_query_batched"];

/// Interval between repeated timeout injections once the deadline passed.
const TIMEOUT_REPEAT: Duration = Duration::from_millis(50);

/// An LLM request queued for the parent agent.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DeferredQuery {
    pub id: String,
    pub prompt: String,
    pub model: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub timed_out: bool,
    pub truncated: bool,
    pub execution_time_seconds: f64,
    pub pending_llm_queries: Vec<DeferredQuery>,
    pub defined_variables: Vec<String>,
}

impl ExecutionResult {
    /// The raised exception as [`KernelError::ExecutionFault`], if any.
    pub fn fault(&self) -> Option<KernelError> {
        let error = self.error.as_deref()?;
        let (kind, message) = error.split_once(": ").unwrap_or((error, ""));
        Some(KernelError::ExecutionFault {
            kind: kind.to_string(),
            message: message.to_string(),
        })
    }
}

/// Outcome of a direct (non-`eval_code`) deferred query call.
#[derive(Clone, Debug, Serialize)]
pub struct QueryOutcome {
    pub results: Vec<String>,
    pub pending_queries: Vec<DeferredQuery>,
}

fn enqueue(pending: &Mutex<Vec<DeferredQuery>>, prompt: String, model: Option<String>) -> String {
    let mut guard = pending.lock().unwrap_or_else(PoisonError::into_inner);
    let id = format!("q_{:03}", guard.len());
    let sentinel = format!("[DEFERRED:{id}] LLM query queued for parent agent");
    guard.push(DeferredQuery { id, prompt, model });
    sentinel
}

#[pyclass(frozen)]
struct QueryQueue {
    pending: Arc<Mutex<Vec<DeferredQuery>>>,
}

#[pymethods]
impl QueryQueue {
    #[pyo3(signature = (prompt, model=None))]
    fn llm_query(&self, prompt: String, model: Option<String>) -> String {
        enqueue(&self.pending, prompt, model)
    }

    #[pyo3(signature = (prompts, model=None))]
    fn llm_query_batched(&self, prompts: Vec<String>, model: Option<String>) -> Vec<String> {
        prompts
            .into_iter()
            .map(|prompt| enqueue(&self.pending, prompt, model.clone()))
            .collect()
    }
}

/// Read-only view of a loaded variable, bound under the variable's name.
///
/// Holds the shared record; text is only materialised when Python reads it.
#[pyclass(frozen, name = "ContextVar")]
struct ContextVar {
    record: Arc<VariableRecord>,
}

#[pymethods]
impl ContextVar {
    #[getter]
    fn name(&self) -> &str {
        self.record.name()
    }

    #[getter]
    fn content(&self) -> &str {
        self.record.content()
    }

    #[getter]
    fn lines(&self) -> Vec<&str> {
        self.record.lines().collect()
    }

    #[getter]
    fn line_count(&self) -> usize {
        self.record.line_count()
    }

    #[getter]
    fn size(&self) -> usize {
        self.record.size()
    }

    #[getter]
    fn r#type(&self) -> &str {
        self.record.type_tag()
    }

    #[getter]
    fn metadata<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        let json = serde_json::to_string(self.record.metadata())
            .map_err(|err| PyValueError::new_err(err.to_string()))?;
        py.import("json")?.call_method1("loads", (json,))
    }

    #[getter]
    fn created(&self) -> String {
        self.record.created().to_rfc3339()
    }

    /// Lines `[offset, offset + limit)` joined with newlines.
    #[pyo3(signature = (offset=0, limit=None))]
    fn peek(&self, offset: usize, limit: Option<usize>) -> &str {
        let end = offset.saturating_add(limit.unwrap_or(usize::MAX));
        self.record.slice_lines(offset, end)
    }

    fn __getitem__<'py>(&self, py: Python<'py>, key: &str) -> PyResult<Bound<'py, PyAny>> {
        match key {
            "name" => Ok(self.name().into_pyobject(py)?.into_any()),
            "content" => Ok(self.content().into_pyobject(py)?.into_any()),
            "lines" => Ok(self.lines().into_pyobject(py)?.into_any()),
            "line_count" => Ok(self.line_count().into_pyobject(py)?.into_any()),
            "size" => Ok(self.size().into_pyobject(py)?.into_any()),
            "type" => Ok(self.r#type().into_pyobject(py)?.into_any()),
            "metadata" => self.metadata(py),
            "created" => Ok(self.created().into_pyobject(py)?.into_any()),
            _ => Err(PyKeyError::new_err(key.to_string())),
        }
    }

    fn __len__(&self) -> usize {
        self.record.line_count()
    }

    fn __str__(&self) -> &str {
        self.record.content()
    }

    fn __repr__(&self) -> String {
        format!(
            "<ContextVar {} lines={} size={}>",
            self.record.name(),
            self.record.line_count(),
            self.record.size()
        )
    }
}

/// Raises the timeout exception in the executing thread once the deadline
/// passes, and keeps re-raising until the execution reports completion.
struct Watchdog {
    done: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
    stop: Option<mpsc::Sender<()>>,
}

impl Watchdog {
    fn disarmed() -> Self {
        Self {
            done: Arc::new(AtomicBool::new(false)),
            fired: Arc::new(AtomicBool::new(false)),
            stop: None,
        }
    }

    fn arm(thread_ident: u64, deadline: Duration, exception: Py<PyAny>) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));
        let (stop, stopped) = mpsc::channel::<()>();
        let thread_done = Arc::clone(&done);
        let thread_fired = Arc::clone(&fired);
        std::thread::spawn(move || {
            let mut wait = deadline;
            loop {
                match stopped.recv_timeout(wait) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    _ => return,
                }
                // `done` is only written with the interpreter attached, so
                // checking it here under attach cannot race the completion.
                let raised = Python::attach(|_py| {
                    if thread_done.load(Ordering::SeqCst) {
                        return false;
                    }
                    thread_fired.store(true, Ordering::SeqCst);
                    unsafe {
                        pyo3::ffi::PyThreadState_SetAsyncExc(thread_ident as _, exception.as_ptr());
                    }
                    true
                });
                if !raised {
                    return;
                }
                wait = TIMEOUT_REPEAT;
            }
        });
        Self {
            done,
            fired,
            stop: Some(stop),
        }
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Must be called with the interpreter attached on the executing thread.
    fn complete(mut self, _py: Python<'_>, thread_ident: u64) {
        self.done.store(true, Ordering::SeqCst);
        if self.fired() {
            // discard an injection that has not been delivered yet
            unsafe {
                pyo3::ffi::PyThreadState_SetAsyncExc(thread_ident as _, std::ptr::null_mut());
            }
        }
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

type RawCapture = (String, bool, String, bool, Option<(String, String)>);

/// Per-session sandboxed Python environment.
///
/// Locals defined by executed code persist across calls; the session's
/// variables are re-bound on every call.
pub struct ExecutionEnvironment {
    session: String,
    config: ExecConfig,
    driver: Py<PyDict>,
    builtins: Py<PyDict>,
    helpers: Py<PyDict>,
    locals: Py<PyDict>,
    timeout_exception: Py<PyAny>,
    pending: Arc<Mutex<Vec<DeferredQuery>>>,
    /// Serializes capture for executions against this environment.
    capture_lock: Mutex<()>,
}

impl ExecutionEnvironment {
    pub fn new(session: impl Into<String>, config: ExecConfig) -> Result<Self> {
        let pending = Arc::new(Mutex::new(Vec::new()));
        Python::attach(|py| {
            let driver = PyDict::new(py);
            let code = CString::new(Self::driver_code())?;
            py.run(code.as_c_str(), Some(&driver), Some(&driver))?;

            let make_builtins = driver
                .get_item("_make_builtins")?
                .ok_or_else(|| anyhow!("missing _make_builtins"))?;
            let builtins_item = make_builtins.call1((config.allowed_modules.clone(),))?;
            let builtins = builtins_item
                .cast::<PyDict>()
                .map_err(|err| anyhow!(err.to_string()))?
                .clone()
                .unbind();
            let timeout_exception = driver
                .get_item("ExecutionTimeout")?
                .ok_or_else(|| anyhow!("missing ExecutionTimeout"))?
                .unbind();

            let queue = Bound::new(
                py,
                QueryQueue {
                    pending: Arc::clone(&pending),
                },
            )?;
            let helpers = PyDict::new(py);
            for name in HELPER_NAMES {
                helpers.set_item(*name, queue.getattr(*name)?)?;
            }

            Ok(Self {
                session: session.into(),
                config,
                driver: driver.unbind(),
                builtins,
                helpers: helpers.unbind(),
                locals: PyDict::new(py).unbind(),
                timeout_exception,
                pending,
                capture_lock: Mutex::new(()),
            })
        })
    }

    /// Run `code` with `variables` bound by name.
    ///
    /// Faults raised by the code are reported in the result; `Err` means the
    /// interpreter itself misbehaved.
    pub fn execute(
        &self,
        code: &str,
        variables: &[Arc<VariableRecord>],
    ) -> Result<ExecutionResult> {
        let _capture = self
            .capture_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.clear_pending();
        let start = Instant::now();

        let outcome = Python::attach(|py| -> Result<(RawCapture, bool, Vec<String>)> {
            let scope = self.build_scope(py)?;
            let mut injected: HashMap<String, usize> = HashMap::new();
            for record in variables {
                let binding = Bound::new(
                    py,
                    ContextVar {
                        record: Arc::clone(record),
                    },
                )?;
                injected.insert(record.name().to_string(), binding.as_ptr() as usize);
                scope.set_item(record.name(), binding)?;
            }

            let thread_ident: u64 = py
                .import("threading")?
                .call_method0("get_ident")?
                .extract()?;
            let watchdog = match self.config.timeout() {
                Some(deadline) => Watchdog::arm(
                    thread_ident,
                    deadline,
                    self.timeout_exception.clone_ref(py),
                ),
                None => Watchdog::disarmed(),
            };

            let driver = self.driver.bind(py);
            let run = driver
                .get_item("_run")?
                .ok_or_else(|| anyhow!("missing _run"))?;
            let called = run.call1((code, &scope, self.config.max_output_bytes));
            let fired = watchdog.fired();
            watchdog.complete(py, thread_ident);

            let raw: RawCapture = match called {
                Ok(value) => value.extract()?,
                Err(err) => {
                    // the injected exception escaped the driver's handler
                    if let Some(reset) = driver.get_item("_reset")? {
                        reset.call0()?;
                    }
                    let kind = if fired {
                        "ExecutionTimeout".to_string()
                    } else {
                        "InternalError".to_string()
                    };
                    (String::new(), false, String::new(), false, Some((kind, err.to_string())))
                }
            };

            let timed_out = fired
                && raw
                    .4
                    .as_ref()
                    .is_some_and(|(kind, _)| kind == "ExecutionTimeout");
            if raw.4.is_none() {
                self.persist_locals(py, &scope, &injected)?;
            }
            let defined: Vec<String> = self.locals.bind(py).keys().extract()?;
            Ok((raw, timed_out, defined))
        })?;
        let execution_time_seconds = start.elapsed().as_secs_f64();

        let ((stdout, stdout_overflow, mut stderr, stderr_overflow, fault), timed_out, mut defined) =
            outcome;
        defined.sort();

        let error = fault.map(|(kind, message)| {
            let message = if timed_out {
                format!(
                    "execution exceeded the {} ms deadline",
                    self.config.timeout_ms
                )
            } else {
                message
            };
            let error = format!("{kind}: {message}");
            stderr.push('\n');
            stderr.push_str(&error);
            error
        });
        if timed_out {
            tracing::warn!(session = %self.session, "execution timed out");
        } else if let Some(error) = &error {
            tracing::debug!(session = %self.session, %error, "execution fault");
        }

        let limit = self.config.max_output_bytes;
        let (stdout, stdout_truncated) = bound_output(stdout, stdout_overflow, limit);
        let (stderr, stderr_truncated) = bound_output(stderr, stderr_overflow, limit);

        Ok(ExecutionResult {
            success: error.is_none(),
            stdout,
            stderr,
            error,
            timed_out,
            truncated: stdout_truncated || stderr_truncated,
            execution_time_seconds,
            pending_llm_queries: self.pending_snapshot(),
            defined_variables: defined,
        })
    }

    /// Queue one deferred query as its own environment-level call.
    pub fn query(&self, prompt: String, model: Option<String>) -> QueryOutcome {
        self.query_batched(vec![prompt], model)
    }

    /// Queue deferred queries in input order as one environment-level call.
    pub fn query_batched(&self, prompts: Vec<String>, model: Option<String>) -> QueryOutcome {
        let _capture = self
            .capture_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.clear_pending();
        let results = prompts
            .into_iter()
            .map(|prompt| enqueue(&self.pending, prompt, model.clone()))
            .collect();
        QueryOutcome {
            results,
            pending_queries: self.pending_snapshot(),
        }
    }

    pub fn pending_snapshot(&self) -> Vec<DeferredQuery> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names persisted by earlier executions, sorted.
    pub fn local_names(&self) -> Result<Vec<String>> {
        Python::attach(|py| {
            let mut names: Vec<String> = self.locals.bind(py).keys().extract()?;
            names.sort();
            Ok(names)
        })
    }

    fn clear_pending(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn build_scope<'py>(&self, py: Python<'py>) -> Result<Bound<'py, PyDict>> {
        let scope = PyDict::new(py);
        scope.set_item("__builtins__", self.builtins.bind(py))?;
        scope.set_item("__name__", "__main__")?;
        for (key, value) in self.helpers.bind(py).iter() {
            scope.set_item(key, value)?;
        }
        for (key, value) in self.locals.bind(py).iter() {
            scope.set_item(key, value)?;
        }
        Ok(scope)
    }

    fn persist_locals(
        &self,
        py: Python<'_>,
        scope: &Bound<'_, PyDict>,
        injected: &HashMap<String, usize>,
    ) -> Result<()> {
        let builtins = self.builtins.bind(py);
        let helpers: HashSet<&str> = HELPER_NAMES.iter().copied().collect();
        let locals = self.locals.bind(py);
        for (key, value) in scope.iter() {
            let Ok(name) = key.extract::<String>() else {
                continue;
            };
            if name.starts_with('_') || helpers.contains(name.as_str()) {
                continue;
            }
            if builtins.contains(&name)? {
                continue;
            }
            let unchanged_binding = injected
                .get(&name)
                .is_some_and(|ptr| *ptr == value.as_ptr() as usize);
            if unchanged_binding {
                continue;
            }
            locals.set_item(name, value)?;
        }
        Ok(())
    }

    fn driver_code() -> &'static str {
        r#"import builtins
import io
import sys
import threading


class ExecutionTimeout(BaseException):
    pass


_SAFE_BUILTIN_NAMES = (
    "print", "len", "str", "int", "float", "list", "dict", "set", "frozenset",
    "tuple", "bool", "type", "isinstance", "issubclass", "enumerate", "zip",
    "map", "filter", "sorted", "reversed", "range", "min", "max", "sum", "abs",
    "round", "any", "all", "pow", "divmod", "chr", "ord", "hex", "bin", "oct",
    "repr", "ascii", "format", "hash", "id", "iter", "next", "slice",
    "callable", "hasattr", "getattr", "setattr", "delattr", "dir", "vars",
    "bytes", "bytearray",
    "memoryview", "complex", "object", "super", "property", "staticmethod",
    "classmethod", "__build_class__",
    "Exception", "BaseException", "ValueError", "TypeError", "KeyError",
    "IndexError", "AttributeError", "RuntimeError", "NameError",
    "ImportError", "ModuleNotFoundError", "StopIteration", "AssertionError",
    "NotImplementedError", "ArithmeticError", "ZeroDivisionError",
    "LookupError", "UnicodeError", "Warning", "OSError", "IOError",
    "FileNotFoundError",
    "True", "False", "None", "NotImplemented", "Ellipsis",
)


def _make_builtins(allowed_modules):
    real_import = builtins.__import__
    allowed = frozenset(allowed_modules)

    def _guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
        root = name.partition(".")[0]
        if level != 0 or root not in allowed:
            raise ImportError(f"import of '{name}' is not allowed in the sandbox")
        return real_import(name, globals, locals, fromlist, level)

    safe = {
        name: getattr(builtins, name)
        for name in _SAFE_BUILTIN_NAMES
        if hasattr(builtins, name)
    }
    safe["__import__"] = _guarded_import
    return safe


class _BoundedBuffer(io.StringIO):
    def __init__(self, max_bytes):
        super().__init__()
        self.max_bytes = max_bytes
        self.bytes_written = 0
        self.overflowed = False

    def write(self, s):
        if not isinstance(s, str):
            raise TypeError(f"write() argument must be str, not {type(s).__name__}")
        if self.overflowed:
            return len(s)
        if self.max_bytes > 0:
            data = s.encode("utf-8", errors="replace")
            if self.bytes_written + len(data) > self.max_bytes:
                remaining = self.max_bytes - self.bytes_written
                super().write(data[:remaining].decode("utf-8", errors="ignore"))
                self.bytes_written = self.max_bytes
                self.overflowed = True
                return len(s)
            self.bytes_written += len(data)
        return super().write(s)


class _StreamRouter:
    """Sends writes to the buffer bound on the current thread."""

    _context_kernel_router = True

    def __init__(self, fallback):
        self._fallback = fallback
        self._local = threading.local()

    def bind(self, buffer):
        self._local.buffer = buffer

    def unbind(self):
        self._local.buffer = None

    def _target(self):
        buffer = getattr(self._local, "buffer", None)
        return buffer if buffer is not None else self._fallback

    def write(self, s):
        target = self._target()
        if target is None:
            return len(s)
        return target.write(s)

    def flush(self):
        target = self._target()
        if target is not None:
            target.flush()

    def isatty(self):
        return False

    def __getattr__(self, name):
        return getattr(self._fallback, name)


def _install_router(name):
    current = getattr(sys, name, None)
    if getattr(current, "_context_kernel_router", False):
        return current
    router = _StreamRouter(current)
    setattr(sys, name, router)
    return router


with sys.__dict__.setdefault("_context_kernel_router_lock", threading.Lock()):
    _stdout = _install_router("stdout")
    _stderr = _install_router("stderr")


def _text(buffer):
    return buffer.getvalue().encode("utf-8", errors="replace").decode("utf-8")


def _run(code, scope, max_bytes):
    out = _BoundedBuffer(max_bytes)
    err = _BoundedBuffer(max_bytes)
    fault = None
    _stdout.bind(out)
    _stderr.bind(err)
    try:
        exec(compile(code, "<eval_code>", "exec"), scope)
    except BaseException as exc:
        fault = (type(exc).__name__, str(exc))
    finally:
        _stdout.unbind()
        _stderr.unbind()
    return _text(out), out.overflowed, _text(err), err.overflowed, fault


def _reset():
    _stdout.unbind()
    _stderr.unbind()
"#
    }
}

/// Cap `text` at `limit` bytes (0 = unlimited) and append a marker when cut.
fn bound_output(mut text: String, overflowed: bool, limit: usize) -> (String, bool) {
    if limit == 0 || (!overflowed && text.len() <= limit) {
        return (text, false);
    }
    if text.len() > limit {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text.push_str(&format!("\n[OUTPUT TRUNCATED - exceeded {limit} byte limit]"));
    (text, true)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use pretty_assertions::assert_eq;

    fn env() -> ExecutionEnvironment {
        ExecutionEnvironment::new("test", ExecConfig::default()).unwrap()
    }

    fn var(name: &str, content: &str) -> Arc<VariableRecord> {
        Arc::new(VariableRecord::new(
            name,
            content.to_string(),
            "log",
            serde_json::json!({"path": "/tmp/app.log"}),
            Utc::now(),
        ))
    }

    #[test]
    fn bound_output_cuts_on_char_boundary() {
        let (text, truncated) = bound_output("héllo".to_string(), false, 2);
        assert!(truncated);
        assert_eq!(text, "h\n[OUTPUT TRUNCATED - exceeded 2 byte limit]");

        let (text, truncated) = bound_output("short".to_string(), false, 0);
        assert!(!truncated);
        assert_eq!(text, "short");
    }

    #[test]
    fn locals_persist_between_calls() {
        let env = env();
        let first = env.execute("x = 1 + 1", &[]).unwrap();
        assert!(first.success);
        assert_eq!(first.defined_variables, vec!["x".to_string()]);

        let second = env.execute("print(x)", &[]).unwrap();
        assert!(second.success, "{:?}", second.error);
        assert_eq!(second.stdout, "2\n");
    }

    #[test]
    fn fault_keeps_output_and_previous_locals() {
        let env = env();
        env.execute("kept = 'yes'", &[]).unwrap();

        let result = env
            .execute("print('before')\nlost = 1\n1 / 0", &[])
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.stdout, "before\n");
        assert_eq!(
            result.error.as_deref(),
            Some("ZeroDivisionError: division by zero")
        );
        assert!(result.stderr.ends_with("\nZeroDivisionError: division by zero"));
        assert_eq!(env.local_names().unwrap(), vec!["kept".to_string()]);
    }

    #[test]
    fn variables_are_bound_by_name() {
        let env = env();
        let records = vec![var("logs", "ok\nERROR one\nok\nERROR two")];
        let code = "errors = [l for l in logs.lines if l.startswith('ERROR')]\n\
                    print(len(errors), logs['type'], logs.line_count, logs.metadata['path'])\n\
                    print(logs.peek(1, 1))";
        let result = env.execute(code, &records).unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.stdout, "2 log 4 /tmp/app.log\nERROR one\n");
        assert_eq!(result.defined_variables, vec!["errors".to_string()]);
    }

    #[test]
    fn reloaded_variables_override_stale_locals() {
        let env = env();
        env.execute("logs = 'shadow'", &[]).unwrap();
        let result = env
            .execute("print(str(logs))", &[var("logs", "fresh")])
            .unwrap();
        assert_eq!(result.stdout, "fresh\n");
    }

    #[test]
    fn faulted_result_exposes_execution_fault() {
        let env = env();
        let err = env
            .execute("raise ValueError('bad input')", &[])
            .unwrap()
            .fault()
            .unwrap();
        match err {
            KernelError::ExecutionFault { kind, message } => {
                assert_eq!(kind, "ValueError");
                assert_eq!(message, "bad input");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(env.execute("ok = 1", &[]).unwrap().fault().is_none());
    }

    #[test]
    fn introspection_builtins_and_os_errors_are_available() {
        let env = env();
        let code = "class Box:\n    pass\n\
                    b = Box()\n\
                    setattr(b, 'size', 3)\n\
                    print(vars(b))\n\
                    delattr(b, 'size')\n\
                    print(hasattr(b, 'size'))\n\
                    try:\n    raise FileNotFoundError('gone')\nexcept OSError as err:\n    print(type(err).__name__, IOError is OSError)";
        let result = env.execute(code, &[]).unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.stdout, "{'size': 3}\nFalse\nFileNotFoundError True\n");
    }

    #[test]
    fn submodules_of_blocked_packages_are_refused() {
        let env = env();
        for code in ["import os.path", "from os import path", "import importlib"] {
            let result = env.execute(code, &[]).unwrap();
            assert!(
                result.error.as_deref().is_some_and(|e| e.starts_with("ImportError:")),
                "{code}: {:?}",
                result.error
            );
        }
    }

    #[test]
    fn blocked_builtins_and_imports_fault() {
        let env = env();
        let result = env.execute("open('/etc/passwd')", &[]).unwrap();
        assert_eq!(
            result.error.as_deref(),
            Some("NameError: name 'open' is not defined")
        );

        let result = env.execute("import os", &[]).unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("ImportError:"));

        let result = env.execute("eval('1')", &[]).unwrap();
        assert!(!result.success);

        let result = env.execute("import json\nprint(json.dumps([1]))", &[]).unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.stdout, "[1]\n");
    }

    #[test]
    fn deferred_queries_are_numbered_per_call() {
        let env = env();
        let result = env
            .execute(
                "a = llm_query('summarize', model='fast')\nb = llm_query_batched(['x', 'y'])\nprint(a)",
                &[],
            )
            .unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            result.stdout,
            "[DEFERRED:q_000] LLM query queued for parent agent\n"
        );
        let ids: Vec<&str> = result
            .pending_llm_queries
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        assert_eq!(ids, vec!["q_000", "q_001", "q_002"]);
        assert_eq!(result.pending_llm_queries[0].model.as_deref(), Some("fast"));
        assert_eq!(result.pending_llm_queries[2].prompt, "y");

        let next = env.execute("pass", &[]).unwrap();
        assert!(next.pending_llm_queries.is_empty());
    }

    #[test]
    fn direct_queries_reset_pending_list() {
        let env = env();
        let first = env.query("hello".to_string(), None);
        let second = env.query("world".to_string(), None);
        assert_eq!(first.pending_queries.len(), 1);
        assert_eq!(second.pending_queries.len(), 1);
        assert_eq!(second.pending_queries[0].prompt, "world");
        assert_eq!(second.pending_queries[0].id, "q_000");

        let batched = env.query_batched(vec!["a".to_string(), "b".to_string()], None);
        assert_eq!(
            batched.results,
            vec![
                "[DEFERRED:q_000] LLM query queued for parent agent".to_string(),
                "[DEFERRED:q_001] LLM query queued for parent agent".to_string(),
            ]
        );
    }

    #[test]
    fn output_is_capped() {
        let config = ExecConfig {
            max_output_bytes: 16,
            ..ExecConfig::default()
        };
        let env = ExecutionEnvironment::new("capped", config).unwrap();
        let result = env.execute("print('x' * 100)", &[]).unwrap();
        assert!(result.truncated);
        assert_eq!(
            result.stdout,
            format!("{}\n[OUTPUT TRUNCATED - exceeded 16 byte limit]", "x".repeat(16))
        );
    }

    #[test]
    fn runaway_code_hits_deadline() {
        let config = ExecConfig {
            timeout_ms: 200,
            ..ExecConfig::default()
        };
        let env = ExecutionEnvironment::new("slow", config).unwrap();
        let result = env
            .execute("try:\n    while True:\n        pass\nexcept Exception:\n    pass", &[])
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("ExecutionTimeout:"));

        let after = env.execute("print('alive')", &[]).unwrap();
        assert_eq!(after.stdout, "alive\n");
    }

    #[test]
    fn class_definitions_work() {
        let env = env();
        let result = env
            .execute(
                "class Counter:\n    def __init__(self):\n        self.n = 0\nc = Counter()\nc.n += 2\nprint(c.n)",
                &[],
            )
            .unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.stdout, "2\n");
    }
}
