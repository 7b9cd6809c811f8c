use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Main configuration for the context kernel.
///
/// Sections:
/// - `lifecycle`: idle eviction of sessions and handles
/// - `quota`: per-session byte accounting
/// - `access`: pagination and scan limits
/// - `exec`: sandboxed Python execution
#[derive(Clone, Debug, Default)]
pub struct KernelConfig {
    /// Idle-eviction configuration.
    pub lifecycle: LifecycleConfig,
    /// Session quota configuration.
    pub quota: QuotaConfig,
    /// Read/search limits.
    pub access: AccessConfig,
    /// Execution environment configuration.
    pub exec: ExecConfig,
}

impl KernelConfig {
    pub fn load_from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let file_config: KernelConfigFile = toml::from_str(content)?;
        Ok(Self::from_file(file_config))
    }

    fn from_file(file: KernelConfigFile) -> Self {
        let mut config = Self::default();
        config.apply_file(file);
        config
    }

    fn apply_file(&mut self, file: KernelConfigFile) {
        if let Some(lifecycle) = file.lifecycle {
            self.lifecycle = lifecycle.into();
        }
        if let Some(quota) = file.quota {
            self.quota = quota.into();
        }
        if let Some(access) = file.access {
            self.access = access.into();
        }
        if let Some(exec) = file.exec {
            self.exec = exec.into();
        }
    }
}

/// Idle-eviction settings shared by sessions and handles.
#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    /// Seconds without access before a session or handle is evicted.
    pub idle_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 5 * 60,
        }
    }
}

impl LifecycleConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Per-session byte quota.
#[derive(Clone, Debug)]
pub struct QuotaConfig {
    /// Maximum accounted bytes (variable content + handle metadata).
    pub max_session_bytes: usize,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_session_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Pagination and search limits for the text accessor.
#[derive(Clone, Debug)]
pub struct AccessConfig {
    /// Lines returned by `peek` when no limit is given.
    pub chunk_default: usize,
    /// Upper bound on lines returned by a single `peek`.
    pub chunk_max: usize,
    /// Matches returned by `scan` when no cap is given.
    pub scan_default_matches: usize,
    /// Hard cap on matches returned by a single `scan`.
    pub scan_max_matches: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            chunk_default: 2000,
            chunk_max: 20_000,
            scan_default_matches: 50,
            scan_max_matches: 200,
        }
    }
}

/// Settings for the sandboxed execution environment.
///
/// The sandbox is best-effort: it narrows builtins and imports, it does not
/// isolate the interpreter from the host process. Imports are checked by
/// top-level module name only, so attributes of an allowed module can still
/// reach modules it imported itself (`enum.sys`, for instance).
#[derive(Clone, Debug)]
pub struct ExecConfig {
    /// Ceiling for each captured stream, in bytes.
    pub max_output_bytes: usize,
    /// Wall-clock deadline per execution in milliseconds (0 = none).
    pub timeout_ms: u64,
    /// Top-level Python modules sandboxed code may import.
    pub allowed_modules: Vec<String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 1024 * 1024,
            timeout_ms: 60_000,
            allowed_modules: [
                "re",
                "json",
                "math",
                "collections",
                "itertools",
                "functools",
                "statistics",
                "string",
                "textwrap",
                "difflib",
                "heapq",
                "bisect",
                "typing",
                "dataclasses",
                "enum",
                "datetime",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KernelConfigFile {
    pub lifecycle: Option<LifecycleConfigFile>,
    pub quota: Option<QuotaConfigFile>,
    pub access: Option<AccessConfigFile>,
    pub exec: Option<ExecConfigFile>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LifecycleConfigFile {
    pub idle_timeout_secs: Option<u64>,
}

impl From<LifecycleConfigFile> for LifecycleConfig {
    fn from(file: LifecycleConfigFile) -> Self {
        let mut config = LifecycleConfig::default();
        if let Some(idle_timeout_secs) = file.idle_timeout_secs {
            config.idle_timeout_secs = idle_timeout_secs;
        }
        config
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QuotaConfigFile {
    pub max_session_bytes: Option<usize>,
}

impl From<QuotaConfigFile> for QuotaConfig {
    fn from(file: QuotaConfigFile) -> Self {
        let mut config = QuotaConfig::default();
        if let Some(max_session_bytes) = file.max_session_bytes {
            config.max_session_bytes = max_session_bytes;
        }
        config
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccessConfigFile {
    pub chunk_default: Option<usize>,
    pub chunk_max: Option<usize>,
    pub scan_default_matches: Option<usize>,
    pub scan_max_matches: Option<usize>,
}

impl From<AccessConfigFile> for AccessConfig {
    fn from(file: AccessConfigFile) -> Self {
        let mut config = AccessConfig::default();
        if let Some(chunk_default) = file.chunk_default {
            config.chunk_default = chunk_default;
        }
        if let Some(chunk_max) = file.chunk_max {
            config.chunk_max = chunk_max;
        }
        if let Some(scan_default_matches) = file.scan_default_matches {
            config.scan_default_matches = scan_default_matches;
        }
        if let Some(scan_max_matches) = file.scan_max_matches {
            config.scan_max_matches = scan_max_matches;
        }
        config
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExecConfigFile {
    pub max_output_bytes: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub allowed_modules: Option<Vec<String>>,
}

impl From<ExecConfigFile> for ExecConfig {
    fn from(file: ExecConfigFile) -> Self {
        let mut config = ExecConfig::default();
        if let Some(max_output_bytes) = file.max_output_bytes {
            config.max_output_bytes = max_output_bytes;
        }
        if let Some(timeout_ms) = file.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(allowed_modules) = file.allowed_modules {
            config.allowed_modules = allowed_modules;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_limits() {
        let config = KernelConfig::default();
        assert_eq!(config.lifecycle.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.quota.max_session_bytes, 104_857_600);
        assert_eq!(config.access.chunk_default, 2000);
        assert_eq!(config.access.chunk_max, 20_000);
        assert_eq!(config.access.scan_max_matches, 200);
        assert_eq!(config.exec.max_output_bytes, 1_048_576);
        assert_eq!(config.exec.timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let toml = r#"
[access]
chunk_max = 500

[exec]
timeout_ms = 0
"#;
        let config = KernelConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.access.chunk_max, 500);
        assert_eq!(config.access.chunk_default, 2000);
        assert_eq!(config.exec.timeout(), None);
        assert!(config.exec.allowed_modules.contains(&"re".to_string()));
        assert_eq!(config.lifecycle.idle_timeout_secs, 300);
    }
}
