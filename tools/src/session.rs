//! Session key derivation from the host environment.

/// Primary session variable set by the host.
pub const SESSION_ENV: &str = "OPENCODE_SESSION_ID";
/// Fallback set when running as a sub-agent.
pub const PARENT_SESSION_ENV: &str = "PARENT_SESSION_ID";
/// Key used when neither variable is usable.
pub const GLOBAL_SESSION: &str = "global";

const SESSION_KEY_CHARS: usize = 8;

/// First non-empty of `primary` and `parent`, cut to eight characters.
pub fn derive_session_id(primary: Option<&str>, parent: Option<&str>) -> String {
    [primary, parent]
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .map(|value| value.chars().take(SESSION_KEY_CHARS).collect())
        .unwrap_or_else(|| GLOBAL_SESSION.to_string())
}

/// Session key for the current process environment.
pub fn session_id_from_env() -> String {
    let primary = std::env::var(SESSION_ENV).ok();
    let parent = std::env::var(PARENT_SESSION_ENV).ok();
    derive_session_id(primary.as_deref(), parent.as_deref())
}
