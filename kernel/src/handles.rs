//! Opaque handles referring to namespace variables.
//!
//! A handle names a (session, variable) pair but owns nothing: unloading the
//! variable or evicting the session leaves the entry in place, and the
//! namespace lookup made with the resolved name reports the miss.

use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::clock::IdlePolicy;

/// What a handle resolves to.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct HandleTarget {
    pub handle: String,
    pub session: String,
    pub var_name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
}

#[derive(Clone, Debug)]
struct HandleEntry {
    session: String,
    var_name: String,
    type_tag: String,
    accessed: DateTime<Utc>,
}

impl HandleEntry {
    fn metadata_bytes(&self, handle: &str) -> usize {
        handle.len() + self.session.len() + self.var_name.len() + self.type_tag.len()
    }
}

#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: HashMap<String, HandleEntry>,
    /// Last sequence number issued per session.
    sequences: HashMap<String, u64>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new handle. The caller checks that the variable exists.
    pub fn register(
        &mut self,
        session: &str,
        var_name: &str,
        type_tag: &str,
        now: DateTime<Utc>,
    ) -> String {
        let seq = self.sequences.entry(session.to_string()).or_insert(0);
        *seq += 1;
        let handle = format!("ctx_{session}_{type_tag}_{seq:03}");
        self.entries.insert(
            handle.clone(),
            HandleEntry {
                session: session.to_string(),
                var_name: var_name.to_string(),
                type_tag: type_tag.to_string(),
                accessed: now,
            },
        );
        handle
    }

    /// Look up a handle and refresh its access time.
    ///
    /// Does not check that the target variable still exists.
    pub fn resolve(&mut self, handle: &str, now: DateTime<Utc>) -> Option<HandleTarget> {
        let entry = self.entries.get_mut(handle)?;
        entry.accessed = now;
        Some(HandleTarget {
            handle: handle.to_string(),
            session: entry.session.clone(),
            var_name: entry.var_name.clone(),
            type_tag: entry.type_tag.clone(),
        })
    }

    /// Bytes of handle metadata attributed to `session` for quota purposes.
    pub fn metadata_bytes(&self, session: &str) -> usize {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.session == session)
            .map(|(handle, entry)| entry.metadata_bytes(handle))
            .sum()
    }

    /// Drop idle handles, returning the removed keys.
    pub fn sweep(&mut self, now: DateTime<Utc>, policy: &IdlePolicy) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| policy.is_stale(entry.accessed, now))
            .map(|(handle, _)| handle.clone())
            .collect();
        for handle in &stale {
            self.entries.remove(handle);
        }
        stale
    }

    /// Restart the session's sequence; existing entries are kept.
    pub fn forget_session(&mut self, session: &str) {
        self.sequences.remove(session);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
