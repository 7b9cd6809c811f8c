//! Per-session variable namespace.
//!
//! Records are immutable once built and shared as `Arc<VariableRecord>`, so
//! readers never copy text. Lines are stored as byte spans into the content.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::error::KernelError;
use crate::error::Result;

/// Approximate bytes per token for modern LLMs.
const APPROX_BYTES_PER_TOKEN: usize = 4;

/// Estimate token count from text using byte-based approximation.
pub fn estimate_tokens(content: &str) -> usize {
    let bytes = content.len();
    bytes.saturating_add(APPROX_BYTES_PER_TOKEN.saturating_sub(1)) / APPROX_BYTES_PER_TOKEN
}

#[derive(Debug)]
pub struct VariableRecord {
    name: String,
    content: String,
    lines: Vec<Range<usize>>,
    type_tag: String,
    metadata: serde_json::Value,
    content_hash: String,
    created: DateTime<Utc>,
}

impl VariableRecord {
    pub fn new(
        name: impl Into<String>,
        content: String,
        type_tag: impl Into<String>,
        metadata: serde_json::Value,
        created: DateTime<Utc>,
    ) -> Self {
        let lines = line_spans(&content);
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(content.as_bytes());
            format!("{:x}", hasher.finalize())
        };
        Self {
            name: name.into(),
            content,
            lines,
            type_tag: type_tag.into(),
            metadata,
            content_hash,
            created,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Content length in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn tokens_estimate(&self) -> usize {
        estimate_tokens(&self.content)
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        let span = self.lines.get(index)?;
        self.content.get(span.clone())
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines
            .iter()
            .map(|span| self.content.get(span.clone()).unwrap_or_default())
    }

    /// Lines `[start, end)` joined with `\n`, borrowed from the content.
    ///
    /// Out-of-range bounds are clamped; an empty range yields `""`.
    pub fn slice_lines(&self, start: usize, end: usize) -> &str {
        let end = end.min(self.lines.len());
        if start >= end {
            return "";
        }
        let from = self.lines[start].start;
        let to = self.lines[end - 1].end;
        self.content.get(from..to).unwrap_or_default()
    }
}

/// Byte spans of each `\n`-separated line; empty content is one empty line.
fn line_spans(content: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (idx, _) in content.match_indices('\n') {
        spans.push(start..idx);
        start = idx + 1;
    }
    spans.push(start..content.len());
    spans
}

/// Entry in `list_vars`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct VariableSummary {
    pub name: String,
    pub line_count: usize,
    pub size: usize,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub created: DateTime<Utc>,
}

/// Full metadata returned by `var_info`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub line_count: usize,
    pub size: usize,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub metadata: serde_json::Value,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub content_hash: String,
    pub tokens_estimate: usize,
}

/// Result of a successful `load`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LoadSummary {
    pub name: String,
    pub line_count: usize,
    pub size: usize,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub content_hash: String,
    pub tokens_estimate: usize,
}

#[derive(Debug)]
struct VariableSlot {
    record: Arc<VariableRecord>,
    accessed: DateTime<Utc>,
}

/// Variables of one session.
#[derive(Debug, Default)]
pub struct SessionNamespace {
    vars: HashMap<String, VariableSlot>,
}

impl SessionNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record`, replacing any variable of the same name.
    ///
    /// `other_usage` is accounted usage outside the namespace (handle
    /// metadata). The check uses the pre-insertion total plus the incoming
    /// size, so a replaced record still counts against the quota.
    pub fn load(
        &mut self,
        session: &str,
        record: VariableRecord,
        other_usage: usize,
        limit: usize,
    ) -> Result<LoadSummary> {
        let current = self.total_size() + other_usage;
        if current.saturating_add(record.size()) > limit {
            return Err(KernelError::QuotaExceeded {
                session: session.to_string(),
                current,
                limit,
            });
        }

        let summary = LoadSummary {
            name: record.name.clone(),
            line_count: record.line_count(),
            size: record.size(),
            type_tag: record.type_tag.clone(),
            content_hash: record.content_hash.clone(),
            tokens_estimate: record.tokens_estimate(),
        };
        let accessed = record.created;
        self.vars.insert(
            record.name.clone(),
            VariableSlot {
                record: Arc::new(record),
                accessed,
            },
        );
        Ok(summary)
    }

    pub fn get(&self, name: &str) -> Result<Arc<VariableRecord>> {
        self.vars
            .get(name)
            .map(|slot| Arc::clone(&slot.record))
            .ok_or_else(|| self.not_found(name))
    }

    /// Like [`Self::get`], refreshing the record's access time.
    pub fn touch(&mut self, name: &str, now: DateTime<Utc>) -> Result<Arc<VariableRecord>> {
        match self.vars.get_mut(name) {
            Some(slot) => {
                slot.accessed = now;
                Ok(Arc::clone(&slot.record))
            }
            None => Err(self.not_found(name)),
        }
    }

    pub fn info(&self, name: &str) -> Result<VariableInfo> {
        let slot = self.vars.get(name).ok_or_else(|| self.not_found(name))?;
        let record = &slot.record;
        Ok(VariableInfo {
            name: record.name.clone(),
            line_count: record.line_count(),
            size: record.size(),
            type_tag: record.type_tag.clone(),
            metadata: record.metadata.clone(),
            created: record.created,
            last_accessed: slot.accessed,
            content_hash: record.content_hash.clone(),
            tokens_estimate: record.tokens_estimate(),
        })
    }

    pub fn unload(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    pub fn list(&self) -> Vec<VariableSummary> {
        self.vars
            .values()
            .map(|slot| VariableSummary {
                name: slot.record.name.clone(),
                line_count: slot.record.line_count(),
                size: slot.record.size(),
                type_tag: slot.record.type_tag.clone(),
                created: slot.record.created,
            })
            .collect()
    }

    /// Shared references to every record, for injection into the sandbox.
    pub fn snapshot(&self) -> Vec<Arc<VariableRecord>> {
        self.vars
            .values()
            .map(|slot| Arc::clone(&slot.record))
            .collect()
    }

    pub fn total_size(&self) -> usize {
        self.vars.values().map(|slot| slot.record.size()).sum()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vars.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    fn not_found(&self, name: &str) -> KernelError {
        KernelError::VariableNotFound {
            name: name.to_string(),
            available: self.names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, content: &str) -> VariableRecord {
        VariableRecord::new(
            name,
            content.to_string(),
            "custom",
            serde_json::json!({}),
            Utc::now(),
        )
    }

    #[test]
    fn lines_follow_newline_split() {
        let rec = record("log", "a\nb\n\nc\n");
        assert_eq!(rec.line_count(), 5);
        assert_eq!(rec.lines().collect::<Vec<_>>(), vec!["a", "b", "", "c", ""]);
        assert_eq!(rec.size(), 7);

        let empty = record("empty", "");
        assert_eq!(empty.line_count(), 1);
        assert_eq!(empty.line(0), Some(""));
    }

    #[test]
    fn slice_lines_borrows_joined_window() {
        let rec = record("ctx", "one\ntwo\nthree\nfour");
        assert_eq!(rec.slice_lines(1, 3), "two\nthree");
        assert_eq!(rec.slice_lines(0, 100), "one\ntwo\nthree\nfour");
        assert_eq!(rec.slice_lines(4, 10), "");
        assert_eq!(rec.slice_lines(2, 2), "");
    }

    #[test]
    fn multibyte_lines_keep_char_boundaries() {
        let rec = record("utf8", "héllo\nwörld");
        assert_eq!(rec.line(1), Some("wörld"));
        assert_eq!(rec.size(), "héllo\nwörld".len());
    }

    #[test]
    fn load_replaces_and_reports_summary() {
        let mut ns = SessionNamespace::new();
        ns.load("s", record("ctx", "old"), 0, 1024).unwrap();
        let summary = ns.load("s", record("ctx", "new\ncontent"), 0, 1024).unwrap();
        assert_eq!(summary.line_count, 2);
        assert_eq!(ns.len(), 1);
        assert_eq!(ns.get("ctx").unwrap().content(), "new\ncontent");
    }

    #[test]
    fn quota_rejection_leaves_state_untouched() {
        let mut ns = SessionNamespace::new();
        ns.load("s", record("a", "0123456789"), 0, 20).unwrap();

        let err = ns.load("s", record("b", "01234567890"), 0, 20).unwrap_err();
        match err {
            KernelError::QuotaExceeded { current, limit, .. } => {
                assert_eq!(current, 10);
                assert_eq!(limit, 20);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ns.names(), vec!["a".to_string()]);
        assert_eq!(ns.total_size(), 10);
    }

    #[test]
    fn quota_counts_other_usage() {
        let mut ns = SessionNamespace::new();
        assert!(ns.load("s", record("a", "12345"), 16, 20).is_err());
        assert!(ns.load("s", record("a", "1234"), 16, 20).is_ok());
    }

    #[test]
    fn missing_variable_lists_available_names() {
        let mut ns = SessionNamespace::new();
        ns.load("s", record("beta", "b"), 0, 100).unwrap();
        ns.load("s", record("alpha", "a"), 0, 100).unwrap();
        let err = ns.get("gamma").unwrap_err();
        match err {
            KernelError::VariableNotFound { name, available } => {
                assert_eq!(name, "gamma");
                assert_eq!(available, vec!["alpha".to_string(), "beta".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unload_reports_presence() {
        let mut ns = SessionNamespace::new();
        ns.load("s", record("ctx", "x"), 0, 100).unwrap();
        assert!(ns.unload("ctx"));
        assert!(!ns.unload("ctx"));
        assert!(ns.is_empty());
    }
}
