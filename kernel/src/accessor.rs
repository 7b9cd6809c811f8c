//! Pagination and regex search over a variable's lines.
//!
//! Both views keep the shared record and only indices into it; text is
//! borrowed from the record when the view is read or serialized.

use std::sync::Arc;

use regex::Regex;
use regex::RegexBuilder;
use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::config::AccessConfig;
use crate::error::KernelError;
use crate::error::Result;
use crate::namespace::VariableRecord;

/// A window of lines from one variable.
#[derive(Clone, Debug)]
pub struct PeekView {
    record: Arc<VariableRecord>,
    offset: usize,
    limit: usize,
}

impl PeekView {
    /// Negative offsets clamp to 0; `limit` defaults to `chunk_default` and
    /// is clamped to `[0, chunk_max]`.
    pub fn new(
        record: Arc<VariableRecord>,
        offset: i64,
        limit: Option<i64>,
        config: &AccessConfig,
    ) -> Self {
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = match limit {
            Some(limit) => usize::try_from(limit.max(0)).unwrap_or(usize::MAX),
            None => config.chunk_default,
        }
        .min(config.chunk_max);
        Self {
            record,
            offset,
            limit,
        }
    }

    pub fn name(&self) -> &str {
        self.record.name()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn total_lines(&self) -> usize {
        self.record.line_count()
    }

    pub fn returned(&self) -> usize {
        self.total_lines().saturating_sub(self.offset).min(self.limit)
    }

    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(self.returned()) < self.total_lines()
    }

    pub fn content(&self) -> &str {
        self.record
            .slice_lines(self.offset, self.offset.saturating_add(self.limit))
    }
}

impl Serialize for PeekView {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PeekView", 7)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("offset", &self.offset)?;
        state.serialize_field("limit", &self.limit)?;
        state.serialize_field("total_lines", &self.total_lines())?;
        state.serialize_field("returned", &self.returned())?;
        state.serialize_field("has_more", &self.has_more())?;
        state.serialize_field("content", self.content())?;
        state.end()
    }
}

/// Compile a scan pattern case-insensitively.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| KernelError::InvalidPattern {
            pattern: pattern.to_string(),
            detail: err.to_string(),
        })
}

/// One matching line, borrowed from the record.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ScanMatch<'a> {
    pub line: usize,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<&'a str>>,
}

/// Result of a regex scan.
#[derive(Clone, Debug)]
pub struct ScanView {
    record: Arc<VariableRecord>,
    pattern: String,
    context_lines: usize,
    hits: Vec<usize>,
    truncated: bool,
}

impl ScanView {
    /// `max_matches` defaults to `scan_default_matches` and is clamped to
    /// `[1, scan_max_matches]`.
    pub fn run(
        record: Arc<VariableRecord>,
        pattern: &str,
        context_lines: i64,
        max_matches: Option<i64>,
        config: &AccessConfig,
    ) -> Result<Self> {
        let regex = compile_pattern(pattern)?;
        let context_lines = usize::try_from(context_lines.max(0)).unwrap_or(usize::MAX);
        let max_matches = match max_matches {
            Some(max) => usize::try_from(max.max(1)).unwrap_or(usize::MAX),
            None => config.scan_default_matches,
        }
        .clamp(1, config.scan_max_matches.max(1));

        let mut hits = Vec::new();
        for (index, line) in record.lines().enumerate() {
            if regex.is_match(line) {
                hits.push(index);
                if hits.len() >= max_matches {
                    break;
                }
            }
        }
        let truncated = hits.len() >= max_matches;

        Ok(Self {
            record,
            pattern: pattern.to_string(),
            context_lines,
            hits,
            truncated,
        })
    }

    pub fn name(&self) -> &str {
        self.record.name()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn match_count(&self) -> usize {
        self.hits.len()
    }

    pub fn matches(&self) -> impl Iterator<Item = ScanMatch<'_>> + '_ {
        self.hits.iter().map(move |&line| {
            let context = (self.context_lines > 0).then(|| {
                let start = line.saturating_sub(self.context_lines);
                let end = line
                    .saturating_add(self.context_lines)
                    .saturating_add(1)
                    .min(self.record.line_count());
                (start..end)
                    .filter_map(|index| self.record.line(index))
                    .collect()
            });
            ScanMatch {
                line,
                text: self.record.line(line).unwrap_or_default(),
                context,
            }
        })
    }
}

impl Serialize for ScanView {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let results: Vec<ScanMatch<'_>> = self.matches().collect();
        let mut state = serializer.serialize_struct("ScanView", 5)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("pattern", &self.pattern)?;
        state.serialize_field("matches", &self.hits.len())?;
        state.serialize_field("truncated", &self.truncated)?;
        state.serialize_field("results", &results)?;
        state.end()
    }
}
