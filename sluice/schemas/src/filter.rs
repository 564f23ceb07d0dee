//! Log filter descriptor types.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::events::LogLevel;

/// Kind of a query token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Step selection query, resolved to a set of step keys by the caller
    Query,
    /// Exact step key
    Step,
    /// Substring of the event type name
    Type,
    /// Substring of the free text message
    Text,
}

impl TokenKind {
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            TokenKind::Query => Some("query"),
            TokenKind::Step => Some("step"),
            TokenKind::Type => Some("type"),
            TokenKind::Text => None,
        }
    }
}

/// One term of a log query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterToken {
    pub kind: TokenKind,
    pub value: String,
}

impl FilterToken {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(TokenKind::Text, value)
    }
}

impl fmt::Display for FilterToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.prefix() {
            Some(prefix) => write!(f, "{prefix}:{}", self.value),
            None => f.write_str(&self.value),
        }
    }
}

/// Which events of a run log are displayed and which are search matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Enabled severities
    pub levels: BTreeSet<LogLevel>,
    /// Events older than this cursor (millis) are hidden
    #[serde(default)]
    pub since: i64,
    /// Query terms, all of which must match for an event to be a search match
    #[serde(default)]
    pub tokens: Vec<FilterToken>,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            levels: LogLevel::ALL.into_iter().collect(),
            since: 0,
            tokens: Vec::new(),
        }
    }
}

impl LogFilter {
    /// Filter with exactly the given levels enabled
    pub fn with_levels(levels: impl IntoIterator<Item = LogLevel>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<FilterToken>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn is_level_enabled(&self, level: LogLevel) -> bool {
        self.levels.contains(&level)
    }

    pub fn enable(&mut self, level: LogLevel) {
        self.levels.insert(level);
    }

    pub fn disable(&mut self, level: LogLevel) {
        self.levels.remove(&level);
    }

    pub fn has_text_filter(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Hide everything logged before `now`. The cursor never moves backwards.
    pub fn clear(&mut self, now: i64) {
        self.since = self.since.max(now);
    }
}
