//! Tokenized filtering of a run's event log.
//!
//! [`filter_logs`] produces two views: the display list (severity and cursor
//! filtering only) and the stricter search-match list, which additionally
//! requires every query token to match.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use sluice_schemas::{FilterToken, LogFilter, RunEvent, TokenKind};

static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

/// Resolves step selection queries (`query:` tokens) to step keys.
///
/// The selection language itself lives outside sluice, implementors adapt it.
pub trait StepSelectionResolver {
    fn resolve(&self, query: &str) -> HashSet<String>;
}

/// The outcome of filtering a log
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredLogs<'a> {
    /// Events with an enabled level at or after the cursor
    pub display: Vec<&'a RunEvent>,
    /// Events of `display` matching every query token. Empty without tokens.
    pub search_matches: Vec<&'a RunEvent>,
    /// Whether any query token was given. Distinguishes "no query" from "no matches".
    pub has_text_filter: bool,
}

/// Split a free-form query into tokens.
///
/// Terms are separated by whitespace. `query:`, `step:` and `type:` prefixes
/// select the token kind, anything else is matched against the message text.
/// Terms with an empty value are dropped.
///
/// # Examples
///
/// ```
/// use sluice_core::log_filter::parse_query;
/// use sluice_schemas::{FilterToken, TokenKind};
///
/// let tokens = parse_query("step:load type:materialization timeout");
/// assert_eq!(
///     tokens,
///     vec![
///         FilterToken::new(TokenKind::Step, "load"),
///         FilterToken::new(TokenKind::Type, "materialization"),
///         FilterToken::text("timeout"),
///     ]
/// );
/// ```
pub fn parse_query(input: &str) -> Vec<FilterToken> {
    let regex = TOKEN_REGEX
        .get_or_init(|| Regex::new(r"^(?i)(query|step|type):(.*)$").expect("invalid regex"));

    input
        .split_whitespace()
        .filter_map(|term| {
            let token = match regex.captures(term) {
                Some(captures) => {
                    let kind = match captures[1].to_ascii_lowercase().as_str() {
                        "query" => TokenKind::Query,
                        "step" => TokenKind::Step,
                        _ => TokenKind::Type,
                    };
                    FilterToken::new(kind, &captures[2])
                }
                None => FilterToken::text(term),
            };
            (!token.value.is_empty()).then_some(token)
        })
        .collect()
}

/// Resolve every `query:` token of `filter` into one step key set
pub fn resolve_selection(
    filter: &LogFilter,
    resolver: &dyn StepSelectionResolver,
) -> HashSet<String> {
    filter
        .tokens
        .iter()
        .filter(|token| token.kind == TokenKind::Query)
        .flat_map(|token| resolver.resolve(&token.value))
        .collect()
}

/// Whether a single token matches an event
pub fn token_matches(token: &FilterToken, event: &RunEvent, selection: &HashSet<String>) -> bool {
    match token.kind {
        TokenKind::Query => event
            .step_key
            .as_ref()
            .is_some_and(|key| selection.contains(key)),
        TokenKind::Step => event.step_key.as_deref() == Some(token.value.as_str()),
        TokenKind::Type => contains_ignore_case(event.kind.type_name(), &token.value),
        TokenKind::Text => contains_ignore_case(&event.message, &token.value),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Filter `events` for display and search.
///
/// `selection` holds the step keys resolved for `query:` tokens, see
/// [`resolve_selection`].
pub fn filter_logs<'a>(
    events: &'a [RunEvent],
    filter: &LogFilter,
    selection: &HashSet<String>,
) -> FilteredLogs<'a> {
    let display: Vec<&RunEvent> = events
        .iter()
        .filter(|event| filter.is_level_enabled(event.level) && event.timestamp >= filter.since)
        .collect();

    let has_text_filter = filter.has_text_filter();
    let search_matches = if has_text_filter {
        display
            .iter()
            .copied()
            .filter(|event| {
                filter
                    .tokens
                    .iter()
                    .all(|token| token_matches(token, event, selection))
            })
            .collect()
    } else {
        Vec::new()
    };

    FilteredLogs {
        display,
        search_matches,
        has_text_filter,
    }
}
