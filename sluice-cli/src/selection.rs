use std::collections::HashSet;

use regex::Regex;
use sluice_core::log_filter::StepSelectionResolver;
use tracing::warn;

/// Resolves step selections against the step keys observed in a run.
///
/// A selection is a comma separated list of step key patterns where `*` matches
/// any run of characters. Leading and trailing `+` (upstream and downstream
/// expansion) are accepted but only select the named steps themselves, since
/// the execution plan is not known to the CLI.
#[derive(Debug, Default, Clone)]
pub struct StepKeyResolver {
    keys: Vec<String>,
}

impl StepKeyResolver {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl StepSelectionResolver for StepKeyResolver {
    fn resolve(&self, query: &str) -> HashSet<String> {
        query
            .split(',')
            .map(|term| term.trim().trim_matches('+'))
            .filter(|pattern| !pattern.is_empty())
            .filter_map(glob_regex)
            .flat_map(|pattern| {
                self.keys
                    .iter()
                    .filter(move |key| pattern.is_match(key))
                    .cloned()
            })
            .collect()
    }
}

// `*` matches any run of characters, everything else is literal
fn glob_regex(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    match Regex::new(&format!("^{body}$")) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Ignoring step selection {}: {}", pattern, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn resolver() -> StepKeyResolver {
        StepKeyResolver::new(
            ["extract_orders", "load_orders", "extract_users", "report"]
                .into_iter()
                .map(String::from),
        )
    }

    #[rstest]
    #[case("report", vec!["report"])]
    #[case("extract_*", vec!["extract_orders", "extract_users"])]
    #[case("*_orders", vec!["extract_orders", "load_orders"])]
    #[case("*orders+", vec!["extract_orders", "load_orders"])]
    #[case("++load_orders, report", vec!["load_orders", "report"])]
    #[case("e*t*s", vec!["extract_orders", "extract_users"])]
    #[case("*", vec!["extract_orders", "load_orders", "extract_users", "report"])]
    #[case("missing", vec![])]
    #[case("", vec![])]
    #[case("load.orders", vec![])]
    #[case("extract_(orders)", vec![])]
    fn resolves_patterns(#[case] query: &str, #[case] expected: Vec<&str>) {
        let expected: HashSet<String> = expected.into_iter().map(String::from).collect();

        assert_eq!(resolver().resolve(query), expected);
    }
}
