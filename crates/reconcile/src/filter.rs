//! Target and filter selectors
//!
//! User-supplied selector lists are composed into a single [`Matcher`].
//! Each selector is a literal with `*` wildcards; a leading `!` turns it
//! into an exclusion.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// How a selector is compared against a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Selector may match anywhere in the candidate (patch paths)
    Substring,
    /// Selector must match the whole candidate (package names)
    Exact,
}

/// A composed selector: matches any include pattern and no exclude pattern
#[derive(Debug, Clone)]
pub struct Matcher {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl Matcher {
    pub fn is_match(&self, candidate: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .is_none_or(|regex| regex.is_match(candidate));
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|regex| regex.is_match(candidate));
        included && !excluded
    }
}

/// Compose selectors into one matcher
///
/// Returns `None` for an empty (or all-blank) list. Deciding that no
/// matcher means "match everything" is left to the caller.
///
/// # Errors
/// Fails when the composed expression cannot be compiled, e.g. when it
/// exceeds the regex size limit.
pub fn compose_regex<S: AsRef<str>>(patterns: &[S], mode: MatchMode) -> Result<Option<Matcher>> {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref().trim();
        if pattern.is_empty() {
            continue;
        }
        match pattern.strip_prefix('!') {
            Some(negated) if !negated.is_empty() => excludes.push(translate(negated)),
            Some(_) => {}
            None => includes.push(translate(pattern)),
        }
    }

    if includes.is_empty() && excludes.is_empty() {
        return Ok(None);
    }

    Ok(Some(Matcher {
        include: build(&includes, mode)?,
        exclude: build(&excludes, mode)?,
    }))
}

fn translate(pattern: &str) -> String {
    pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

fn build(alternatives: &[String], mode: MatchMode) -> Result<Option<Regex>> {
    if alternatives.is_empty() {
        return Ok(None);
    }
    let body = alternatives.join("|");
    let source = match mode {
        MatchMode::Substring => format!("(?:{body})"),
        MatchMode::Exact => format!("^(?:{body})$"),
    };
    Regex::new(&source)
        .map(Some)
        .map_err(|e| Error::Selector {
            selectors: alternatives.join(","),
            source: e,
        })
}

/// Keep only inner entries whose key matches, dropping emptied outer entries
pub fn filter_by_sub_item_keys<V: Clone>(
    items: &BTreeMap<String, BTreeMap<String, V>>,
    matcher: &Matcher,
) -> BTreeMap<String, BTreeMap<String, V>> {
    items
        .iter()
        .filter_map(|(outer, inner)| {
            let kept: BTreeMap<String, V> = inner
                .iter()
                .filter(|(key, _)| matcher.is_match(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            (!kept.is_empty()).then(|| (outer.clone(), kept))
        })
        .collect()
}

/// Keep only outer entries whose key matches
pub fn filter_keys<V: Clone>(items: &BTreeMap<String, V>, matcher: &Matcher) -> BTreeMap<String, V> {
    items
        .iter()
        .filter(|(key, _)| matcher.is_match(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
