//! Per-subject configuration blob
//!
//! The store treats the configuration as opaque: it is written once when the
//! subject is created and read back verbatim. It is persisted as flat
//! `key=value` text, one pair per line, with `#` comment lines ignored:
//!
//! ```text
//! #SubjectConfig Properties
//! schema-repo.validators=avro.backward
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key holding the comma separated list of validator names
pub const VALIDATORS_KEY: &str = "schema-repo.validators";

const HEADER: &str = "#SubjectConfig Properties";

/// Immutable creation-time configuration of a subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfig {
    #[serde(flatten)]
    entries: BTreeMap<String, String>,
}

impl SubjectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config carrying the given validator names
    pub fn with_validators<I, S>(validators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = validators
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        let mut config = Self::new();
        config.entries.insert(VALIDATORS_KEY.to_string(), joined);
        config
    }

    /// Set an arbitrary property
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Validator names, in configured order
    pub fn validators(&self) -> Vec<String> {
        self.get(VALIDATORS_KEY)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Encode as `key=value` lines, keys sorted
    pub fn to_properties(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for (key, value) in &self.entries {
            out.push_str(&escape(key, true));
            out.push('=');
            out.push_str(&escape(value, false));
            out.push('\n');
        }
        out
    }

    /// Decode text produced by [`SubjectConfig::to_properties`]
    ///
    /// Lines without a separator become keys with an empty value.
    pub fn from_properties(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim_start_matches([' ', '\t', '\u{c}']);
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = split_pair(line);
            entries.insert(unescape(key), unescape(value));
        }
        Self { entries }
    }
}

impl From<BTreeMap<String, String>> for SubjectConfig {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

fn escape(raw: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' ' if i == 0 || is_key => out.push_str("\\ "),
            // escaped so no properties reader trims it
            c if i == 0 && c.is_whitespace() => {
                out.push('\\');
                out.push(c);
            }
            '=' | ':' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Split at the first unescaped `=` or `:`
fn split_pair(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], &line[i + 1..]),
            _ => {}
        }
    }
    (line, "")
}
