//! Type-name patterns
//!
//! Two syntaxes are accepted. A plain pattern is literal text where each `*`
//! captures any run of characters; in its replacement template the n-th `*`
//! stands for the n-th capture. A pattern starting with `regex:` is a regular
//! expression used as-is, and a replacement starting with `regex:` is used
//! verbatim with `$1` style references.
//!
//! Nested type names use `+` (or `/`) where authors usually write `.`. When
//! the raw name does not match, the match is retried with those separators
//! read as `.`. On that retry, captured text is copied from the raw name with
//! its separators (normalized to `+`); template text is kept as written.

use crate::{WeaveError, WeaveResult};
use regex::{Captures, Regex};
use std::borrow::Cow;

/// Prefix marking a pattern or replacement as a raw regular expression
pub const REGEX_PREFIX: &str = "regex:";

const FILLER: char = '.';

/// Outcome of [`Matcher::try_match`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    /// Rewritten name; `None` on no match or when the matcher has no template
    pub replacement: Option<String>,
}

impl MatchResult {
    #[inline]
    pub fn no_match() -> Self {
        Self {
            matched: false,
            replacement: None,
        }
    }
}

/// A compiled name pattern with an optional replacement template
#[derive(Debug, Clone)]
pub struct Matcher {
    source: String,
    regex: Regex,
    replacement: Option<String>,
}

impl Matcher {
    /// Compile `pattern` with a replacement template
    pub fn new(pattern: &str, replacement: &str) -> WeaveResult<Self> {
        let mut matcher = Self::literal(pattern)?;
        matcher.replacement = Some(translate_replacement(replacement));
        Ok(matcher)
    }

    /// Compile a match-only pattern
    pub fn literal(pattern: &str) -> WeaveResult<Self> {
        let expression = match pattern.strip_prefix(REGEX_PREFIX) {
            Some(raw) => raw.to_string(),
            None => translate_wildcard(pattern),
        };
        let regex =
            Regex::new(&expression).map_err(|e| WeaveError::invalid_pattern(pattern, e))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            replacement: None,
        })
    }

    /// Pattern text as written
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input) || self.regex.is_match(&normalize_separators(input))
    }

    /// Match `input` and compute the replacement, if any
    pub fn try_match(&self, input: &str) -> MatchResult {
        if let Some(caps) = self.regex.captures(input) {
            return MatchResult {
                matched: true,
                replacement: self.replace(&caps, input, false),
            };
        }

        let normalized = normalize_separators(input);
        if normalized == input {
            return MatchResult::no_match();
        }
        match self.regex.captures(&normalized) {
            Some(caps) => MatchResult {
                matched: true,
                replacement: self.replace(&caps, input, true),
            },
            None => MatchResult::no_match(),
        }
    }

    fn replace(&self, caps: &Captures<'_>, original: &str, retried: bool) -> Option<String> {
        let template = self.replacement.as_ref()?;
        let whole = caps.get(0)?;

        let mut out = String::with_capacity(original.len() + template.len());
        out.push_str(&nested_text(&original[..whole.start()], retried));
        expand(template, caps, original, retried, &mut out);
        out.push_str(&nested_text(&original[whole.end()..], retried));
        Some(out)
    }
}

fn normalize_separators(input: &str) -> String {
    input.replace(['+', '/'], &FILLER.to_string())
}

/// Text taken from the raw input; on a retry `/` is spelled `+`
fn nested_text(text: &str, retried: bool) -> Cow<'_, str> {
    if retried && text.contains('/') {
        Cow::Owned(text.replace('/', "+"))
    } else {
        Cow::Borrowed(text)
    }
}

fn translate_wildcard(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("(.*)");
    format!("^{body}$")
}

fn translate_replacement(replacement: &str) -> String {
    if let Some(raw) = replacement.strip_prefix(REGEX_PREFIX) {
        return raw.to_string();
    }
    let mut out = String::with_capacity(replacement.len() + 8);
    let mut group = 0;
    for ch in replacement.chars() {
        match ch {
            '*' => {
                group += 1;
                out.push_str(&format!("${{{group}}}"));
            }
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out
}

/// Expand `$n`, `${n}`, `$name`, `${name}` and `$$`, taking group text from
/// `original` at the captured offsets.
fn expand<'o>(
    template: &str,
    caps: &Captures<'_>,
    original: &'o str,
    retried: bool,
    out: &mut String,
) {
    // Offsets line up with `original`: separators and filler are one byte each
    let group_text = |reference: &str| -> Cow<'o, str> {
        let found = match reference.parse::<usize>() {
            Ok(index) => caps.get(index),
            Err(_) => caps.name(reference),
        };
        found.map_or(Cow::Borrowed(""), |m| nested_text(&original[m.range()], retried))
    };

    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        if let Some(after) = rest.strip_prefix('$') {
            out.push('$');
            rest = after;
        } else if let Some(braced) = rest.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    out.push_str(&group_text(&braced[..end]));
                    rest = &braced[end + 1..];
                }
                None => {
                    out.push_str("${");
                    rest = braced;
                }
            }
        } else {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end == 0 {
                out.push('$');
            } else {
                out.push_str(&group_text(&rest[..end]));
            }
            rest = &rest[end..];
        }
    }
    out.push_str(rest);
}
