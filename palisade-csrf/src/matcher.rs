//! Wildcard URL patterns.
//!
//! A pattern is literal text in which `*` stands for any run of characters.
//! Compilation escapes every regex metacharacter in the literal segments,
//! collapses runs of `*` into a single wildcard and anchors both ends, so a
//! pattern always matches the *whole* URL. The `regex` engine runs in linear
//! time, so no pattern can trigger catastrophic backtracking.
//!
//! Patterns that carry a scheme (`https://host/...`) or start with `*` are
//! matched against the fully qualified URL; patterns starting with `/` are
//! matched against the path alone.

use crate::error::{CsrfError, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::trace;

const MAX_PATTERN_LENGTH: usize = 2048;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// What part of the request a pattern is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternScope {
    /// `scheme://host/path`
    Url,
    /// `/path`
    Path,
}

/// A compiled wildcard pattern
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    scope: PatternScope,
    regex: Regex,
}

impl UrlPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let malformed = |reason: &str| CsrfError::MalformedPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(malformed("pattern is empty"));
        }
        if pattern.len() > MAX_PATTERN_LENGTH {
            return Err(malformed("pattern is too long"));
        }
        if pattern.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(malformed("pattern contains whitespace or control characters"));
        }

        let scope = if pattern.contains("://") || pattern.starts_with('*') {
            PatternScope::Url
        } else if pattern.starts_with('/') {
            PatternScope::Path
        } else {
            return Err(malformed(
                "pattern must include a scheme or start with '/' or '*'",
            ));
        };

        let source = anchored(pattern, regex::escape, "(?s:.*)");
        let regex = RegexBuilder::new(&source)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| malformed(&e.to_string()))?;

        Ok(Self {
            raw: pattern.to_string(),
            scope,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scope(&self) -> PatternScope {
        self.scope
    }

    /// Equivalent JavaScript `RegExp` source, used by the client agent
    pub fn js_source(&self) -> String {
        anchored(&self.raw, js_escape, "[\\s\\S]*")
    }

    /// Test against a URL already split into its full form and its path
    pub fn is_match(&self, url: &str, path: &str) -> bool {
        match self.scope {
            PatternScope::Url => self.regex.is_match(url),
            PatternScope::Path => self.regex.is_match(path),
        }
    }
}

/// Escape literal segments and join them with `wildcard`, anchored.
/// Consecutive `*` collapse into one wildcard.
fn anchored(pattern: &str, escape: fn(&str) -> String, wildcard: &str) -> String {
    let mut source = String::with_capacity(pattern.len() * 2 + 2);
    source.push('^');
    let mut previous_was_wildcard = false;
    for (i, segment) in pattern.split('*').enumerate() {
        if i > 0 && !previous_was_wildcard {
            source.push_str(wildcard);
        }
        previous_was_wildcard = i > 0 && segment.is_empty();
        source.push_str(&escape(segment));
    }
    source.push('$');
    source
}

fn js_escape(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(
            c,
            '\\' | '^' | '$' | '.' | '|' | '?' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '/' | '-'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Drop the query string and fragment
fn without_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Path component of an absolute or path-only URL
fn path_of(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        }
        None => url,
    }
}

/// Ordered set of compiled patterns.
///
/// Patterns list the URLs whose GET requests must carry a token; every
/// other URL is exempt.
#[derive(Debug, Clone, Default)]
pub struct UrlMatcher {
    patterns: Vec<UrlPattern>,
}

impl UrlMatcher {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| UrlPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// First pattern matching `url`, if any
    pub fn matching_pattern(&self, url: &str) -> Option<&UrlPattern> {
        let url = without_query(url);
        let path = path_of(url);
        self.patterns.iter().find(|p| p.is_match(url, path))
    }

    /// True iff no pattern matches `url`
    pub fn is_exempt(&self, url: &str) -> bool {
        match self.matching_pattern(url) {
            Some(pattern) => {
                trace!(url = %url, pattern = %pattern.as_str(), "URL requires a token");
                false
            }
            None => true,
        }
    }

    pub fn patterns(&self) -> &[UrlPattern] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
