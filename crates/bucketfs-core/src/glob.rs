//! Shell-style name patterns.
//!
//! `*` matches any run of characters, `?` exactly one, `[abc]` / `[a-z]` a
//! set and `[!abc]` its complement. Everything else matches literally.
//! Matching is anchored and case-sensitive.

use crate::error::PathError;
use regex::Regex;
use std::fmt;

/// A compiled shell pattern.
///
/// ```
/// use bucketfs_core::glob::Glob;
///
/// let glob = Glob::new("*.log").unwrap();
/// assert!(glob.matches("app.log"));
/// assert!(!glob.matches("app.log.gz"));
/// ```
#[derive(Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.pattern).finish()
    }
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        let regex = Regex::new(&translate(pattern)).map_err(|e| PathError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// Whether `name` passes an include/exclude filter pair.
///
/// An empty include list admits everything; any exclude match rejects.
pub fn passes_filters(name: &str, include: &[Glob], exclude: &[Glob]) -> bool {
    (include.is_empty() || include.iter().any(|g| g.matches(name)))
        && !exclude.iter().any(|g| g.matches(name))
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("^(?s:");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push_str(".*");
                // Collapse runs of stars.
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
            }
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i + 1..end]));
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }
    out.push_str(")$");
    out
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if chars.get(j) == Some(&'!') {
        j += 1;
    }
    // A leading `]` is a literal member.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

fn translate_class(body: &[char]) -> String {
    let (negate, body) = match body.first() {
        Some('!') => (true, &body[1..]),
        _ => (false, body),
    };
    let mut class = String::from("[");
    if negate {
        class.push('^');
    }
    for &c in body {
        match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => {
                class.push('\\');
                class.push(c);
            }
            _ => class.push(c),
        }
    }
    class.push(']');
    class
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, name: &str) -> bool {
        Glob::new(pattern).unwrap().matches(name)
    }

    #[test]
    fn test_wildcards() {
        assert!(m("*.txt", "notes.txt"));
        assert!(m("*", ""));
        assert!(m("data-??.csv", "data-01.csv"));
        assert!(!m("data-??.csv", "data-1.csv"));
        assert!(m("**x", "abcx"));
    }

    #[test]
    fn test_classes() {
        assert!(m("file[0-9].log", "file7.log"));
        assert!(!m("file[0-9].log", "fileA.log"));
        assert!(m("file[!0-9].log", "fileA.log"));
        assert!(m("[]]x", "]x"));
        assert!(m("a[", "a["));
    }

    #[test]
    fn test_literals_are_escaped() {
        assert!(m("a.b", "a.b"));
        assert!(!m("a.b", "axb"));
        assert!(m("(x)+", "(x)+"));
        assert!(m("c^d$", "c^d$"));
    }

    #[test]
    fn test_filters() {
        let include = vec![Glob::new("*.jpg").unwrap(), Glob::new("*.png").unwrap()];
        let exclude = vec![Glob::new("thumb_*").unwrap()];
        assert!(passes_filters("a.jpg", &include, &exclude));
        assert!(!passes_filters("thumb_a.jpg", &include, &exclude));
        assert!(!passes_filters("a.gif", &include, &exclude));
        assert!(passes_filters("anything", &[], &[]));
    }
}
