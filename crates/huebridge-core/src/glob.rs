//! Glob patterns for device ID filters and command targets
//!
//! Device IDs carry no path separators, so `*` and `**` both match any run of
//! characters. Supported syntax:
//! - `*`, `**` any sequence, `?` exactly one character
//! - `[abc]`, `[a-z]`, `[!abc]` character classes
//! - `{kitchen,hallway}` alternatives (may nest and contain wildcards)
//! - `\x` literal `x`
//!
//! Patterns are compiled once into an anchored `regex::Regex`.

use regex::Regex;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GlobError {
    #[error("unclosed character class in pattern {0:?}")]
    UnclosedClass(String),
    #[error("unclosed alternation in pattern {0:?}")]
    UnclosedAlternation(String),
    #[error("pattern {0:?} ends with an escape")]
    TrailingEscape(String),
    #[error("invalid pattern {pattern:?}: {reason}")]
    Invalid { pattern: String, reason: String },
}

/// A compiled glob pattern
#[derive(Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile a glob pattern
    pub fn compile(pattern: &str) -> Result<Self, GlobError> {
        let chars: Vec<char> = pattern.chars().collect();
        let body = translate(&chars, pattern)?;
        let regex = Regex::new(&format!("^(?s:{})$", body)).map_err(|e| GlobError::Invalid {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.pattern).finish()
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// Translate a slice of glob characters into a regex fragment
fn translate(chars: &[char], pattern: &str) -> Result<String, GlobError> {
    let mut out = String::with_capacity(chars.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Collapse runs of stars; without separators they are equivalent
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '\\' => {
                let next = chars
                    .get(i + 1)
                    .ok_or_else(|| GlobError::TrailingEscape(pattern.to_string()))?;
                out.push_str(&regex::escape(&next.to_string()));
                i += 1;
            }
            '[' => {
                let end = find_class_end(chars, i)
                    .ok_or_else(|| GlobError::UnclosedClass(pattern.to_string()))?;
                out.push_str(&translate_class(&chars[i + 1..end]));
                i = end;
            }
            '{' => {
                let end = find_alternation_end(chars, i)
                    .ok_or_else(|| GlobError::UnclosedAlternation(pattern.to_string()))?;
                let mut branches = Vec::new();
                for branch in split_alternatives(&chars[i + 1..end]) {
                    branches.push(translate(branch, pattern)?);
                }
                out.push_str("(?:");
                out.push_str(&branches.join("|"));
                out.push(')');
                i = end;
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    Ok(out)
}

/// Index of the `]` closing the class opened at `start`
fn find_class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    // A leading `!` and a `]` right after the opener are class members
    if chars.get(i) == Some(&'!') {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn translate_class(members: &[char]) -> String {
    let mut out = String::from("[");
    let mut members = members;
    if members.first() == Some(&'!') {
        out.push('^');
        members = &members[1..];
    }

    let mut i = 0;
    while i < members.len() {
        let c = members[i];
        match c {
            '\\' if i + 1 < members.len() => {
                let escaped = members[i + 1];
                if "[]^-&~\\".contains(escaped) {
                    out.push('\\');
                }
                out.push(escaped);
                i += 1;
            }
            '-' if i > 0 && i + 1 < members.len() => out.push('-'),
            '[' | ']' | '^' | '-' | '&' | '~' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out.push(']');
    out
}

/// Index of the `}` closing the alternation opened at `start`
fn find_alternation_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split alternation contents on top-level commas
fn split_alternatives(chars: &[char]) -> Vec<&[char]> {
    let mut branches = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                branches.push(&chars[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    branches.push(&chars[start.min(chars.len())..]);
    branches
}
