//! Shell-style variable expansion over an explicit variable scope.
//!
//! Supported forms are `$VAR`, `${VAR}`, `${VAR:-default}` (default used when
//! `VAR` is unset or empty) and `${VAR-default}` (default used only when `VAR`
//! is unset). `\$` produces a literal dollar sign. Defaults are expanded
//! themselves, so `${A:-${B}}` works.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("{name}: unbound variable")]
    Unbound { name: String },

    #[error("unterminated \"${{\" in {input:?}")]
    Unterminated { input: String },

    #[error("bad substitution: \"${{{expr}}}\"")]
    BadSubstitution { expr: String },
}

/// The set of variables visible to [`VarScope::expand`].
///
/// A scope is usually seeded from the process environment and then extended
/// with config-local `[env]` entries. Extending a scope never touches the real
/// process environment.
#[derive(Debug, Clone, Default)]
pub struct VarScope {
    vars: HashMap<String, String>,
}

impl VarScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment. Non-UTF-8 entries are left out.
    pub fn from_process_env() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn expand(&self, input: &str) -> Result<String, ExpandError> {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some((_, '$'))) => {
                    chars.next();
                    out.push('$');
                }
                '$' => match chars.peek() {
                    Some((start, '{')) => {
                        let start = *start + 1;
                        chars.next();
                        let end = find_closing_brace(&mut chars).ok_or_else(|| {
                            ExpandError::Unterminated {
                                input: input.to_string(),
                            }
                        })?;
                        out.push_str(&self.expand_braced(&input[start..end])?);
                    }
                    Some((start, next)) if is_name_start(*next) => {
                        let start = *start;
                        let mut end = input.len();
                        while let Some((i, ch)) = chars.peek() {
                            if !is_name_char(*ch) {
                                end = *i;
                                break;
                            }
                            chars.next();
                        }
                        out.push_str(self.lookup(&input[start..end])?);
                    }
                    _ => out.push('$'),
                },
                other => out.push(other),
            }
        }

        Ok(out)
    }

    fn lookup(&self, name: &str) -> Result<&str, ExpandError> {
        self.get(name).ok_or_else(|| ExpandError::Unbound {
            name: name.to_string(),
        })
    }

    /// Expands the inside of a `${...}` reference.
    fn expand_braced(&self, expr: &str) -> Result<String, ExpandError> {
        let name_len = expr
            .char_indices()
            .find(|(i, c)| if *i == 0 { !is_name_start(*c) } else { !is_name_char(*c) })
            .map(|(i, _)| i)
            .unwrap_or(expr.len());
        let bad = || ExpandError::BadSubstitution {
            expr: expr.to_string(),
        };
        if name_len == 0 {
            return Err(bad());
        }

        let (name, modifier) = expr.split_at(name_len);
        let value = self.get(name);

        if modifier.is_empty() {
            return self.lookup(name).map(str::to_string);
        }
        if let Some(default) = modifier.strip_prefix(":-") {
            return match value {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => self.expand(default),
            };
        }
        if let Some(default) = modifier.strip_prefix('-') {
            return match value {
                Some(v) => Ok(v.to_string()),
                None => self.expand(default),
            };
        }
        Err(bad())
    }
}

/// Consumes up to and including the `}` matching an already-consumed `${`,
/// returning the byte offset of that `}`.
fn find_closing_brace(chars: &mut Peekable<CharIndices<'_>>) -> Option<usize> {
    let mut depth = 1usize;
    let mut prev_dollar = false;
    for (i, c) in chars.by_ref() {
        match c {
            '{' if prev_dollar => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        prev_dollar = c == '$';
    }
    None
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
