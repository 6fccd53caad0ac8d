//! Placeholder substitution for command templates.
//!
//! Placeholders are written `{name}`; names may contain letters, digits,
//! `_` and `.` (for example `{github.url}`). Literal braces are doubled.

use std::collections::BTreeMap;

use thiserror::Error;

/// Values bound into command templates.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, returning the updated set.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Copies every binding of `other` into this set.
    pub fn extend_from(&mut self, other: &Self) {
        self.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Looks up a binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Errors raised while resolving a template.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TemplateError {
    /// A placeholder has no binding.
    #[error("no value bound for {{{name}}} in `{template}`")]
    Unbound {
        /// Placeholder name.
        name: String,
        /// Template being resolved.
        template: String,
    },
    /// A brace is unbalanced or a placeholder name is invalid.
    #[error("malformed placeholder at byte {position} in `{template}`")]
    Malformed {
        /// Byte offset of the offending brace.
        position: usize,
        /// Template being resolved.
        template: String,
    },
}

/// Substitutes every placeholder in `template` with its binding.
///
/// # Errors
///
/// Returns [`TemplateError::Unbound`] for a placeholder without a value and
/// [`TemplateError::Malformed`] for unbalanced braces.
///
/// # Examples
///
/// ```
/// # use dropship::command::{Params, resolve};
/// let params = Params::new().with("strng", "hello world");
/// assert_eq!(resolve("echo \"{strng}\" {{x}}", &params).unwrap(), "echo \"hello world\" {x}");
/// ```
pub fn resolve(template: &str, params: &Params) -> Result<String, TemplateError> {
    let malformed = |position: usize| TemplateError::Malformed {
        position,
        template: template.to_owned(),
    };
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        match ch {
            '{' if chars.next_if(|&(_, next)| next == '{').is_some() => out.push('{'),
            '}' if chars.next_if(|&(_, next)| next == '}').is_some() => out.push('}'),
            '}' => return Err(malformed(position)),
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) if c.is_ascii_alphanumeric() || matches!(c, '_' | '.') => {
                            name.push(c);
                        }
                        _ => return Err(malformed(position)),
                    }
                }
                if name.is_empty() {
                    return Err(malformed(position));
                }
                let value = params.get(&name).ok_or_else(|| TemplateError::Unbound {
                    name: name.clone(),
                    template: template.to_owned(),
                })?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Doubles every brace so `text` survives [`resolve`] unchanged.
#[must_use]
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}
