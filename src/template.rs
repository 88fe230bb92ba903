//! Placeholder substitution for poster templates.
//!
//! Tokens look like `{{name}}`, with optional whitespace inside the braces
//! (`{{ name }}`). Every occurrence of a recognized name is replaced in a
//! single pass, so substituted values are never re-expanded.

use crate::fields::{PosterFields, PLACEHOLDERS};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Whether `text` still holds a placeholder token of any name.
pub fn contains_placeholder(text: &str) -> bool {
    token_pattern().is_match(text)
}

/// How field values are written into the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Substitution {
    /// Insert values verbatim
    #[default]
    Raw,
    /// Escape `& < > " '` before insertion
    Escaped,
}

/// Substitute every recognized placeholder in `template` with its field value.
///
/// Unsupplied fields become the empty string. Tokens whose name is not a
/// recognized placeholder are left untouched.
pub fn render(template: &str, fields: &PosterFields, mode: Substitution) -> String {
    token_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            if !PLACEHOLDERS.contains(&name) {
                return caps[0].to_string();
            }
            match mode {
                Substitution::Raw => fields.get(name).to_string(),
                Substitution::Escaped => escape_html(fields.get(name)).into_owned(),
            }
        })
        .into_owned()
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape_html(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 16);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
