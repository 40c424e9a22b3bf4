//! Pulling JSON literals out of inline page scripts.

use regex::Regex;
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Text of every `<script>` without a `src`, in document order.
pub fn inline_scripts(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("script:not([src])") else {
        return Vec::new();
    };
    Html::parse_document(html)
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// The object or array literal starting at the beginning of `s`, matched
/// by bracket depth. Brackets inside string literals are ignored.
pub fn balanced(s: &str) -> Option<&str> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escape_next = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, c) if c == open => depth += 1,
            (None, c) if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Raw literal assigned to `name` (`name = {...}` or `name: [...]`).
pub fn variable_literal<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let pattern = Regex::new(&format!(r"\b{}\s*[=:]\s*", regex::escape(name))).ok()?;
    let literal = pattern
        .find_iter(text)
        .find_map(|m| balanced(&text[m.end()..]));
    literal
}

/// Deserialize the JSON literal assigned to `name`. `None` when the
/// variable is absent or its literal is not valid JSON.
pub fn extract_object<T: DeserializeOwned>(text: &str, name: &str) -> Option<T> {
    let literal = variable_literal(text, name)?;
    match serde_json::from_str(literal) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(variable = name, "Literal is not JSON: {e}");
            None
        }
    }
}
