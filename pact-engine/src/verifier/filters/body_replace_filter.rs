use super::BodyFilter;
use regex::Regex;
use std::borrow::Cow;

#[derive(Debug)]
enum Pattern {
    Text(String),
    Regex(Regex),
}

/// Rewrites every occurrence of a text or regex in a request body, e.g. to
/// swap a consumer's fixture identifiers for ones the provider knows.
/// Regex substitutions may refer to capture groups as `$1` or `${name}`.
#[derive(Debug)]
pub struct BodyReplaceFilter {
    pattern: Pattern,
    replacement: String,
}

impl BodyReplaceFilter {
    pub fn text<S1: Into<String>, S2: Into<String>>(text: S1, replacement: S2) -> Self {
        Self {
            pattern: Pattern::Text(text.into()),
            replacement: replacement.into(),
        }
    }

    pub fn regex<S: Into<String>>(pattern: Regex, replacement: S) -> Self {
        Self {
            pattern: Pattern::Regex(pattern),
            replacement: replacement.into(),
        }
    }
}

impl BodyFilter for BodyReplaceFilter {
    fn apply(&self, body: &mut String) {
        let replaced = match &self.pattern {
            Pattern::Text(text) if text.is_empty() || !body.contains(text.as_str()) => return,
            Pattern::Text(text) => body.replace(text.as_str(), &self.replacement),
            Pattern::Regex(pattern) => match pattern.replace_all(body, self.replacement.as_str()) {
                Cow::Borrowed(_) => return,
                Cow::Owned(replaced) => replaced,
            },
        };
        *body = replaced;
    }
}
