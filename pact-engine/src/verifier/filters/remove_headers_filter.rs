use super::HeadersFilter;
use crate::models::http::Headers;
use regex::Regex;

#[derive(Debug)]
pub struct RemoveHeadersFilter {
    headers: Vec<String>,
}

impl RemoveHeadersFilter {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(headers: I) -> Self {
        Self {
            headers: headers
                .into_iter()
                .map(|e| e.into().to_lowercase())
                .collect(),
        }
    }
}

impl HeadersFilter for RemoveHeadersFilter {
    fn apply(&self, headers: &mut Headers) {
        headers.retain(|key, _| !self.headers.contains(&key.to_lowercase()));
    }
}

#[derive(Debug)]
pub struct RemoveHeadersRegexFilter {
    patterns: Vec<Regex>,
}

impl RemoveHeadersRegexFilter {
    pub fn new<I: IntoIterator<Item = Regex>>(patterns: I) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
        }
    }
}

impl HeadersFilter for RemoveHeadersRegexFilter {
    fn apply(&self, headers: &mut Headers) {
        headers.retain(|key, _| !self.patterns.iter().any(|pattern| pattern.is_match(key)));
    }
}
