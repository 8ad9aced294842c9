//! Filters rewriting the requests sent to a provider, for example to inject
//! credentials the pact cannot contain.

mod add_header_filter;
mod body_replace_filter;
mod remove_headers_filter;

use crate::models::{http::Headers, HttpRequest, OptionalBody};
use add_header_filter::AddHeaderFilter;
use body_replace_filter::BodyReplaceFilter;
use regex::Regex;
use remove_headers_filter::{RemoveHeadersFilter, RemoveHeadersRegexFilter};
use std::fmt::Debug;

pub trait BodyFilter: Debug {
    fn apply(&self, body: &mut String);
}

pub trait HeadersFilter: Debug {
    fn apply(&self, headers: &mut Headers);
}

#[derive(Debug)]
enum FilterType {
    Body(Box<dyn BodyFilter + Send + Sync>),
    Headers(Box<dyn HeadersFilter + Send + Sync>),
}

#[derive(Debug)]
pub struct RequestFilter {
    filter_type: FilterType,
}

impl RequestFilter {
    fn from_filter_type(filter_type: FilterType) -> Self {
        Self { filter_type }
    }

    pub fn apply(&self, request: &mut HttpRequest) {
        match &self.filter_type {
            FilterType::Headers(hf) => {
                let headers = request.headers.get_or_insert_with(Headers::new);
                hf.apply(headers);
                if headers.is_empty() {
                    request.headers = None;
                }
            }
            FilterType::Body(bf) => {
                // binary bodies are left alone
                if let OptionalBody::Present(bytes, content_type) = &request.body {
                    if let Ok(text) = std::str::from_utf8(bytes) {
                        let mut text = text.to_string();
                        bf.apply(&mut text);
                        request.body = OptionalBody::Present(text.into_bytes(), content_type.clone());
                    }
                }
            }
        }
    }
}

pub struct FiltersBuilder {
    filters: Vec<FilterType>,
}

impl FiltersBuilder {
    pub(crate) fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn remove_headers<S: Into<String>, I: IntoIterator<Item = S>>(
        &mut self,
        headers: I,
    ) -> &mut Self {
        self.add_headers_filter(RemoveHeadersFilter::new(headers))
    }

    pub fn remove_headers_regex<I: IntoIterator<Item = Regex>>(
        &mut self,
        patterns: I,
    ) -> &mut Self {
        self.add_headers_filter(RemoveHeadersRegexFilter::new(patterns))
    }

    pub fn add_header<S1: Into<String>, S2: Into<String>>(
        &mut self,
        header_name: S1,
        header_value: S2,
    ) -> &mut Self {
        self.add_headers_filter(AddHeaderFilter::new(header_name, header_value))
    }

    pub fn body_replace<S1: Into<String>, S2: Into<String>>(
        &mut self,
        text: S1,
        replacement: S2,
    ) -> &mut Self {
        self.add_body_filter(BodyReplaceFilter::text(text, replacement))
    }

    pub fn body_replace_regex<S: Into<String>>(
        &mut self,
        pattern: Regex,
        replacement: S,
    ) -> &mut Self {
        self.add_body_filter(BodyReplaceFilter::regex(pattern, replacement))
    }

    pub fn add_headers_filter<HF: HeadersFilter + Send + Sync + 'static>(
        &mut self,
        filter: HF,
    ) -> &mut Self {
        self.filters.push(FilterType::Headers(Box::new(filter)));
        self
    }

    pub fn add_body_filter<BF: BodyFilter + Send + Sync + 'static>(
        &mut self,
        filter: BF,
    ) -> &mut Self {
        self.filters.push(FilterType::Body(Box::new(filter)));
        self
    }

    pub fn into_request_filters(self) -> Vec<RequestFilter> {
        self.filters
            .into_iter()
            .map(RequestFilter::from_filter_type)
            .collect()
    }
}

impl Default for FiltersBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{http::HttpPart, ContentType};

    fn request() -> HttpRequest {
        let mut request = HttpRequest {
            method: "POST".into(),
            path: "/alligators".into(),
            body: OptionalBody::present(
                r#"{"token":"abc-123","name":"Mary"}"#,
                Some(ContentType::json()),
            ),
            ..HttpRequest::default()
        };
        request.add_header("Authorization", "Bearer old");
        request.add_header("X-Trace-Id", "1");
        request.add_header("X-Trace-Span", "2");
        request
    }

    #[test]
    fn header_filters_replace_and_remove() {
        let mut builder = FiltersBuilder::new();
        builder
            .add_header("authorization", "Bearer fresh")
            .remove_headers_regex(vec![Regex::new("(?i)^x-trace-").unwrap()]);
        let mut request = request();
        for filter in builder.into_request_filters() {
            filter.apply(&mut request);
        }

        let headers = request.headers.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["authorization"], vec!["Bearer fresh".to_string()]);
    }

    #[test]
    fn removing_every_header_clears_them() {
        let mut builder = FiltersBuilder::new();
        builder.remove_headers(vec!["Authorization", "X-TRACE-ID", "x-trace-span"]);
        let mut request = request();
        for filter in builder.into_request_filters() {
            filter.apply(&mut request);
        }
        assert_eq!(request.headers, None);
    }

    #[test]
    fn body_filters_rewrite_text_bodies() {
        let mut builder = FiltersBuilder::new();
        builder
            .body_replace("Mary", "Tom")
            .body_replace_regex(Regex::new(r"abc-\d+").unwrap(), "xyz-9");
        let mut request = request();
        for filter in builder.into_request_filters() {
            filter.apply(&mut request);
        }
        assert_eq!(
            request.body.value_as_string().unwrap(),
            r#"{"token":"xyz-9","name":"Tom"}"#
        );
        assert!(request.body.content_type().unwrap().is_json());
    }
}
