//! Comparing actual requests, responses and messages with the expected ones.

pub mod body;
pub mod datetime;
pub mod form;
pub mod headers;
pub mod json;
pub mod rules;
pub mod xml;

pub use rules::{match_rule_list, match_values, Matches};

use crate::models::{
    matchingrules::{Category, MatchingRuleCategory},
    HttpRequest, HttpResponse, MessageContents, SyncMessage,
};
use crate::models::{http::HttpPart, DocPath};
use serde_json::{json, Value};
use std::fmt::Display;

/// One difference between an expected and an actual value.
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    MethodMismatch {
        expected: String,
        actual: String,
    },
    PathMismatch {
        expected: String,
        actual: String,
        mismatch: String,
    },
    StatusMismatch {
        expected: u16,
        actual: u16,
        mismatch: String,
    },
    QueryMismatch {
        parameter: String,
        expected: String,
        actual: String,
        mismatch: String,
    },
    HeaderMismatch {
        key: String,
        expected: String,
        actual: String,
        mismatch: String,
    },
    BodyTypeMismatch {
        expected: String,
        actual: String,
        mismatch: String,
    },
    BodyMismatch {
        path: String,
        expected: Option<Value>,
        actual: Option<Value>,
        mismatch: String,
    },
    MetadataMismatch {
        key: String,
        expected: String,
        actual: String,
        mismatch: String,
    },
}

impl Mismatch {
    pub fn mismatch_type(&self) -> &'static str {
        match self {
            Mismatch::MethodMismatch { .. } => "MethodMismatch",
            Mismatch::PathMismatch { .. } => "PathMismatch",
            Mismatch::StatusMismatch { .. } => "StatusMismatch",
            Mismatch::QueryMismatch { .. } => "QueryMismatch",
            Mismatch::HeaderMismatch { .. } => "HeaderMismatch",
            Mismatch::BodyTypeMismatch { .. } => "BodyTypeMismatch",
            Mismatch::BodyMismatch { .. } => "BodyMismatch",
            Mismatch::MetadataMismatch { .. } => "MetadataMismatch",
        }
    }

    /// Human readable description of the difference.
    pub fn description(&self) -> String {
        match self {
            Mismatch::MethodMismatch { expected, actual } => {
                format!("Expected a request with method '{}' but received '{}'", expected, actual)
            }
            Mismatch::PathMismatch { mismatch, .. }
            | Mismatch::StatusMismatch { mismatch, .. }
            | Mismatch::QueryMismatch { mismatch, .. }
            | Mismatch::HeaderMismatch { mismatch, .. }
            | Mismatch::BodyTypeMismatch { mismatch, .. }
            | Mismatch::BodyMismatch { mismatch, .. }
            | Mismatch::MetadataMismatch { mismatch, .. } => mismatch.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Mismatch::MethodMismatch { expected, actual } => json!({
                "type": self.mismatch_type(),
                "expected": expected,
                "actual": actual,
                "mismatch": self.description(),
            }),
            Mismatch::PathMismatch { expected, actual, mismatch }
            | Mismatch::BodyTypeMismatch { expected, actual, mismatch } => json!({
                "type": self.mismatch_type(),
                "expected": expected,
                "actual": actual,
                "mismatch": mismatch,
            }),
            Mismatch::StatusMismatch { expected, actual, mismatch } => json!({
                "type": self.mismatch_type(),
                "expected": expected,
                "actual": actual,
                "mismatch": mismatch,
            }),
            Mismatch::QueryMismatch { parameter, expected, actual, mismatch } => json!({
                "type": self.mismatch_type(),
                "parameter": parameter,
                "expected": expected,
                "actual": actual,
                "mismatch": mismatch,
            }),
            Mismatch::HeaderMismatch { key, expected, actual, mismatch }
            | Mismatch::MetadataMismatch { key, expected, actual, mismatch } => json!({
                "type": self.mismatch_type(),
                "key": key,
                "expected": expected,
                "actual": actual,
                "mismatch": mismatch,
            }),
            Mismatch::BodyMismatch { path, expected, actual, mismatch } => json!({
                "type": self.mismatch_type(),
                "path": path,
                "expected": expected.as_ref().map(rules::json_to_string),
                "actual": actual.as_ref().map(rules::json_to_string),
                "mismatch": mismatch,
            }),
        }
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.mismatch_type(), self.description())
    }
}

/// A location inside a document being compared, both as the segments used
/// to look up matching rules and as a printable expression.
#[derive(Debug, Clone)]
pub struct ValuePath {
    segments: Vec<String>,
    expression: DocPath,
}

impl ValuePath {
    pub fn root() -> Self {
        ValuePath {
            segments: vec!["$".to_string()],
            expression: DocPath::root(),
        }
    }

    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        ValuePath {
            segments,
            expression: self.expression.join(name),
        }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(index.to_string());
        ValuePath {
            segments,
            expression: self.expression.join_index(index),
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        self.segments.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl Display for ValuePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Rules and leniency in effect while comparing a body.
#[derive(Debug, Clone, Copy)]
pub struct MatchingContext<'a> {
    pub rules: &'a MatchingRuleCategory,
    /// Responses and messages may carry keys the consumer never asked for.
    pub allow_unexpected_keys: bool,
}

impl<'a> MatchingContext<'a> {
    pub fn new(rules: &'a MatchingRuleCategory, allow_unexpected_keys: bool) -> Self {
        MatchingContext {
            rules,
            allow_unexpected_keys,
        }
    }
}

/// Outcome of comparing an actual request with one expected request.
#[derive(Debug, Clone, Default)]
pub struct RequestMatchResult {
    pub method: Option<Mismatch>,
    pub path: Option<Mismatch>,
    pub query: Vec<Mismatch>,
    pub headers: Vec<Mismatch>,
    pub body: Vec<Mismatch>,
}

impl RequestMatchResult {
    pub fn all_matched(&self) -> bool {
        self.method.is_none()
            && self.path.is_none()
            && self.query.is_empty()
            && self.headers.is_empty()
            && self.body.is_empty()
    }

    /// Method and path agree, so the request was meant for this interaction.
    pub fn method_and_path_matched(&self) -> bool {
        self.method.is_none() && self.path.is_none()
    }

    pub fn mismatches(&self) -> Vec<Mismatch> {
        self.method
            .iter()
            .chain(self.path.iter())
            .chain(self.query.iter())
            .chain(self.headers.iter())
            .chain(self.body.iter())
            .cloned()
            .collect()
    }
}

pub fn match_method(expected: &str, actual: &str) -> Option<Mismatch> {
    if expected.eq_ignore_ascii_case(actual) {
        None
    } else {
        Some(Mismatch::MethodMismatch {
            expected: expected.to_uppercase(),
            actual: actual.to_uppercase(),
        })
    }
}

pub fn match_path(expected: &HttpRequest, actual: &str) -> Option<Mismatch> {
    let rules = expected
        .matching_rules
        .category(Category::Path)
        .and_then(|category| category.single());
    let result = match rules {
        Some(rules) => match_rule_list(rules, expected.path.as_str(), actual, false).map_err(|errors| errors.join(", ")),
        None if expected.path == actual => Ok(()),
        None => Err(format!(
            "Expected path '{}' but received '{}'",
            expected.path, actual
        )),
    };
    result.err().map(|mismatch| Mismatch::PathMismatch {
        expected: expected.path.clone(),
        actual: actual.to_string(),
        mismatch,
    })
}

/// Compares a request received by a mock server with an expected one.
pub fn match_request(expected: &HttpRequest, actual: &HttpRequest) -> RequestMatchResult {
    let rules = &expected.matching_rules;
    RequestMatchResult {
        method: match_method(&expected.method, &actual.method),
        path: match_path(expected, &actual.path),
        query: headers::match_query(
            expected.query.as_ref(),
            actual.query.as_ref(),
            &rules.category_or_empty(Category::Query),
        ),
        headers: headers::match_headers(
            expected.headers.as_ref(),
            actual.headers.as_ref(),
            &rules.category_or_empty(Category::Header),
        ),
        body: body::match_body(
            &expected.body,
            expected.content_type(),
            &actual.body,
            actual.content_type(),
            &rules.category_or_empty(Category::Body),
            false,
        ),
    }
}

pub fn match_status(expected: &HttpResponse, actual: u16) -> Option<Mismatch> {
    let rules = expected
        .matching_rules
        .category(Category::Status)
        .and_then(|category| category.single());
    let result = match rules {
        Some(rules) => match_rule_list(rules, &(expected.status as u64), actual as u64, false)
            .map_err(|errors| errors.join(", ")),
        None if expected.status == actual => Ok(()),
        None => Err(format!(
            "expected {} but was {}",
            expected.status, actual
        )),
    };
    result.err().map(|mismatch| Mismatch::StatusMismatch {
        expected: expected.status,
        actual,
        mismatch,
    })
}

/// Compares a provider's response with the expected one.
pub fn match_response(expected: &HttpResponse, actual: &HttpResponse) -> Vec<Mismatch> {
    let rules = &expected.matching_rules;
    let mut mismatches = Vec::new();
    mismatches.extend(match_status(expected, actual.status));
    mismatches.extend(headers::match_headers(
        expected.headers.as_ref(),
        actual.headers.as_ref(),
        &rules.category_or_empty(Category::Header),
    ));
    mismatches.extend(body::match_body(
        &expected.body,
        expected.content_type(),
        &actual.body,
        actual.content_type(),
        &rules.category_or_empty(Category::Body),
        true,
    ));
    mismatches
}

/// Compares message contents and metadata.
pub fn match_message(expected: &MessageContents, actual: &MessageContents) -> Vec<Mismatch> {
    let rules = &expected.matching_rules;
    let mut mismatches = body::match_body(
        &expected.contents,
        expected.content_type(),
        &actual.contents,
        actual.content_type(),
        &rules.category_or_empty(Category::Body),
        true,
    );
    mismatches.extend(headers::match_metadata(
        &expected.metadata,
        &actual.metadata,
        &rules.category_or_empty(Category::Metadata),
    ));
    mismatches
}

/// Compares a synchronous message exchange: the request and each response in
/// order.
pub fn match_sync_message(
    expected: &SyncMessage,
    actual_request: &MessageContents,
    actual_responses: &[MessageContents],
) -> Vec<Mismatch> {
    let mut mismatches = match_message(&expected.request, actual_request);
    if actual_responses.len() < expected.response.len() {
        mismatches.push(Mismatch::BodyMismatch {
            path: "$".to_string(),
            expected: Some(json!(expected.response.len())),
            actual: Some(json!(actual_responses.len())),
            mismatch: format!(
                "Expected {} response messages but received {}",
                expected.response.len(),
                actual_responses.len()
            ),
        });
    }
    for (expected, actual) in expected.response.iter().zip(actual_responses) {
        mismatches.extend(match_message(expected, actual));
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        matchingrules::{MatchingRule, MatchingRules},
        OptionalBody,
    };
    use std::collections::BTreeMap;

    fn request(method: &str, path: &str) -> HttpRequest {
        HttpRequest {
            method: method.into(),
            path: path.into(),
            ..HttpRequest::default()
        }
    }

    #[test]
    fn methods_compare_case_insensitively() {
        assert!(match_method("GET", "get").is_none());
        assert!(matches!(match_method("GET", "POST"), Some(Mismatch::MethodMismatch { .. })));
    }

    #[test]
    fn paths_can_use_rules() {
        let mut expected = request("GET", "/items/1");
        assert!(match_path(&expected, "/items/2").is_some());

        let mut rules = MatchingRules::default();
        rules.add_rule(Category::Path, DocPath::empty(), MatchingRule::regex("/items/\\d+"));
        expected.matching_rules = rules;
        assert!(match_path(&expected, "/items/2").is_none());
        assert!(match_path(&expected, "/items/x").is_some());
    }

    #[test]
    fn request_matching_collects_all_parts() {
        let mut expected = request("POST", "/alligators");
        expected.headers = Some(BTreeMap::from([("Content-Type".to_string(), vec!["application/json".to_string()])]));
        expected.body = OptionalBody::from_json(&json!({"name": "Mary"}));

        let mut actual = expected.clone();
        assert!(match_request(&expected, &actual).all_matched());

        actual.body = OptionalBody::from_json(&json!({"name": "Tom"}));
        actual.query = Some(BTreeMap::from([("debug".to_string(), vec!["1".to_string()])]));
        let result = match_request(&expected, &actual);
        assert!(result.method_and_path_matched());
        assert_eq!(result.query.len(), 1);
        assert_eq!(result.body.len(), 1);
    }

    #[test]
    fn status_mismatch() {
        let expected = HttpResponse::default();
        let actual = HttpResponse {
            status: 404,
            ..HttpResponse::default()
        };
        let mismatches = match_response(&expected, &actual);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].mismatch_type(), "StatusMismatch");
    }

    #[test]
    fn value_paths_print_as_expressions() {
        let path = ValuePath::root().field("items").index(0).field("first name");
        assert_eq!(path.to_string(), "$.items[0]['first name']");
        assert_eq!(path.segments(), vec!["$", "items", "0", "first name"]);
    }
}
