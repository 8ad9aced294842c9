//! Body comparison, dispatched on the content type.

use super::{form, json, match_rule_list, xml, MatchingContext, Mismatch};
use crate::models::{matchingrules::MatchingRuleCategory, ContentType, OptionalBody};
use serde_json::Value;
use tracing::debug;

fn body_mismatch(expected: Option<Value>, actual: Option<Value>, message: String) -> Mismatch {
    Mismatch::BodyMismatch {
        path: "$".to_string(),
        expected,
        actual,
        mismatch: message,
    }
}

fn text_of(body: &OptionalBody) -> String {
    body.value_as_string().unwrap_or_default()
}

/// Compares an actual body with the expected one. A body that was never
/// specified is not checked at all.
pub fn match_body(
    expected: &OptionalBody,
    expected_type: Option<ContentType>,
    actual: &OptionalBody,
    actual_type: Option<ContentType>,
    rules: &MatchingRuleCategory,
    allow_unexpected_keys: bool,
) -> Vec<Mismatch> {
    match (expected, actual) {
        (OptionalBody::Missing, _) => vec![],
        (OptionalBody::Empty, OptionalBody::Missing | OptionalBody::Empty) => vec![],
        (OptionalBody::Empty, _) => vec![body_mismatch(
            Some(Value::String(String::new())),
            actual.value_as_string().map(Value::String),
            "Expected an empty body but received one".to_string(),
        )],
        (OptionalBody::Null, OptionalBody::Null) => vec![],
        (OptionalBody::Null, OptionalBody::Present(..)) if actual.as_json() == Some(Value::Null) => vec![],
        (OptionalBody::Null, _) => vec![body_mismatch(
            Some(Value::Null),
            actual.value_as_string().map(Value::String),
            "Expected a null body".to_string(),
        )],
        (OptionalBody::Present(..), OptionalBody::Missing | OptionalBody::Empty | OptionalBody::Null) => {
            vec![body_mismatch(
                expected.value_as_string().map(Value::String),
                None,
                "Expected a body but received none".to_string(),
            )]
        }
        (OptionalBody::Present(..), OptionalBody::Present(..)) => {
            let expected_type = expected_type
                .or_else(|| expected.resolved_content_type())
                .unwrap_or_else(ContentType::text);
            let actual_type = actual_type
                .or_else(|| actual.resolved_content_type())
                .unwrap_or_else(ContentType::text);
            compare_present(expected, &expected_type, actual, &actual_type, rules, allow_unexpected_keys)
        }
    }
}

fn compare_present(
    expected: &OptionalBody,
    expected_type: &ContentType,
    actual: &OptionalBody,
    actual_type: &ContentType,
    rules: &MatchingRuleCategory,
    allow_unexpected_keys: bool,
) -> Vec<Mismatch> {
    let context = MatchingContext::new(rules, allow_unexpected_keys);
    let same_family = expected_type.is_equivalent_to(actual_type)
        || (expected_type.is_json() && actual_type.is_json())
        || (expected_type.is_xml() && actual_type.is_xml());
    if !same_family {
        return vec![Mismatch::BodyTypeMismatch {
            expected: expected_type.base_type(),
            actual: actual_type.base_type(),
            mismatch: format!(
                "Expected a body of '{}' but the actual content type was '{}'",
                expected_type.base_type(),
                actual_type.base_type()
            ),
        }];
    }

    debug!("Comparing bodies of type {}", expected_type.base_type());
    let expected_bytes = expected.value().unwrap_or_default();
    let actual_bytes = actual.value().unwrap_or_default();

    if expected_type.is_json() {
        match (
            serde_json::from_slice::<Value>(expected_bytes),
            serde_json::from_slice::<Value>(actual_bytes),
        ) {
            (Ok(expected_json), Ok(actual_json)) => json::compare_json(&expected_json, &actual_json, &context),
            (Err(err), _) => vec![body_mismatch(
                Some(Value::String(text_of(expected))),
                None,
                format!("Failed to parse the expected body: {}", err),
            )],
            (_, Err(err)) => vec![body_mismatch(
                None,
                Some(Value::String(text_of(actual))),
                format!("Failed to parse the actual body: {}", err),
            )],
        }
    } else if expected_type.is_xml() {
        xml::match_xml(&text_of(expected), &text_of(actual), &context)
    } else if expected_type.is_form_urlencoded() {
        form::match_form_urlencoded(&text_of(expected), &text_of(actual), &context)
    } else if expected_type.is_multipart() {
        form::match_multipart(expected_bytes, expected_type, actual_bytes, actual_type, &context)
    } else if expected_type.is_text() {
        let (expected_text, actual_text) = (text_of(expected), text_of(actual));
        let result = match rules.resolve(&["$"]) {
            Some(resolved) => {
                match_rule_list(resolved.rules, expected_text.as_str(), actual_text.as_str(), false)
                    .map_err(|errors| errors.join(", "))
            }
            None if expected_text == actual_text => Ok(()),
            None => Err(format!(
                "Expected body '{}' to be equal to '{}'",
                actual_text, expected_text
            )),
        };
        result
            .err()
            .map(|message| body_mismatch(Some(Value::String(expected_text)), Some(Value::String(actual_text)), message))
            .into_iter()
            .collect()
    } else {
        let result = match rules.resolve(&["$"]) {
            Some(resolved) => {
                match_rule_list(resolved.rules, expected_bytes, actual_bytes, false).map_err(|errors| errors.join(", "))
            }
            None if expected_bytes == actual_bytes => Ok(()),
            None => Err(format!(
                "Expected binary contents of {} bytes but received {} bytes that differ",
                expected_bytes.len(),
                actual_bytes.len()
            )),
        };
        result.err().map(|message| body_mismatch(None, None, message)).into_iter().collect()
    }
}
