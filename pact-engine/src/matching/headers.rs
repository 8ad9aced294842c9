//! Headers, query parameters and message metadata.

use super::{rules::json_to_string, match_rule_list, Mismatch};
use crate::models::{
    http::{Headers, Query},
    matchingrules::MatchingRuleCategory,
    ContentType,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Headers whose values may legitimately contain commas.
const SINGLE_VALUE_HEADERS: &[&str] = &[
    "date",
    "expires",
    "last-modified",
    "if-modified-since",
    "if-unmodified-since",
    "retry-after",
    "set-cookie",
    "www-authenticate",
    "user-agent",
];

/// Splits a header value list into its individual, trimmed values.
pub fn header_values(name: &str, values: &[String]) -> Vec<String> {
    let lowercase = name.to_lowercase();
    if SINGLE_VALUE_HEADERS.contains(&lowercase.as_str()) {
        return values.iter().map(|v| v.trim().to_string()).collect();
    }
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<(&'a String, &'a Vec<String>)> {
    headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name))
}

fn content_types_match(expected: &str, actual: &str) -> bool {
    match (expected.parse::<ContentType>(), actual.parse::<ContentType>()) {
        (Ok(expected), Ok(actual)) => {
            expected.is_equivalent_to(&actual)
                && expected.attributes.iter().all(|(key, value)| {
                    actual
                        .attributes
                        .get(key)
                        .map(|other| other.eq_ignore_ascii_case(value))
                        .unwrap_or(false)
                })
        }
        _ => expected == actual,
    }
}

/// Every expected header must be present in the actual headers. Extra actual
/// headers are fine.
pub fn match_headers(expected: Option<&Headers>, actual: Option<&Headers>, rules: &MatchingRuleCategory) -> Vec<Mismatch> {
    let expected = match expected {
        Some(expected) => expected,
        None => return vec![],
    };
    let empty = Headers::new();
    let actual = actual.unwrap_or(&empty);

    let mut mismatches = Vec::new();
    for (name, expected_values) in expected {
        let expected_joined = expected_values.join(", ");
        let (_, actual_values) = match find_header(actual, name) {
            Some(found) => found,
            None => {
                mismatches.push(Mismatch::HeaderMismatch {
                    key: name.clone(),
                    expected: expected_joined,
                    actual: String::new(),
                    mismatch: format!("Expected a header '{}' but was missing", name),
                });
                continue;
            }
        };
        let actual_joined = actual_values.join(", ");

        let result = if let Some(rule_list) = rules.resolve_key(name) {
            match_rule_list(rule_list, expected_joined.as_str(), actual_joined.as_str(), false)
                .map_err(|errors| errors.join(", "))
        } else if name.eq_ignore_ascii_case("content-type") {
            if content_types_match(&expected_joined, &actual_joined) {
                Ok(())
            } else {
                Err(format!(
                    "Expected header '{}' to have value '{}' but was '{}'",
                    name, expected_joined, actual_joined
                ))
            }
        } else {
            let expected_split = header_values(name, expected_values);
            let actual_split = header_values(name, actual_values);
            if expected_split == actual_split {
                Ok(())
            } else {
                Err(format!(
                    "Expected header '{}' to have value '{}' but was '{}'",
                    name, expected_joined, actual_joined
                ))
            }
        };

        if let Err(mismatch) = result {
            mismatches.push(Mismatch::HeaderMismatch {
                key: name.clone(),
                expected: expected_joined,
                actual: actual_joined,
                mismatch,
            });
        }
    }
    mismatches
}

/// Query parameters must match as a set of names: missing and unexpected
/// parameters are both reported.
pub fn match_query(expected: Option<&Query>, actual: Option<&Query>, rules: &MatchingRuleCategory) -> Vec<Mismatch> {
    let empty = Query::new();
    let expected = expected.unwrap_or(&empty);
    let actual = actual.unwrap_or(&empty);
    let mut mismatches = Vec::new();

    for (name, expected_values) in expected {
        let actual_values = match actual.get(name) {
            Some(values) => values,
            None => {
                mismatches.push(Mismatch::QueryMismatch {
                    parameter: name.clone(),
                    expected: format!("{:?}", expected_values),
                    actual: String::new(),
                    mismatch: format!(
                        "Expected query parameter '{}' but was missing",
                        name
                    ),
                });
                continue;
            }
        };
        mismatches.extend(match_query_values(name, expected_values, actual_values, rules));
    }

    for (name, actual_values) in actual {
        if !expected.contains_key(name) {
            mismatches.push(Mismatch::QueryMismatch {
                parameter: name.clone(),
                expected: String::new(),
                actual: format!("{:?}", actual_values),
                mismatch: format!(
                    "Unexpected query parameter '{}' received",
                    name
                ),
            });
        }
    }
    mismatches
}

fn match_query_values(
    name: &str,
    expected: &[String],
    actual: &[String],
    rules: &MatchingRuleCategory,
) -> Vec<Mismatch> {
    let mismatch = |message: String| Mismatch::QueryMismatch {
        parameter: name.to_string(),
        expected: format!("{:?}", expected),
        actual: format!("{:?}", actual),
        mismatch: message,
    };

    match rules.resolve_key(name) {
        Some(rule_list) => {
            let first = match expected.first() {
                Some(first) => first,
                None => return vec![],
            };
            let mut mismatches = Vec::new();
            if rule_list.has_type_matcher() {
                let expected_list = Value::from(expected.to_vec());
                let actual_list = Value::from(actual.to_vec());
                if let Err(errors) = match_rule_list(rule_list, &expected_list, &actual_list, false) {
                    mismatches.push(mismatch(errors.join(", ")));
                }
                return mismatches;
            }
            for (index, value) in actual.iter().enumerate() {
                let expected_value = expected.get(index).unwrap_or(first);
                if let Err(errors) = match_rule_list(rule_list, expected_value.as_str(), value.as_str(), false) {
                    mismatches.push(mismatch(format!(
                        "Expected query parameter '{}' value '{}' to match: {}",
                        name,
                        value,
                        errors.join(", ")
                    )));
                }
            }
            mismatches
        }
        None if expected == actual => vec![],
        None => vec![mismatch(format!(
            "Expected query parameter '{}' with value(s) {:?} but received {:?}",
            name, expected, actual
        ))],
    }
}

/// Every expected metadata key must be present and match.
pub fn match_metadata(
    expected: &BTreeMap<String, Value>,
    actual: &BTreeMap<String, Value>,
    rules: &MatchingRuleCategory,
) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    for (key, expected_value) in expected {
        let actual_value = match actual.get(key) {
            Some(value) => value,
            None => {
                mismatches.push(Mismatch::MetadataMismatch {
                    key: key.clone(),
                    expected: json_to_string(expected_value),
                    actual: String::new(),
                    mismatch: format!("Expected message metadata '{}' but was missing", key),
                });
                continue;
            }
        };

        let result = if let Some(rule_list) = rules.resolve_key(key) {
            match_rule_list(rule_list, expected_value, actual_value, false).map_err(|errors| errors.join(", "))
        } else if key.eq_ignore_ascii_case("contentType") || key.eq_ignore_ascii_case("content-type") {
            if content_types_match(&json_to_string(expected_value), &json_to_string(actual_value)) {
                Ok(())
            } else {
                Err(format!(
                    "Expected message metadata '{}' to be '{}' but was '{}'",
                    key,
                    json_to_string(expected_value),
                    json_to_string(actual_value)
                ))
            }
        } else if expected_value == actual_value {
            Ok(())
        } else {
            Err(format!(
                "Expected message metadata '{}' to be '{}' but was '{}'",
                key,
                json_to_string(expected_value),
                json_to_string(actual_value)
            ))
        };

        if let Err(mismatch) = result {
            mismatches.push(Mismatch::MetadataMismatch {
                key: key.clone(),
                expected: json_to_string(expected_value),
                actual: json_to_string(actual_value),
                mismatch,
            });
        }
    }
    mismatches
}
