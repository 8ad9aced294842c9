//! Applying single matching rules to values.

use super::datetime::validate_datetime;
use crate::models::{
    matchingrules::{MatchingRule, RuleList, RuleLogic},
    ContentType,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref SEMVER_REGEX: Regex = Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$"
    )
    .unwrap();
}

/// Matching of an actual value against an expected one under a rule.
///
/// `cascaded` is set when the rule was declared on an ancestor of the value;
/// length bounds of the type rules only apply where they were declared.
pub trait Matches<A> {
    fn matches_with(&self, actual: A, rule: &MatchingRule, cascaded: bool) -> Result<(), String>;
}

/// Applies one rule.
pub fn match_values<E, A>(rule: &MatchingRule, expected: &E, actual: A, cascaded: bool) -> Result<(), String>
where
    E: Matches<A> + ?Sized,
{
    expected.matches_with(actual, rule, cascaded)
}

/// Applies a rule list, combining the results with its AND/OR logic.
pub fn match_rule_list<E, A>(rules: &RuleList, expected: &E, actual: A, cascaded: bool) -> Result<(), Vec<String>>
where
    E: Matches<A> + ?Sized,
    A: Copy,
{
    let results: Vec<Result<(), String>> = rules
        .rules
        .iter()
        .map(|rule| expected.matches_with(actual, rule, cascaded))
        .collect();

    match rules.logic {
        RuleLogic::And => {
            let errors: Vec<String> = results.into_iter().filter_map(|r| r.err()).collect();
            if errors.is_empty() {
                Ok(())
            } else {
                Err(errors)
            }
        }
        RuleLogic::Or => {
            if results.iter().any(|r| r.is_ok()) || results.is_empty() {
                Ok(())
            } else {
                Err(results.into_iter().filter_map(|r| r.err()).collect())
            }
        }
    }
}

pub fn is_semver(value: &str) -> bool {
    SEMVER_REGEX.is_match(value)
}

fn type_conflict(rule: &MatchingRule, actual: impl std::fmt::Display, type_name: &str) -> String {
    format!(
        "Matching rule '{}' can not be applied to '{}' ({})",
        rule, actual, type_name
    )
}

fn check_regex(rule: &MatchingRule, actual: &str) -> Result<(), String> {
    if let MatchingRule::Regex(pattern) = rule {
        match pattern.is_match(actual) {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!(
                "Expected '{}' to match '{}'",
                actual,
                pattern.as_str()
            )),
            Err(err) => Err(err.to_string()),
        }
    } else {
        Ok(())
    }
}

fn content_type_of(bytes: &[u8]) -> Option<ContentType> {
    ContentType::detect(bytes)
}

fn check_content_type(expected: &str, bytes: &[u8]) -> Result<(), String> {
    let expected_type: ContentType = expected
        .parse()
        .map_err(|_| format!("'{}' is not a valid content type", expected))?;
    match content_type_of(bytes) {
        Some(actual) if actual.is_equivalent_to(&expected_type) => Ok(()),
        // text detection can not tell plain text from other text types
        Some(actual) if actual.is_text() && expected_type.is_text() && !expected_type.is_json() => Ok(()),
        Some(actual) => Err(format!(
            "Expected data to have a content type of '{}' but was '{}'",
            expected, actual
        )),
        None => Err(format!(
            "Expected data to have a content type of '{}' but it could not be determined",
            expected
        )),
    }
}

impl Matches<&str> for str {
    fn matches_with(&self, actual: &str, rule: &MatchingRule, _cascaded: bool) -> Result<(), String> {
        match rule {
            MatchingRule::Equality => {
                if self == actual {
                    Ok(())
                } else {
                    Err(format!("Expected '{}' to be equal to '{}'", actual, self))
                }
            }
            MatchingRule::Regex(_) => check_regex(rule, actual),
            MatchingRule::Type
            | MatchingRule::MinType(_)
            | MatchingRule::MaxType(_)
            | MatchingRule::MinMaxType(_, _)
            | MatchingRule::Values
            | MatchingRule::EachValue(_) => Ok(()),
            MatchingRule::Timestamp(format) | MatchingRule::Time(format) | MatchingRule::Date(format) => {
                validate_datetime(actual, format)
            }
            MatchingRule::Include(value) => {
                if actual.contains(value.as_str()) {
                    Ok(())
                } else {
                    Err(format!("Expected '{}' to include '{}'", actual, value))
                }
            }
            MatchingRule::Number => actual
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| format!("Expected '{}' to be a number", actual)),
            MatchingRule::Integer => actual
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("Expected '{}' to be an integer", actual)),
            MatchingRule::Decimal => {
                if actual.contains('.') && actual.parse::<f64>().is_ok() {
                    Ok(())
                } else {
                    Err(format!("Expected '{}' to be a decimal number", actual))
                }
            }
            MatchingRule::Boolean => {
                if actual == "true" || actual == "false" {
                    Ok(())
                } else {
                    Err(format!("Expected '{}' to be a boolean", actual))
                }
            }
            MatchingRule::ContentType(content_type) => check_content_type(content_type, actual.as_bytes()),
            MatchingRule::StatusCode(status) => match actual.parse::<u16>() {
                Ok(code) if status.matches(code) => Ok(()),
                _ => Err(format!("Expected status code '{}' to match {:?}", actual, status)),
            },
            MatchingRule::NotEmpty => {
                if actual.is_empty() {
                    Err("Expected a non-empty string".to_string())
                } else {
                    Ok(())
                }
            }
            MatchingRule::Semver => {
                if is_semver(actual) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not a valid semantic version", actual))
                }
            }
            MatchingRule::EachKey(_) | MatchingRule::ArrayContains(_) | MatchingRule::Null => {
                Err(type_conflict(rule, actual, "String"))
            }
        }
    }
}

impl Matches<&str> for String {
    fn matches_with(&self, actual: &str, rule: &MatchingRule, cascaded: bool) -> Result<(), String> {
        self.as_str().matches_with(actual, rule, cascaded)
    }
}

impl Matches<u64> for u64 {
    fn matches_with(&self, actual: u64, rule: &MatchingRule, _cascaded: bool) -> Result<(), String> {
        match rule {
            MatchingRule::Equality => {
                if *self == actual {
                    Ok(())
                } else {
                    Err(format!("Expected {} to be equal to {}", actual, self))
                }
            }
            MatchingRule::Regex(_) => check_regex(rule, &actual.to_string()),
            MatchingRule::Type
            | MatchingRule::MinType(_)
            | MatchingRule::MaxType(_)
            | MatchingRule::MinMaxType(_, _)
            | MatchingRule::Number
            | MatchingRule::Integer
            | MatchingRule::NotEmpty
            | MatchingRule::Values => Ok(()),
            MatchingRule::Include(value) => {
                if actual.to_string().contains(value.as_str()) {
                    Ok(())
                } else {
                    Err(format!("Expected {} to include '{}'", actual, value))
                }
            }
            MatchingRule::StatusCode(status) => {
                if u16::try_from(actual).map(|code| status.matches(code)).unwrap_or(false) {
                    Ok(())
                } else {
                    Err(format!("Expected status code {} to match {:?}", actual, status))
                }
            }
            _ => Err(type_conflict(rule, actual, "unsigned integer")),
        }
    }
}

impl Matches<i64> for i64 {
    fn matches_with(&self, actual: i64, rule: &MatchingRule, cascaded: bool) -> Result<(), String> {
        match rule {
            MatchingRule::Equality => {
                if *self == actual {
                    Ok(())
                } else {
                    Err(format!("Expected {} to be equal to {}", actual, self))
                }
            }
            MatchingRule::StatusCode(_) if actual < 0 => Err(type_conflict(rule, actual, "negative integer")),
            _ if actual >= 0 && *self >= 0 => (*self as u64).matches_with(actual as u64, rule, cascaded),
            MatchingRule::Regex(_) => check_regex(rule, &actual.to_string()),
            MatchingRule::Type
            | MatchingRule::MinType(_)
            | MatchingRule::MaxType(_)
            | MatchingRule::MinMaxType(_, _)
            | MatchingRule::Number
            | MatchingRule::Integer
            | MatchingRule::NotEmpty
            | MatchingRule::Values => Ok(()),
            MatchingRule::Include(value) => {
                if actual.to_string().contains(value.as_str()) {
                    Ok(())
                } else {
                    Err(format!("Expected {} to include '{}'", actual, value))
                }
            }
            _ => Err(type_conflict(rule, actual, "integer")),
        }
    }
}

impl Matches<f64> for f64 {
    fn matches_with(&self, actual: f64, rule: &MatchingRule, _cascaded: bool) -> Result<(), String> {
        match rule {
            MatchingRule::Equality => {
                if *self == actual {
                    Ok(())
                } else {
                    Err(format!("Expected {} to be equal to {}", actual, self))
                }
            }
            MatchingRule::Regex(_) => check_regex(rule, &actual.to_string()),
            MatchingRule::Type
            | MatchingRule::MinType(_)
            | MatchingRule::MaxType(_)
            | MatchingRule::MinMaxType(_, _)
            | MatchingRule::Number
            | MatchingRule::Decimal
            | MatchingRule::NotEmpty
            | MatchingRule::Values => Ok(()),
            MatchingRule::Integer => {
                if actual.fract() == 0.0 {
                    Ok(())
                } else {
                    Err(format!("Expected {} to be an integer", actual))
                }
            }
            MatchingRule::Include(value) => {
                if actual.to_string().contains(value.as_str()) {
                    Ok(())
                } else {
                    Err(format!("Expected {} to include '{}'", actual, value))
                }
            }
            _ => Err(type_conflict(rule, actual, "decimal")),
        }
    }
}

impl Matches<bool> for bool {
    fn matches_with(&self, actual: bool, rule: &MatchingRule, _cascaded: bool) -> Result<(), String> {
        match rule {
            MatchingRule::Equality => {
                if *self == actual {
                    Ok(())
                } else {
                    Err(format!("Expected {} to be equal to {}", actual, self))
                }
            }
            MatchingRule::Regex(_) => check_regex(rule, &actual.to_string()),
            MatchingRule::Type
            | MatchingRule::MinType(_)
            | MatchingRule::MaxType(_)
            | MatchingRule::MinMaxType(_, _)
            | MatchingRule::Boolean
            | MatchingRule::NotEmpty
            | MatchingRule::Values => Ok(()),
            _ => Err(type_conflict(rule, actual, "boolean")),
        }
    }
}

impl Matches<&[u8]> for [u8] {
    fn matches_with(&self, actual: &[u8], rule: &MatchingRule, _cascaded: bool) -> Result<(), String> {
        match rule {
            MatchingRule::Equality => {
                if self == actual {
                    Ok(())
                } else {
                    Err(format!(
                        "Expected binary contents of {} bytes to be equal to the expected {} bytes",
                        actual.len(),
                        self.len()
                    ))
                }
            }
            MatchingRule::Regex(_) => check_regex(rule, &String::from_utf8_lossy(actual)),
            MatchingRule::ContentType(content_type) => check_content_type(content_type, actual),
            MatchingRule::Include(value) => {
                if String::from_utf8_lossy(actual).contains(value.as_str()) {
                    Ok(())
                } else {
                    Err(format!("Expected binary contents to include '{}'", value))
                }
            }
            MatchingRule::NotEmpty => {
                if actual.is_empty() {
                    Err("Expected non-empty binary contents".to_string())
                } else {
                    Ok(())
                }
            }
            MatchingRule::Type
            | MatchingRule::MinType(_)
            | MatchingRule::MaxType(_)
            | MatchingRule::MinMaxType(_, _)
            | MatchingRule::Values => Ok(()),
            _ => Err(type_conflict(rule, format!("{} bytes", actual.len()), "binary")),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

fn same_type(expected: &Value, actual: &Value) -> bool {
    std::mem::discriminant(expected) == std::mem::discriminant(actual)
}

/// Scalars as strings, containers as their JSON text.
pub(crate) fn json_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn collection_len(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn check_type(expected: &Value, actual: &Value) -> Result<(), String> {
    if same_type(expected, actual) {
        Ok(())
    } else {
        Err(format!(
            "Expected {} ({}) to be the same type as {} ({})",
            actual,
            json_type_name(actual),
            expected,
            json_type_name(expected)
        ))
    }
}

fn check_min(actual: &Value, min: usize, cascaded: bool) -> Result<(), String> {
    match collection_len(actual) {
        Some(len) if !cascaded && len < min => Err(format!(
            "Expected {} ({}) to have minimum size of {}",
            actual,
            json_type_name(actual),
            min
        )),
        _ => Ok(()),
    }
}

fn check_max(actual: &Value, max: usize, cascaded: bool) -> Result<(), String> {
    match collection_len(actual) {
        Some(len) if !cascaded && len > max => Err(format!(
            "Expected {} ({}) to have maximum size of {}",
            actual,
            json_type_name(actual),
            max
        )),
        _ => Ok(()),
    }
}

impl Matches<&Value> for Value {
    fn matches_with(&self, actual: &Value, rule: &MatchingRule, cascaded: bool) -> Result<(), String> {
        match rule {
            MatchingRule::Equality => {
                if self == actual {
                    Ok(())
                } else {
                    Err(format!("Expected {} to be equal to {}", actual, self))
                }
            }
            MatchingRule::Regex(_) => match actual {
                Value::Array(_) | Value::Object(_) => Err(type_conflict(rule, actual, json_type_name(actual))),
                _ => check_regex(rule, &json_to_string(actual)),
            },
            MatchingRule::Type => check_type(self, actual),
            MatchingRule::MinType(min) => {
                check_type(self, actual)?;
                check_min(actual, *min, cascaded)
            }
            MatchingRule::MaxType(max) => {
                check_type(self, actual)?;
                check_max(actual, *max, cascaded)
            }
            MatchingRule::MinMaxType(min, max) => {
                check_type(self, actual)?;
                check_min(actual, *min, cascaded)?;
                check_max(actual, *max, cascaded)
            }
            MatchingRule::Timestamp(format) | MatchingRule::Time(format) | MatchingRule::Date(format) => {
                match actual {
                    Value::String(s) => validate_datetime(s, format),
                    _ => Err(type_conflict(rule, actual, json_type_name(actual))),
                }
            }
            MatchingRule::Include(value) => {
                if json_to_string(actual).contains(value.as_str()) {
                    Ok(())
                } else {
                    Err(format!("Expected {} to include '{}'", actual, value))
                }
            }
            MatchingRule::Number => match actual {
                Value::Number(_) => Ok(()),
                _ => Err(format!("Expected {} ({}) to be a number", actual, json_type_name(actual))),
            },
            MatchingRule::Integer => match actual {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
                _ => Err(format!("Expected {} ({}) to be an integer", actual, json_type_name(actual))),
            },
            MatchingRule::Decimal => match actual {
                Value::Number(n) if n.is_f64() => Ok(()),
                _ => Err(format!("Expected {} ({}) to be a decimal number", actual, json_type_name(actual))),
            },
            MatchingRule::Boolean => match actual {
                Value::Bool(_) => Ok(()),
                Value::String(s) if s == "true" || s == "false" => Ok(()),
                _ => Err(format!("Expected {} ({}) to be a boolean", actual, json_type_name(actual))),
            },
            MatchingRule::Null => match actual {
                Value::Null => Ok(()),
                _ => Err(format!("Expected {} ({}) to be a null value", actual, json_type_name(actual))),
            },
            MatchingRule::ContentType(content_type) => match actual {
                Value::String(s) => check_content_type(content_type, s.as_bytes()),
                _ => Err(type_conflict(rule, actual, json_type_name(actual))),
            },
            MatchingRule::ArrayContains(_) => match actual {
                Value::Array(_) => Ok(()),
                _ => Err(type_conflict(rule, actual, json_type_name(actual))),
            },
            MatchingRule::Values | MatchingRule::EachValue(_) => match actual {
                Value::Array(_) | Value::Object(_) => Ok(()),
                _ => Err(type_conflict(rule, actual, json_type_name(actual))),
            },
            MatchingRule::EachKey(rules) => match actual {
                Value::Object(map) => {
                    let errors: Vec<String> = map
                        .keys()
                        .flat_map(|key| {
                            rules
                                .iter()
                                .filter_map(move |nested| key.as_str().matches_with(key.as_str(), nested, false).err())
                        })
                        .collect();
                    if errors.is_empty() {
                        Ok(())
                    } else {
                        Err(errors.join(", "))
                    }
                }
                _ => Err(type_conflict(rule, actual, json_type_name(actual))),
            },
            MatchingRule::StatusCode(status) => match actual.as_u64() {
                Some(code) if u16::try_from(code).map(|c| status.matches(c)).unwrap_or(false) => Ok(()),
                _ => Err(format!("Expected status code {} to match {:?}", actual, status)),
            },
            MatchingRule::NotEmpty => match actual {
                Value::Null => Err("Expected a non-empty value but was null".to_string()),
                Value::String(s) if s.is_empty() => Err("Expected a non-empty string".to_string()),
                Value::Array(items) if items.is_empty() => Err("Expected a non-empty list".to_string()),
                Value::Object(map) if map.is_empty() => Err("Expected a non-empty object".to_string()),
                _ => Ok(()),
            },
            MatchingRule::Semver => match actual {
                Value::String(s) if is_semver(s) => Ok(()),
                _ => Err(format!("{} is not a valid semantic version", actual)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matchingrules::HttpStatus;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn regex_matches_whole_strings() {
        let rule = MatchingRule::regex("\\d+\\.\\d+\\.\\d+");
        assert!(match_values(&rule, "1.0.0", "1.2.3", false).is_ok());
        assert!(match_values(&rule, "1.0.0", "abc", false).is_err());
        assert!(match_values(&rule, &json!("1.0.0"), &json!("1.2.3"), false).is_ok());
    }

    #[test]
    fn type_rules_compare_type_classes_and_sizes() {
        assert!(match_values(&MatchingRule::Type, &json!("a"), &json!("b"), false).is_ok());
        assert!(match_values(&MatchingRule::Type, &json!("a"), &json!(1), false).is_err());
        assert!(match_values(&MatchingRule::MinType(2), &json!([1]), &json!([1]), false).is_err());
        assert!(match_values(&MatchingRule::MinType(2), &json!([1]), &json!([1]), true).is_ok());
        assert!(match_values(&MatchingRule::MaxType(1), &json!([1]), &json!([1, 2]), false).is_err());
        assert!(match_values(&MatchingRule::MinMaxType(1, 3), &json!([1]), &json!([1, 2]), false).is_ok());
    }

    #[test]
    fn numeric_rules() {
        assert!(match_values(&MatchingRule::Integer, &json!(1), &json!(100), false).is_ok());
        assert!(match_values(&MatchingRule::Integer, &json!(1), &json!(1.5), false).is_err());
        assert!(match_values(&MatchingRule::Decimal, &json!(1.5), &json!(2.25), false).is_ok());
        assert!(match_values(&MatchingRule::Number, &json!(1), &json!("1"), false).is_err());
        assert!(match_values(&MatchingRule::Integer, "1", "42", false).is_ok());
        assert!(match_values(&MatchingRule::Equality, &1u64, 2u64, false).is_err());
        assert!(match_values(&MatchingRule::Integer, &-1i64, -5i64, false).is_ok());
    }

    #[test]
    fn dates_include_and_semver() {
        let date = MatchingRule::Date("yyyy-MM-dd".into());
        assert!(match_values(&date, &json!("2000-01-01"), &json!("2023-10-05"), false).is_ok());
        assert!(match_values(&date, &json!("2000-01-01"), &json!("yesterday"), false).is_err());
        assert!(match_values(&MatchingRule::Include("ll".into()), "hello", "well", false).is_ok());
        assert!(match_values(&MatchingRule::Semver, "1.0.0", "1.2.3-beta.1", false).is_ok());
        assert!(match_values(&MatchingRule::Semver, "1.0.0", "1.2", false).is_err());
    }

    #[test]
    fn status_codes_and_not_empty() {
        let rule = MatchingRule::StatusCode(HttpStatus::Success);
        assert!(match_values(&rule, &200u64, 204u64, false).is_ok());
        assert!(match_values(&rule, &200u64, 404u64, false).is_err());
        assert!(match_values(&MatchingRule::NotEmpty, &json!([1]), &json!([]), false).is_err());
        assert!(match_values(&MatchingRule::NotEmpty, &json!("x"), &json!("y"), false).is_ok());
    }

    #[test]
    fn rules_that_do_not_apply_report_type_conflicts() {
        let err = match_values(&MatchingRule::Null, "a", "b", false).unwrap_err();
        assert!(err.contains("can not be applied"));
        assert!(match_values(&MatchingRule::Timestamp("yyyy".into()), &json!("2000"), &json!(2000), false).is_err());
    }

    #[test]
    fn each_key_checks_every_key() {
        let rule = MatchingRule::EachKey(vec![MatchingRule::regex("[a-z]+")]);
        assert!(match_values(&rule, &json!({"a": 1}), &json!({"abc": 1, "de": 2}), false).is_ok());
        assert!(match_values(&rule, &json!({"a": 1}), &json!({"abc": 1, "D1": 2}), false).is_err());
    }

    #[test]
    fn or_logic_needs_one_success() {
        let rules = RuleList {
            rules: vec![MatchingRule::regex("a+"), MatchingRule::regex("b+")],
            logic: RuleLogic::Or,
        };
        assert!(match_rule_list(&rules, "a", "bbb", false).is_ok());
        assert!(match_rule_list(&rules, "a", "c", false).is_err());
    }

    proptest! {
        #[test]
        fn string_rules_are_reflexive(value in "[a-z]{1,12}") {
            let rules = vec![
                MatchingRule::Equality,
                MatchingRule::regex("[a-z]+"),
                MatchingRule::Type,
                MatchingRule::MinType(0),
                MatchingRule::Include(value[..1].to_string()),
                MatchingRule::NotEmpty,
                MatchingRule::Values,
            ];
            for rule in &rules {
                prop_assert!(match_values(rule, value.as_str(), value.as_str(), false).is_ok());
                let json = json!(value);
                prop_assert!(match_values(rule, &json, &json, false).is_ok() || matches!(rule, MatchingRule::Values));
            }
        }

        #[test]
        fn integer_rules_are_reflexive(value in any::<i64>()) {
            for rule in &[MatchingRule::Equality, MatchingRule::Type, MatchingRule::Number, MatchingRule::Integer] {
                prop_assert!(match_values(rule, &value, value, false).is_ok());
                let json = json!(value);
                prop_assert!(match_values(rule, &json, &json, false).is_ok());
            }
        }

        #[test]
        fn array_type_rules_are_reflexive(items in proptest::collection::vec(any::<u8>(), 1..10)) {
            let json = json!(items);
            let len = items.len();
            for rule in &[
                MatchingRule::Type,
                MatchingRule::MinType(len),
                MatchingRule::MaxType(len),
                MatchingRule::MinMaxType(1, len),
                MatchingRule::NotEmpty,
                MatchingRule::Values,
            ] {
                prop_assert!(match_values(rule, &json, &json, false).is_ok());
            }
        }
    }
}
