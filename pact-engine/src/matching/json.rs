//! Structural comparison of JSON documents under matching rules.

use super::{
    rules::{json_type_name, match_rule_list, Matches},
    MatchingContext, Mismatch, ValuePath,
};
use crate::models::matchingrules::{ArrayContainsVariant, MatchingRule, RuleList};
use serde_json::{Map, Value};
use tracing::trace;

/// Compares two documents, returning every difference found.
pub fn compare_json(expected: &Value, actual: &Value, context: &MatchingContext) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    compare_value(&ValuePath::root(), expected, actual, context, &mut mismatches);
    mismatches
}

fn body_mismatch(path: &ValuePath, expected: Option<&Value>, actual: Option<&Value>, mismatch: String) -> Mismatch {
    Mismatch::BodyMismatch {
        path: path.to_string(),
        expected: expected.cloned(),
        actual: actual.cloned(),
        mismatch,
    }
}

fn compare_value(
    path: &ValuePath,
    expected: &Value,
    actual: &Value,
    context: &MatchingContext,
    mismatches: &mut Vec<Mismatch>,
) {
    let segments = path.segments();
    match context.rules.resolve(&segments) {
        Some(resolved) if !resolved.cascaded => {
            trace!("Applying {:?} at {}", resolved.rules.rules, path);
            if let Err(errors) = match_rule_list(resolved.rules, expected, actual, false) {
                mismatches.push(body_mismatch(path, Some(expected), Some(actual), errors.join(", ")));
                return;
            }
            if resolved.rules.has_collection_matcher() {
                compare_relaxed(path, expected, actual, Some(resolved.rules), context, mismatches);
            }
        }
        Some(_) => {
            // rules inherited from an ancestor only constrain the type
            if let Err(error) = expected.matches_with(actual, &MatchingRule::Type, true) {
                mismatches.push(body_mismatch(path, Some(expected), Some(actual), error));
                return;
            }
            compare_relaxed(path, expected, actual, None, context, mismatches);
        }
        None => compare_strict(path, expected, actual, context, mismatches),
    }
}

fn array_contains_variants(rules: Option<&RuleList>) -> Option<&Vec<ArrayContainsVariant>> {
    rules?.rules.iter().find_map(|rule| match rule {
        MatchingRule::ArrayContains(variants) => Some(variants),
        _ => None,
    })
}

fn each_value_rules(rules: Option<&RuleList>) -> Option<&Vec<MatchingRule>> {
    rules?.rules.iter().find_map(|rule| match rule {
        MatchingRule::EachValue(nested) => Some(nested),
        _ => None,
    })
}

/// Whether the keys of an object are free, with only the values compared.
fn ignores_keys(rules: Option<&RuleList>) -> bool {
    rules
        .map(|rules| {
            rules.rules.iter().any(|rule| {
                matches!(
                    rule,
                    MatchingRule::Values | MatchingRule::EachKey(_) | MatchingRule::EachValue(_)
                )
            })
        })
        .unwrap_or(false)
}

fn apply_nested(
    path: &ValuePath,
    nested: &[MatchingRule],
    expected: &Value,
    actual: &Value,
    mismatches: &mut Vec<Mismatch>,
) {
    for rule in nested {
        if let Err(error) = expected.matches_with(actual, rule, false) {
            mismatches.push(body_mismatch(path, Some(expected), Some(actual), error));
        }
    }
}

/// Descends into containers governed by a type, values or collection rule.
fn compare_relaxed(
    path: &ValuePath,
    expected: &Value,
    actual: &Value,
    rules: Option<&RuleList>,
    context: &MatchingContext,
    mismatches: &mut Vec<Mismatch>,
) {
    match (expected, actual) {
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if let Some(variants) = array_contains_variants(rules) {
                match_array_contains(path, variants, expected_items, actual_items, mismatches);
                return;
            }
            let first = match expected_items.first() {
                Some(first) => first,
                None => return,
            };
            for (index, item) in actual_items.iter().enumerate() {
                let expected_item = expected_items.get(index).unwrap_or(first);
                let child = path.index(index);
                if let Some(nested) = each_value_rules(rules) {
                    apply_nested(&child, nested, expected_item, item, mismatches);
                }
                compare_value(&child, expected_item, item, context, mismatches);
            }
        }
        (Value::Object(expected_map), Value::Object(actual_map)) => {
            if ignores_keys(rules) {
                let first = match expected_map.values().next() {
                    Some(first) => first,
                    None => return,
                };
                for (key, item) in actual_map {
                    let expected_item = expected_map.get(key).unwrap_or(first);
                    let child = path.field(key);
                    if let Some(nested) = each_value_rules(rules) {
                        apply_nested(&child, nested, expected_item, item, mismatches);
                    }
                    compare_value(&child, expected_item, item, context, mismatches);
                }
            } else {
                compare_keys(path, expected_map, actual_map, context, true, mismatches);
            }
        }
        _ => {}
    }
}

fn compare_keys(
    path: &ValuePath,
    expected: &Map<String, Value>,
    actual: &Map<String, Value>,
    context: &MatchingContext,
    allow_unexpected_keys: bool,
    mismatches: &mut Vec<Mismatch>,
) {
    for (key, expected_item) in expected {
        let child = path.field(key);
        match actual.get(key) {
            Some(actual_item) => compare_value(&child, expected_item, actual_item, context, mismatches),
            None => mismatches.push(body_mismatch(
                &child,
                Some(expected_item),
                None,
                format!("Expected key '{}' but was missing", key),
            )),
        }
    }

    if !allow_unexpected_keys {
        for (key, actual_item) in actual {
            if !expected.contains_key(key) {
                mismatches.push(body_mismatch(
                    &path.field(key),
                    None,
                    Some(actual_item),
                    format!("Did not expect the key '{}' to be in the actual object", key),
                ));
            }
        }
    }
}

fn compare_strict(
    path: &ValuePath,
    expected: &Value,
    actual: &Value,
    context: &MatchingContext,
    mismatches: &mut Vec<Mismatch>,
) {
    match (expected, actual) {
        (Value::Object(expected_map), Value::Object(actual_map)) => compare_keys(
            path,
            expected_map,
            actual_map,
            context,
            context.allow_unexpected_keys,
            mismatches,
        ),
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if expected_items.len() != actual_items.len() {
                mismatches.push(body_mismatch(
                    path,
                    Some(expected),
                    Some(actual),
                    format!(
                        "Expected a List with {} elements but received {} elements",
                        expected_items.len(),
                        actual_items.len()
                    ),
                ));
            }
            for (index, (expected_item, actual_item)) in expected_items.iter().zip(actual_items).enumerate() {
                compare_value(&path.index(index), expected_item, actual_item, context, mismatches);
            }
        }
        (Value::Number(e), Value::Number(a)) if e.as_f64() == a.as_f64() => {}
        (expected, actual) if expected == actual => {}
        (expected, actual) if json_type_name(expected) == json_type_name(actual) => {
            mismatches.push(body_mismatch(
                path,
                Some(expected),
                Some(actual),
                format!(
                    "Expected {} ({}) but received {} ({})",
                    describe(expected),
                    json_type_name(expected),
                    describe(actual),
                    json_type_name(actual)
                ),
            ));
        }
        (expected, actual) => mismatches.push(body_mismatch(
            path,
            Some(expected),
            Some(actual),
            format!(
                "Type mismatch: Expected {} ({}) but received {} ({})",
                describe(expected),
                json_type_name(expected),
                describe(actual),
                json_type_name(actual)
            ),
        )),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

fn match_array_contains(
    path: &ValuePath,
    variants: &[ArrayContainsVariant],
    expected_items: &[Value],
    actual_items: &[Value],
    mismatches: &mut Vec<Mismatch>,
) {
    for variant in variants {
        let expected_item = match expected_items.get(variant.index) {
            Some(item) => item,
            None => continue,
        };
        let variant_context = MatchingContext::new(&variant.rules, true);
        let found = actual_items
            .iter()
            .any(|item| compare_json(expected_item, item, &variant_context).is_empty());
        if !found {
            mismatches.push(body_mismatch(
                path,
                Some(expected_item),
                Some(&Value::Array(actual_items.to_vec())),
                format!(
                    "Variant at index {} ({}) was not found in the actual list",
                    variant.index, expected_item
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        matchingrules::{Category, MatchingRuleCategory, RuleLogic},
        DocPath,
    };
    use proptest::prelude::*;
    use serde_json::json;

    fn rules(entries: Vec<(&str, MatchingRule)>) -> MatchingRuleCategory {
        let mut category = MatchingRuleCategory::empty(Category::Body);
        for (path, rule) in entries {
            category.add_rule(DocPath::new(path).unwrap(), rule, RuleLogic::And);
        }
        category
    }

    #[test]
    fn reports_value_differences_with_paths() {
        let category = MatchingRuleCategory::empty(Category::Body);
        let context = MatchingContext::new(&category, true);
        let mismatches = compare_json(&json!({"name": "Mary"}), &json!({"name": "Tom"}), &context);
        assert_eq!(mismatches.len(), 1);
        match &mismatches[0] {
            Mismatch::BodyMismatch { path, expected, actual, .. } => {
                assert_eq!(path, "$.name");
                assert_eq!(expected, &Some(json!("Mary")));
                assert_eq!(actual, &Some(json!("Tom")));
            }
            other => panic!("unexpected mismatch {:?}", other),
        }
    }

    #[test]
    fn unexpected_keys_depend_on_context() {
        let category = MatchingRuleCategory::empty(Category::Body);
        let expected = json!({"a": 1});
        let actual = json!({"a": 1, "b": 2});
        assert!(compare_json(&expected, &actual, &MatchingContext::new(&category, true)).is_empty());
        assert_eq!(compare_json(&expected, &actual, &MatchingContext::new(&category, false)).len(), 1);
        assert_eq!(
            compare_json(&json!({"a": 1, "c": 3}), &json!({"a": 1}), &MatchingContext::new(&category, true)).len(),
            1
        );
    }

    #[test]
    fn arrays_must_have_equal_length_without_rules() {
        let category = MatchingRuleCategory::empty(Category::Body);
        let context = MatchingContext::new(&category, true);
        assert_eq!(compare_json(&json!([1, 2]), &json!([1, 2, 3]), &context).len(), 1);
        assert!(compare_json(&json!([1.0, 2]), &json!([1, 2]), &context).is_empty());
    }

    #[test]
    fn type_rules_cascade_to_children() {
        let category = rules(vec![("$.items", MatchingRule::MinType(1))]);
        let context = MatchingContext::new(&category, true);
        let expected = json!({"items": [{"id": 1, "name": "a"}]});
        let actual = json!({"items": [{"id": 7, "name": "x"}, {"id": 8, "name": "y", "extra": true}]});
        assert!(compare_json(&expected, &actual, &context).is_empty());

        let wrong_type = json!({"items": [{"id": "7", "name": "x"}]});
        let mismatches = compare_json(&expected, &wrong_type, &context);
        assert_eq!(mismatches.len(), 1);
        assert!(matches!(&mismatches[0], Mismatch::BodyMismatch { path, .. } if path == "$.items[0].id"));

        let empty = json!({"items": []});
        assert_eq!(compare_json(&expected, &empty, &context).len(), 1);
    }

    #[test]
    fn specific_child_rules_win_over_cascaded_rules() {
        let category = rules(vec![
            ("$.items", MatchingRule::Type),
            ("$.items[*].code", MatchingRule::regex("[A-Z]{3}")),
        ]);
        let context = MatchingContext::new(&category, true);
        let expected = json!({"items": [{"code": "ABC"}]});
        assert!(compare_json(&expected, &json!({"items": [{"code": "XYZ"}]}), &context).is_empty());
        assert_eq!(compare_json(&expected, &json!({"items": [{"code": "xyz"}]}), &context).len(), 1);
    }

    #[test]
    fn regex_rule_on_a_field() {
        let category = rules(vec![("$.version", MatchingRule::regex("\\d+\\.\\d+\\.\\d+"))]);
        let context = MatchingContext::new(&category, true);
        let expected = json!({"version": "1.0.0"});
        assert!(compare_json(&expected, &json!({"version": "1.2.3"}), &context).is_empty());
        assert_eq!(compare_json(&expected, &json!({"version": "abc"}), &context).len(), 1);
    }

    #[test]
    fn values_and_each_value_rules_ignore_keys() {
        let category = rules(vec![
            ("$.scores", MatchingRule::Values),
            ("$.names", MatchingRule::EachValue(vec![MatchingRule::regex("[a-z]+")])),
        ]);
        let context = MatchingContext::new(&category, false);
        let expected = json!({"scores": {"a": 1}, "names": {"x": "abc"}});
        let actual = json!({"scores": {"b": 2, "c": 3}, "names": {"y": "def", "z": "gh"}});
        assert!(compare_json(&expected, &actual, &context).is_empty());

        let bad = json!({"scores": {"b": "two"}, "names": {"y": "DEF"}});
        assert_eq!(compare_json(&expected, &bad, &context).len(), 2);
    }

    #[test]
    fn array_contains_is_order_independent() {
        let mut variant_rules = MatchingRuleCategory::empty(Category::Body);
        variant_rules.add_rule(DocPath::new("$.id").unwrap(), MatchingRule::Integer, RuleLogic::And);
        let category = rules(vec![(
            "$",
            MatchingRule::ArrayContains(vec![
                ArrayContainsVariant { index: 0, rules: variant_rules },
                ArrayContainsVariant { index: 1, rules: MatchingRuleCategory::empty(Category::Body) },
            ]),
        )]);
        let context = MatchingContext::new(&category, false);
        let expected = json!([{"id": 1, "kind": "a"}, {"kind": "b"}]);
        let actual = json!([{"kind": "b"}, {"other": true}, {"id": 99, "kind": "a"}]);
        assert!(compare_json(&expected, &actual, &context).is_empty());
        assert_eq!(compare_json(&expected, &json!([{"kind": "b"}]), &context).len(), 1);
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    fn json_value() -> impl Strategy<Value = Value> {
        json_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn documents_match_themselves(value in json_value()) {
            let category = MatchingRuleCategory::empty(Category::Body);
            prop_assert!(compare_json(&value, &value, &MatchingContext::new(&category, false)).is_empty());
            let typed = rules(vec![("$", MatchingRule::Type)]);
            prop_assert!(compare_json(&value, &value, &MatchingContext::new(&typed, false)).is_empty());
        }

        #[test]
        fn cascade_never_overrides_a_child_rule(code in "[a-z]{3}") {
            let category = rules(vec![
                ("$", MatchingRule::Type),
                ("$.child.code", MatchingRule::regex("[A-Z]{3}")),
            ]);
            let context = MatchingContext::new(&category, true);
            let expected = json!({"child": {"code": "ABC"}});
            let actual = json!({"child": {"code": code}});
            prop_assert_eq!(compare_json(&expected, &actual, &context).len(), 1);
        }
    }
}
