//! Example values with embedded matcher definitions.
//!
//! Consumers describe bodies and header values as JSON where any value may be
//! replaced by `{"pact:matcher:type": "regex", "regex": "\\d+", "value": "12"}`.
//! Processing such a document yields the plain example plus the matching rules
//! and generators it declares.

use super::{
    generators::{Generator, Generators},
    matchingrules::{ArrayContainsVariant, Category, MatchingRule, MatchingRuleCategory, RuleLogic},
    path_exp::DocPath,
};
use crate::error::Error;
use serde_json::{Map, Value};
use tracing::trace;

const MATCHER_TYPE: &str = "pact:matcher:type";
const GENERATOR_TYPE: &str = "pact:generator:type";

/// Matching rules and generators collected while processing a document.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub rules: MatchingRuleCategory,
    pub generators: Generators,
    category: Category,
}

impl Extracted {
    pub fn new(category: Category) -> Self {
        Extracted {
            rules: MatchingRuleCategory::empty(category),
            generators: Generators::default(),
            category,
        }
    }
}

/// Whether a JSON value carries a matcher or generator definition.
pub fn is_matcher_definition(value: &Value) -> bool {
    value
        .as_object()
        .map(|map| map.contains_key(MATCHER_TYPE) || map.contains_key(GENERATOR_TYPE))
        .unwrap_or(false)
}

/// Processes a body document, returning the example with all matcher
/// definitions replaced by their example values.
pub fn process_json(value: &Value, extracted: &mut Extracted) -> Result<Value, Error> {
    process_value(value, &DocPath::root(), false, extracted)
}

/// Processes a single value such as a header, query parameter or path. The
/// value may be a plain string or a serialised matcher definition.
pub fn process_string(
    value: &str,
    path: &DocPath,
    extracted: &mut Extracted,
) -> Result<String, Error> {
    let parsed = match serde_json::from_str::<Value>(value) {
        Ok(parsed) if is_matcher_definition(&parsed) => parsed,
        _ => return Ok(value.to_string()),
    };

    let example = process_value(&parsed, path, false, extracted)?;
    Ok(match example {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn process_value(
    value: &Value,
    path: &DocPath,
    in_type_matcher: bool,
    extracted: &mut Extracted,
) -> Result<Value, Error> {
    match value {
        Value::Object(map) if map.contains_key(MATCHER_TYPE) || map.contains_key(GENERATOR_TYPE) => {
            process_matcher(map, path, extracted)
        }
        Value::Object(map) => {
            let mut example = Map::new();
            for (key, child) in map {
                let child_path = if in_type_matcher && key == "*" {
                    path.join("*")
                } else {
                    path.join(key.as_str())
                };
                example.insert(key.clone(), process_value(child, &child_path, false, extracted)?);
            }
            Ok(Value::Object(example))
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let child_path = if in_type_matcher {
                    path.join_star_index()
                } else {
                    path.join_index(index)
                };
                process_value(item, &child_path, false, extracted)
            })
            .collect::<Result<Vec<_>, Error>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn process_matcher(
    map: &Map<String, Value>,
    path: &DocPath,
    extracted: &mut Extracted,
) -> Result<Value, Error> {
    if map.contains_key(GENERATOR_TYPE) {
        let generator = Generator::from_json(&Value::Object(map.clone()))?;
        extracted
            .generators
            .add_generator(extracted.category, path.clone(), generator);
    }

    let example = map.get("value").cloned().unwrap_or(Value::Null);
    let rule = match map.get(MATCHER_TYPE) {
        Some(_) => matcher_rule(map, path)?,
        None => return process_value(&example, path, false, extracted),
    };
    trace!("Matcher {} at {}", rule, path);

    match &rule {
        MatchingRule::ArrayContains(_) => {
            let variants = map
                .get("variants")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let mut examples = Vec::with_capacity(variants.len());
            let mut processed = Vec::with_capacity(variants.len());
            for (index, variant) in variants.iter().enumerate() {
                let mut nested = Extracted::new(Category::Body);
                examples.push(process_json(variant, &mut nested)?);
                processed.push(ArrayContainsVariant {
                    index,
                    rules: nested.rules,
                });
            }
            extracted.rules.add_rule(
                path.clone(),
                MatchingRule::ArrayContains(processed),
                RuleLogic::And,
            );
            Ok(Value::Array(examples))
        }
        MatchingRule::EachKey(_) | MatchingRule::EachValue(_) => {
            extracted.rules.add_rule(path.clone(), rule.clone(), RuleLogic::And);
            process_value(&example, path, false, extracted)
        }
        rule if rule.is_type_matcher() => {
            extracted.rules.add_rule(path.clone(), rule.clone(), RuleLogic::And);
            let example = process_value(&example, path, true, extracted)?;
            Ok(pad_to_minimum(example, rule))
        }
        rule => {
            extracted.rules.add_rule(path.clone(), rule.clone(), RuleLogic::And);
            process_value(&example, path, false, extracted)
        }
    }
}

/// Converts a definition using `pact:matcher:type` into a matching rule.
fn matcher_rule(map: &Map<String, Value>, path: &DocPath) -> Result<MatchingRule, Error> {
    let mut definition = Map::new();
    for (key, value) in map {
        match key.as_str() {
            MATCHER_TYPE => {
                definition.insert("match".into(), value.clone());
            }
            "rules" => {
                let nested = match value {
                    Value::Array(rules) => rules.iter().map(nested_definition).collect(),
                    other => vec![nested_definition(other)],
                };
                definition.insert("rules".into(), Value::Array(nested));
            }
            "value" if is_content_type_match(map) => {
                definition.insert("value".into(), value.clone());
            }
            "value" | "variants" => {}
            _ => {
                definition.insert(key.clone(), value.clone());
            }
        }
    }

    if is_content_type_match(map) && !definition.contains_key("value") {
        return Err(Error::parse(format!(
            "contentType matcher at {} has no content type value",
            path
        )));
    }
    if matches!(definition.get("match").and_then(|m| m.as_str()), Some("arrayContains")) {
        definition.insert("variants".into(), Value::Array(Vec::new()));
    }
    // include keeps the substring in `value`
    if matches!(definition.get("match").and_then(|m| m.as_str()), Some("include")) {
        if let Some(value) = map.get("value") {
            definition.insert("value".into(), value.clone());
        }
    }

    MatchingRule::from_json(&Value::Object(definition))
}

fn is_content_type_match(map: &Map<String, Value>) -> bool {
    matches!(
        map.get(MATCHER_TYPE).and_then(|m| m.as_str()),
        Some("contentType") | Some("content-type")
    )
}

fn nested_definition(value: &Value) -> Value {
    match value.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    if key == MATCHER_TYPE {
                        ("match".to_string(), value.clone())
                    } else {
                        (key.clone(), value.clone())
                    }
                })
                .collect(),
        ),
        None => value.clone(),
    }
}

/// A `min` type matcher needs at least that many examples in the document.
fn pad_to_minimum(example: Value, rule: &MatchingRule) -> Value {
    let min = match rule {
        MatchingRule::MinType(min) | MatchingRule::MinMaxType(min, _) => *min,
        _ => return example,
    };
    match example {
        Value::Array(mut items) if !items.is_empty() && items.len() < min => {
            let first = items[0].clone();
            while items.len() < min {
                items.push(first.clone());
            }
            Value::Array(items)
        }
        other => other,
    }
}
