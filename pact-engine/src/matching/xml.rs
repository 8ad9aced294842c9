//! XML bodies. Documents are read into a small element tree and compared
//! element by element. Rule paths address elements by name and position,
//! attributes as `['@name']` and text content as `['#text']`.

use super::{match_rule_list, MatchingContext, Mismatch, ValuePath};
use crate::models::matchingrules::{MatchingRule, RuleList};
use quick_xml::{events::BytesStart, events::Event, Reader};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    fn from_start(start: &BytesStart) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = BTreeMap::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| format!("Invalid attribute on <{}>: {}", name, err))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let value = attribute
                .unescape_value()
                .map_err(|err| format!("Invalid attribute value on <{}>: {}", name, err))?;
            attributes.insert(key, value.into_owned());
        }
        Ok(XmlElement {
            name,
            attributes,
            ..XmlElement::default()
        })
    }

    fn children_named(&self, name: &str) -> Vec<&XmlElement> {
        self.children.iter().filter(|child| child.name == name).collect()
    }

    fn child_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for child in &self.children {
            if !names.contains(&child.name.as_str()) {
                names.push(&child.name);
            }
        }
        names
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err("XML document has more than one root element".to_string()),
    }
}

/// Reads a document into its root element.
pub fn parse_xml(text: &str) -> Result<XmlElement, String> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(XmlElement::from_start(&start)?),
            Ok(Event::Empty(start)) => {
                let element = XmlElement::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "Unbalanced closing tag in XML document".to_string())?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    let unescaped = text.unescape().map_err(|err| format!("Invalid XML text: {}", err))?;
                    current.text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(format!(
                    "Failed to parse XML at position {}: {}",
                    reader.buffer_position(),
                    err
                ))
            }
        }
    }

    if !stack.is_empty() {
        return Err("XML document ended before all elements were closed".to_string());
    }
    root.ok_or_else(|| "XML document has no root element".to_string())
}

/// Compares two XML documents.
pub fn match_xml(expected: &str, actual: &str, context: &MatchingContext) -> Vec<Mismatch> {
    let root_path = ValuePath::root();
    let expected = match parse_xml(expected) {
        Ok(root) => root,
        Err(err) => return vec![mismatch(&root_path, expected, actual, format!("Failed to parse the expected body: {}", err))],
    };
    let actual_root = match parse_xml(actual) {
        Ok(root) => root,
        Err(err) => return vec![mismatch(&root_path, &expected.name, actual, format!("Failed to parse the actual body: {}", err))],
    };

    let mut mismatches = Vec::new();
    let path = root_path.field(&expected.name);
    if expected.name != actual_root.name {
        mismatches.push(mismatch(
            &path,
            &expected.name,
            &actual_root.name,
            format!("Expected element {} but received {}", expected.name, actual_root.name),
        ));
        return mismatches;
    }
    compare_element(&path, &expected, &actual_root, context, &mut mismatches);
    mismatches
}

fn mismatch(path: &ValuePath, expected: &str, actual: &str, message: String) -> Mismatch {
    Mismatch::BodyMismatch {
        path: path.to_string(),
        expected: Some(Value::String(expected.to_string())),
        actual: Some(Value::String(actual.to_string())),
        mismatch: message,
    }
}

/// Applies the rules in effect at `path` to a string value, falling back to
/// equality. Rules cascaded from an ancestor accept any string.
fn compare_text(
    path: &ValuePath,
    expected: &str,
    actual: &str,
    context: &MatchingContext,
    describe: &str,
    mismatches: &mut Vec<Mismatch>,
) {
    let result = match context.rules.resolve(&path.segments()) {
        Some(resolved) if !resolved.cascaded => {
            match_rule_list(resolved.rules, expected, actual, false).map_err(|errors| errors.join(", "))
        }
        Some(_) => Ok(()),
        None if expected == actual => Ok(()),
        None => Err(format!(
            "Expected {} '{}' but received '{}'",
            describe, expected, actual
        )),
    };
    if let Err(message) = result {
        mismatches.push(mismatch(path, expected, actual, message));
    }
}

fn compare_element(
    path: &ValuePath,
    expected: &XmlElement,
    actual: &XmlElement,
    context: &MatchingContext,
    mismatches: &mut Vec<Mismatch>,
) {
    compare_attributes(path, expected, actual, context, mismatches);

    if !expected.text.is_empty() || !actual.text.is_empty() {
        compare_text(
            &path.field("#text"),
            &expected.text,
            &actual.text,
            context,
            "text",
            mismatches,
        );
    }

    compare_children(path, expected, actual, context, mismatches);
}

fn compare_attributes(
    path: &ValuePath,
    expected: &XmlElement,
    actual: &XmlElement,
    context: &MatchingContext,
    mismatches: &mut Vec<Mismatch>,
) {
    for (name, expected_value) in &expected.attributes {
        let attribute_path = path.field(&format!("@{}", name));
        match actual.attributes.get(name) {
            Some(actual_value) => compare_text(
                &attribute_path,
                expected_value,
                actual_value,
                context,
                &format!("attribute '{}' to have value", name),
                mismatches,
            ),
            None => mismatches.push(mismatch(
                &attribute_path,
                expected_value,
                "",
                format!("Expected attribute '{}' on <{}> but was missing", name, expected.name),
            )),
        }
    }

    if !context.allow_unexpected_keys {
        for (name, actual_value) in &actual.attributes {
            if !expected.attributes.contains_key(name) {
                mismatches.push(mismatch(
                    &path.field(&format!("@{}", name)),
                    "",
                    actual_value,
                    format!("Did not expect attribute '{}' on <{}>", name, actual.name),
                ));
            }
        }
    }
}

/// Length bounds of the type rules declared on a group of same-named children.
fn size_bounds(rules: &RuleList) -> (Option<usize>, Option<usize>) {
    rules.rules.iter().fold((None, None), |(min, max), rule| match rule {
        MatchingRule::MinType(m) => (Some(*m), max),
        MatchingRule::MaxType(m) => (min, Some(*m)),
        MatchingRule::MinMaxType(lower, upper) => (Some(*lower), Some(*upper)),
        _ => (min, max),
    })
}

fn compare_children(
    path: &ValuePath,
    expected: &XmlElement,
    actual: &XmlElement,
    context: &MatchingContext,
    mismatches: &mut Vec<Mismatch>,
) {
    for name in expected.child_names() {
        let group_path = path.field(name);
        let expected_children = expected.children_named(name);
        let actual_children = actual.children_named(name);

        let relaxed = match context.rules.resolve(&group_path.segments()) {
            Some(resolved) if !resolved.cascaded && resolved.rules.has_type_matcher() => {
                let (min, max) = size_bounds(resolved.rules);
                if let Some(min) = min.filter(|min| actual_children.len() < *min) {
                    mismatches.push(mismatch(
                        &group_path,
                        name,
                        name,
                        format!(
                            "Expected at least {} <{}> element(s) but received {}",
                            min,
                            name,
                            actual_children.len()
                        ),
                    ));
                }
                if let Some(max) = max.filter(|max| actual_children.len() > *max) {
                    mismatches.push(mismatch(
                        &group_path,
                        name,
                        name,
                        format!(
                            "Expected at most {} <{}> element(s) but received {}",
                            max,
                            name,
                            actual_children.len()
                        ),
                    ));
                }
                true
            }
            Some(resolved) => resolved.cascaded,
            None => false,
        };

        if !relaxed && expected_children.len() != actual_children.len() {
            mismatches.push(mismatch(
                &group_path,
                name,
                name,
                format!(
                    "Expected {} <{}> element(s) but received {}",
                    expected_children.len(),
                    name,
                    actual_children.len()
                ),
            ));
        }

        if let Some(first) = expected_children.first() {
            for (index, actual_child) in actual_children.iter().enumerate() {
                let expected_child = expected_children.get(index).unwrap_or(first);
                compare_element(&group_path.index(index), expected_child, actual_child, context, mismatches);
            }
        }
    }

    if !context.allow_unexpected_keys {
        for name in actual.child_names() {
            if expected.children_named(name).is_empty() {
                mismatches.push(mismatch(
                    &path.field(name),
                    "",
                    name,
                    format!("Did not expect element <{}> inside <{}>", name, actual.name),
                ));
            }
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

    #[test]
    fn parses_nested_documents() {
        let root = parse_xml(r#"<?xml version="1.0"?><a x="1"><b>one</b><b/><c><![CDATA[<raw>]]></c></a>"#).unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attributes.get("x").map(String::as_str), Some("1"));
        assert_eq!(root.children.len(), 3);
        assert_eq!(root.children[0].text, "one");
        assert_eq!(root.children[2].text, "<raw>");
        assert!(parse_xml("<a><b></a>").is_err());
        assert!(parse_xml("").is_err());
    }

    #[test]
    fn identical_documents_match() {
        let rules = MatchingRuleCategory::empty(Category::Body);
        let doc = "<animals><alligator name=\"Mary\"/></animals>";
        assert!(match_xml(doc, doc, &MatchingContext::new(&rules, false)).is_empty());
    }

    #[test]
    fn reports_attribute_and_text_differences() {
        let rules = MatchingRuleCategory::empty(Category::Body);
        let context = MatchingContext::new(&rules, true);
        let mismatches = match_xml(
            "<animals><alligator name=\"Mary\">green</alligator></animals>",
            "<animals><alligator name=\"Tom\">grey</alligator></animals>",
            &context,
        );
        assert_eq!(mismatches.len(), 2);
        assert!(matches!(&mismatches[0], Mismatch::BodyMismatch { path, .. } if path == "$.animals.alligator[0].@name"));
    }

    #[test]
    fn type_rules_relax_element_counts() {
        let mut rules = MatchingRuleCategory::empty(Category::Body);
        rules.add_rule(
            DocPath::new("$.animals.alligator").unwrap(),
            MatchingRule::MinType(1),
            RuleLogic::And,
        );
        let context = MatchingContext::new(&rules, false);
        let expected = "<animals><alligator name=\"Mary\"/></animals>";
        let actual = "<animals><alligator name=\"Tom\"/><alligator name=\"Sue\"/></animals>";
        assert!(match_xml(expected, actual, &context).is_empty());
        assert_eq!(match_xml(expected, "<animals/>", &context).len(), 1);
    }

    #[test]
    fn unexpected_elements_depend_on_context() {
        let rules = MatchingRuleCategory::empty(Category::Body);
        let expected = "<a><b>1</b></a>";
        let actual = "<a><b>1</b><c/></a>";
        assert!(match_xml(expected, actual, &MatchingContext::new(&rules, true)).is_empty());
        assert_eq!(match_xml(expected, actual, &MatchingContext::new(&rules, false)).len(), 1);
    }
}
