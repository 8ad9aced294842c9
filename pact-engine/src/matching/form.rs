//! URL encoded forms and multipart bodies.

use super::{match_rule_list, MatchingContext, Mismatch, ValuePath};
use crate::models::{http::parse_query_string, ContentType};
use serde_json::Value;
use std::collections::BTreeMap;

fn mismatch(path: &ValuePath, expected: Option<Value>, actual: Option<Value>, message: String) -> Mismatch {
    Mismatch::BodyMismatch {
        path: path.to_string(),
        expected,
        actual,
        mismatch: message,
    }
}

/// Compares `a=1&b=2` style bodies field by field. Rules are looked up at
/// `$.<field>`.
pub fn match_form_urlencoded(expected: &str, actual: &str, context: &MatchingContext) -> Vec<Mismatch> {
    let expected_fields = parse_query_string(expected).unwrap_or_default();
    let actual_fields = parse_query_string(actual).unwrap_or_default();
    let mut mismatches = Vec::new();

    for (name, expected_values) in &expected_fields {
        let path = ValuePath::root().field(name);
        let actual_values = match actual_fields.get(name) {
            Some(values) => values,
            None => {
                mismatches.push(mismatch(
                    &path,
                    Some(Value::from(expected_values.clone())),
                    None,
                    format!("Expected form post parameter '{}' but was missing", name),
                ));
                continue;
            }
        };

        match context.rules.resolve(&path.segments()) {
            Some(resolved) => {
                let first = match expected_values.first() {
                    Some(first) => first,
                    None => continue,
                };
                for (index, value) in actual_values.iter().enumerate() {
                    let expected_value = expected_values.get(index).unwrap_or(first);
                    if let Err(errors) =
                        match_rule_list(resolved.rules, expected_value.as_str(), value.as_str(), resolved.cascaded)
                    {
                        mismatches.push(mismatch(
                            &path.index(index),
                            Some(Value::from(expected_value.as_str())),
                            Some(Value::from(value.as_str())),
                            errors.join(", "),
                        ));
                    }
                }
            }
            None if expected_values == actual_values => {}
            None => mismatches.push(mismatch(
                &path,
                Some(Value::from(expected_values.clone())),
                Some(Value::from(actual_values.clone())),
                format!(
                    "Expected form post parameter '{}' with value(s) {:?} but received {:?}",
                    name, expected_values, actual_values
                ),
            )),
        }
    }

    if !context.allow_unexpected_keys {
        for (name, actual_values) in &actual_fields {
            if !expected_fields.contains_key(name) {
                mismatches.push(mismatch(
                    &ValuePath::root().field(name),
                    None,
                    Some(Value::from(actual_values.clone())),
                    format!("Unexpected form post parameter '{}' received", name),
                ));
            }
        }
    }

    mismatches
}

/// One section of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl MultipartPart {
    pub fn content_type(&self) -> Option<ContentType> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
            .and_then(|(_, value)| value.parse().ok())
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

fn strip_line_break(mut section: &[u8]) -> &[u8] {
    section = section.strip_prefix(b"\r\n").or_else(|| section.strip_prefix(b"\n")).unwrap_or(section);
    section.strip_suffix(b"\r\n").or_else(|| section.strip_suffix(b"\n")).unwrap_or(section)
}

fn disposition_parameter(disposition: &str, parameter: &str) -> Option<String> {
    disposition.split(';').skip(1).find_map(|item| {
        let (key, value) = item.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case(parameter) {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Splits a multipart body on its boundary.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<MultipartPart>, String> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut positions = Vec::new();
    let mut from = 0;
    while let Some(position) = find(body, &delimiter, from) {
        positions.push(position);
        from = position + delimiter.len();
    }
    if positions.len() < 2 {
        return Err(format!("Multipart body does not contain the boundary '{}'", boundary));
    }

    let mut parts = Vec::new();
    for window in positions.windows(2) {
        let section = strip_line_break(&body[window[0] + delimiter.len()..window[1]]);
        let (header_end, separator_len) = match find(section, b"\r\n\r\n", 0) {
            Some(position) => (position, 4),
            None => match find(section, b"\n\n", 0) {
                Some(position) => (position, 2),
                None => (section.len(), 0),
            },
        };

        let header_text = String::from_utf8_lossy(&section[..header_end]);
        let headers: BTreeMap<String, String> = header_text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        let disposition = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-disposition"))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| "Multipart section without a Content-Disposition header".to_string())?;
        let name = disposition_parameter(&disposition, "name")
            .ok_or_else(|| format!("Content-Disposition '{}' has no name", disposition))?;

        parts.push(MultipartPart {
            name,
            file_name: disposition_parameter(&disposition, "filename"),
            headers,
            body: section[(header_end + separator_len).min(section.len())..].to_vec(),
        });
    }
    Ok(parts)
}

/// Compares multipart bodies part by part, matched up by part name. A
/// content type rule at `$.<part>` checks the actual part's data.
pub fn match_multipart(
    expected: &[u8],
    expected_type: &ContentType,
    actual: &[u8],
    actual_type: &ContentType,
    context: &MatchingContext,
) -> Vec<Mismatch> {
    let root = ValuePath::root();
    let parse = |body: &[u8], content_type: &ContentType| {
        content_type
            .boundary()
            .ok_or_else(|| format!("Content type '{}' has no boundary", content_type))
            .and_then(|boundary| parse_multipart(body, boundary))
    };
    let expected_parts = match parse(expected, expected_type) {
        Ok(parts) => parts,
        Err(err) => return vec![mismatch(&root, None, None, format!("Failed to parse the expected body: {}", err))],
    };
    let actual_parts = match parse(actual, actual_type) {
        Ok(parts) => parts,
        Err(err) => return vec![mismatch(&root, None, None, format!("Failed to parse the actual body: {}", err))],
    };

    let mut mismatches = Vec::new();
    for expected_part in &expected_parts {
        let path = root.field(&expected_part.name);
        let actual_part = match actual_parts.iter().find(|part| part.name == expected_part.name) {
            Some(part) => part,
            None => {
                mismatches.push(mismatch(
                    &path,
                    Some(Value::from(expected_part.name.as_str())),
                    None,
                    format!("Expected a multipart part named '{}' but was missing", expected_part.name),
                ));
                continue;
            }
        };

        if let Some(resolved) = context.rules.resolve(&path.segments()) {
            if let Err(errors) =
                match_rule_list(resolved.rules, expected_part.body.as_slice(), actual_part.body.as_slice(), false)
            {
                mismatches.push(mismatch(&path, None, None, errors.join(", ")));
            }
            continue;
        }

        if let (Some(expected_ct), Some(actual_ct)) = (expected_part.content_type(), actual_part.content_type()) {
            if !expected_ct.is_equivalent_to(&actual_ct) {
                mismatches.push(mismatch(
                    &path,
                    Some(Value::from(expected_ct.to_string())),
                    Some(Value::from(actual_ct.to_string())),
                    format!(
                        "Expected part '{}' to have content type '{}' but was '{}'",
                        expected_part.name, expected_ct, actual_ct
                    ),
                ));
                continue;
            }
        }

        if expected_part.body != actual_part.body {
            mismatches.push(mismatch(
                &path,
                Some(Value::from(String::from_utf8_lossy(&expected_part.body).into_owned())),
                Some(Value::from(String::from_utf8_lossy(&actual_part.body).into_owned())),
                format!("Expected the contents of part '{}' to be equal", expected_part.name),
            ));
        }
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        matchingrules::{Category, MatchingRule, MatchingRuleCategory, RuleLogic},
        DocPath,
    };

    fn multipart(boundary: &str, name: &str, content_type: &str, data: &str) -> Vec<u8> {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{n}\"; filename=\"f\"\r\nContent-Type: {ct}\r\n\r\n{d}\r\n--{b}--\r\n",
            b = boundary,
            n = name,
            ct = content_type,
            d = data
        )
        .into_bytes()
    }

    fn multipart_type(boundary: &str) -> ContentType {
        format!("multipart/form-data; boundary={}", boundary).parse().unwrap()
    }

    #[test]
    fn form_fields_compare_by_name() {
        let rules = MatchingRuleCategory::empty(Category::Body);
        let context = MatchingContext::new(&rules, false);
        assert!(match_form_urlencoded("a=1&b=2", "b=2&a=1", &context).is_empty());
        assert_eq!(match_form_urlencoded("a=1&b=2", "a=1", &context).len(), 1);
        assert_eq!(match_form_urlencoded("a=1", "a=1&c=3", &context).len(), 1);
        assert!(match_form_urlencoded("a=1", "a=1&c=3", &MatchingContext::new(&rules, true)).is_empty());
    }

    #[test]
    fn form_fields_use_rules() {
        let mut rules = MatchingRuleCategory::empty(Category::Body);
        rules.add_rule(DocPath::new("$.id").unwrap(), MatchingRule::regex("\\d+"), RuleLogic::And);
        let context = MatchingContext::new(&rules, false);
        assert!(match_form_urlencoded("id=1", "id=42", &context).is_empty());
        assert_eq!(match_form_urlencoded("id=1", "id=x", &context).len(), 1);
    }

    #[test]
    fn parses_multipart_sections() {
        let body = multipart("XyZ", "file", "text/plain", "hello\r\nworld");
        let parts = parse_multipart(&body, "XyZ").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "file");
        assert_eq!(parts[0].file_name.as_deref(), Some("f"));
        assert_eq!(parts[0].body, b"hello\r\nworld".to_vec());
        assert!(parse_multipart(b"nothing here", "XyZ").is_err());
    }

    #[test]
    fn multipart_parts_with_different_boundaries_match() {
        let rules = MatchingRuleCategory::empty(Category::Body);
        let context = MatchingContext::new(&rules, false);
        let expected = multipart("aaa", "file", "text/plain", "same");
        let actual = multipart("bbb", "file", "text/plain", "same");
        assert!(match_multipart(&expected, &multipart_type("aaa"), &actual, &multipart_type("bbb"), &context).is_empty());

        let different = multipart("bbb", "file", "text/plain", "other");
        assert_eq!(
            match_multipart(&expected, &multipart_type("aaa"), &different, &multipart_type("bbb"), &context).len(),
            1
        );
        let renamed = multipart("bbb", "upload", "text/plain", "same");
        assert_eq!(
            match_multipart(&expected, &multipart_type("aaa"), &renamed, &multipart_type("bbb"), &context).len(),
            1
        );
    }

    #[test]
    fn content_type_rule_checks_part_data() {
        let mut rules = MatchingRuleCategory::empty(Category::Body);
        rules.add_rule(
            DocPath::new("$.file").unwrap(),
            MatchingRule::ContentType("application/json".into()),
            RuleLogic::And,
        );
        let context = MatchingContext::new(&rules, false);
        let expected = multipart("aaa", "file", "application/json", "{\"a\":1}");
        let actual = multipart("bbb", "file", "application/json", "{\"b\":[2]}");
        assert!(match_multipart(&expected, &multipart_type("aaa"), &actual, &multipart_type("bbb"), &context).is_empty());
    }
}
