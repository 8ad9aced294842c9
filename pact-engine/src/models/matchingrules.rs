use super::path_exp::DocPath;
use crate::error::Error;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    str::FromStr,
};

/// A regular expression from a matching rule, compiled on first use and
/// kept for the lifetime of the rule.
#[derive(Clone)]
pub struct RegexPattern {
    source: String,
    compiled: OnceCell<Result<Regex, String>>,
}

impl RegexPattern {
    pub fn new<S: Into<String>>(source: S) -> Self {
        RegexPattern {
            source: source.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The pattern anchored at both ends, so it has to match the whole value.
    pub fn regex(&self) -> Result<&Regex, Error> {
        self.compiled
            .get_or_init(|| {
                Regex::new(&format!("^(?:{})$", self.source)).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| Error::parse(format!("Invalid regex '{}': {}", self.source, e)))
    }

    pub fn is_match(&self, value: &str) -> Result<bool, Error> {
        Ok(self.regex()?.is_match(value))
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for RegexPattern {}

impl Hash for RegexPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl Debug for RegexPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegexPattern({:?})", self.source)
    }
}

/// Classes of HTTP status codes for the `statusCode` rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpStatus {
    Information,
    Success,
    Redirect,
    ClientError,
    ServerError,
    NonError,
    Error,
    StatusCodes(Vec<u16>),
}

impl HttpStatus {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            HttpStatus::Information => (100..200).contains(&status),
            HttpStatus::Success => (200..300).contains(&status),
            HttpStatus::Redirect => (300..400).contains(&status),
            HttpStatus::ClientError => (400..500).contains(&status),
            HttpStatus::ServerError => (500..600).contains(&status),
            HttpStatus::NonError => status < 400,
            HttpStatus::Error => status >= 400,
            HttpStatus::StatusCodes(codes) => codes.contains(&status),
        }
    }

    fn from_json(value: &Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => match s.as_str() {
                "info" | "information" => Ok(HttpStatus::Information),
                "success" => Ok(HttpStatus::Success),
                "redirect" => Ok(HttpStatus::Redirect),
                "clientError" => Ok(HttpStatus::ClientError),
                "serverError" => Ok(HttpStatus::ServerError),
                "nonError" => Ok(HttpStatus::NonError),
                "error" => Ok(HttpStatus::Error),
                other => Err(Error::parse(format!("'{}' is not a valid status class", other))),
            },
            Value::Array(codes) => Ok(HttpStatus::StatusCodes(
                codes
                    .iter()
                    .filter_map(|c| c.as_u64().map(|c| c as u16))
                    .collect(),
            )),
            _ => Err(Error::parse(format!("'{}' is not a valid status", value))),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            HttpStatus::Information => json!("information"),
            HttpStatus::Success => json!("success"),
            HttpStatus::Redirect => json!("redirect"),
            HttpStatus::ClientError => json!("clientError"),
            HttpStatus::ServerError => json!("serverError"),
            HttpStatus::NonError => json!("nonError"),
            HttpStatus::Error => json!("error"),
            HttpStatus::StatusCodes(codes) => json!(codes),
        }
    }
}

/// One variant of an `arrayContains` rule: the index of the example element
/// and the rules applying to it (keyed relative to the element).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayContainsVariant {
    pub index: usize,
    pub rules: MatchingRuleCategory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchingRule {
    Equality,
    Regex(RegexPattern),
    Type,
    MinType(usize),
    MaxType(usize),
    MinMaxType(usize, usize),
    Timestamp(String),
    Time(String),
    Date(String),
    Include(String),
    Number,
    Integer,
    Decimal,
    Boolean,
    Null,
    ContentType(String),
    ArrayContains(Vec<ArrayContainsVariant>),
    Values,
    StatusCode(HttpStatus),
    NotEmpty,
    Semver,
    EachKey(Vec<MatchingRule>),
    EachValue(Vec<MatchingRule>),
}

impl MatchingRule {
    pub fn regex<S: Into<String>>(pattern: S) -> Self {
        MatchingRule::Regex(RegexPattern::new(pattern))
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatchingRule::Equality => "equality",
            MatchingRule::Regex(_) => "regex",
            MatchingRule::Type => "type",
            MatchingRule::MinType(_) => "min-type",
            MatchingRule::MaxType(_) => "max-type",
            MatchingRule::MinMaxType(_, _) => "min-max-type",
            MatchingRule::Timestamp(_) => "timestamp",
            MatchingRule::Time(_) => "time",
            MatchingRule::Date(_) => "date",
            MatchingRule::Include(_) => "include",
            MatchingRule::Number => "number",
            MatchingRule::Integer => "integer",
            MatchingRule::Decimal => "decimal",
            MatchingRule::Boolean => "boolean",
            MatchingRule::Null => "null",
            MatchingRule::ContentType(_) => "content-type",
            MatchingRule::ArrayContains(_) => "array-contains",
            MatchingRule::Values => "values",
            MatchingRule::StatusCode(_) => "status-code",
            MatchingRule::NotEmpty => "not-empty",
            MatchingRule::Semver => "semver",
            MatchingRule::EachKey(_) => "each-key",
            MatchingRule::EachValue(_) => "each-value",
        }
    }

    /// Whether a rule declared on a container also governs its descendants.
    pub fn cascades(&self) -> bool {
        matches!(
            self,
            MatchingRule::Type
                | MatchingRule::MinType(_)
                | MatchingRule::MaxType(_)
                | MatchingRule::MinMaxType(_, _)
                | MatchingRule::Values
                | MatchingRule::EachValue(_)
                | MatchingRule::ArrayContains(_)
        )
    }

    pub fn is_type_matcher(&self) -> bool {
        matches!(
            self,
            MatchingRule::Type
                | MatchingRule::MinType(_)
                | MatchingRule::MaxType(_)
                | MatchingRule::MinMaxType(_, _)
        )
    }

    /// Rules that relax the length or key set of a collection.
    pub fn is_collection_matcher(&self) -> bool {
        self.is_type_matcher()
            || matches!(
                self,
                MatchingRule::Values
                    | MatchingRule::EachKey(_)
                    | MatchingRule::EachValue(_)
                    | MatchingRule::ArrayContains(_)
            )
    }

    /// Parses a rule definition. Accepts V2 style definitions without a
    /// `match` attribute (`{"regex": ".."}`, `{"min": 1}`) as well.
    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::parse(format!("Matching rule '{}' is not an object", value)))?;
        let get_str = |key: &str| map.get(key).and_then(|v| v.as_str()).map(String::from);
        let get_usize = |key: &str| {
            map.get(key).and_then(|v| match v {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                Value::String(s) => s.parse::<usize>().ok(),
                _ => None,
            })
        };
        let min = get_usize("min");
        let max = get_usize("max");

        let match_type = match get_str("match") {
            Some(match_type) => match_type,
            None if map.contains_key("regex") => "regex".into(),
            None if min.is_some() || max.is_some() => "type".into(),
            None if map.contains_key("timestamp") => "timestamp".into(),
            None if map.contains_key("date") => "date".into(),
            None if map.contains_key("time") => "time".into(),
            None => {
                return Err(Error::parse(format!(
                    "Matching rule '{}' has no match type",
                    value
                )))
            }
        };

        let format = |key: &str| {
            get_str("format")
                .or_else(|| get_str(key))
                .unwrap_or_else(|| match key {
                    "date" => "yyyy-MM-dd".into(),
                    "time" => "HH:mm:ss".into(),
                    _ => "yyyy-MM-dd'T'HH:mm:ss".into(),
                })
        };

        let rule = match match_type.as_str() {
            "equality" => MatchingRule::Equality,
            "regex" => MatchingRule::Regex(RegexPattern::new(get_str("regex").ok_or_else(
                || Error::parse("Regex matching rule is missing the 'regex' attribute"),
            )?)),
            "type" | "min" | "max" | "min-type" | "max-type" | "minType" | "maxType" => {
                match (min, max) {
                    (Some(min), Some(max)) => MatchingRule::MinMaxType(min, max),
                    (Some(min), None) => MatchingRule::MinType(min),
                    (None, Some(max)) => MatchingRule::MaxType(max),
                    (None, None) => MatchingRule::Type,
                }
            }
            "timestamp" | "datetime" => MatchingRule::Timestamp(format("timestamp")),
            "date" => MatchingRule::Date(format("date")),
            "time" => MatchingRule::Time(format("time")),
            "include" => MatchingRule::Include(
                get_str("value")
                    .ok_or_else(|| Error::parse("Include matching rule is missing 'value'"))?,
            ),
            "number" => MatchingRule::Number,
            "integer" => MatchingRule::Integer,
            "decimal" => MatchingRule::Decimal,
            "boolean" => MatchingRule::Boolean,
            "null" => MatchingRule::Null,
            "contentType" | "content-type" => MatchingRule::ContentType(
                get_str("value")
                    .ok_or_else(|| Error::parse("Content type matching rule is missing 'value'"))?,
            ),
            "arrayContains" | "array-contains" => {
                let variants = map
                    .get("variants")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| Error::parse("arrayContains rule is missing 'variants'"))?;
                let variants = variants
                    .iter()
                    .enumerate()
                    .map(|(position, variant)| {
                        let index = variant
                            .get("index")
                            .and_then(|i| i.as_u64())
                            .map(|i| i as usize)
                            .unwrap_or(position);
                        let rules = match variant.get("rules") {
                            Some(rules) => MatchingRuleCategory::from_json(Category::Body, rules)?,
                            None => MatchingRuleCategory::empty(Category::Body),
                        };
                        Ok(ArrayContainsVariant { index, rules })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                MatchingRule::ArrayContains(variants)
            }
            "values" => MatchingRule::Values,
            "statusCode" | "status-code" => MatchingRule::StatusCode(HttpStatus::from_json(
                map.get("status").unwrap_or(&Value::Null),
            )?),
            "notEmpty" | "not-empty" => MatchingRule::NotEmpty,
            "semver" => MatchingRule::Semver,
            "eachKey" | "each-key" => MatchingRule::EachKey(Self::nested_rules(map.get("rules"))?),
            "eachValue" | "each-value" => {
                MatchingRule::EachValue(Self::nested_rules(map.get("rules"))?)
            }
            other => {
                return Err(Error::parse(format!(
                    "'{}' is not a known matching rule type",
                    other
                )))
            }
        };

        Ok(rule)
    }

    fn nested_rules(rules: Option<&Value>) -> Result<Vec<MatchingRule>, Error> {
        match rules {
            Some(Value::Array(rules)) => rules.iter().map(MatchingRule::from_json).collect(),
            Some(rule @ Value::Object(_)) => Ok(vec![MatchingRule::from_json(rule)?]),
            _ => Ok(Vec::new()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MatchingRule::Equality => json!({"match": "equality"}),
            MatchingRule::Regex(pattern) => json!({"match": "regex", "regex": pattern.as_str()}),
            MatchingRule::Type => json!({"match": "type"}),
            MatchingRule::MinType(min) => json!({"match": "type", "min": min}),
            MatchingRule::MaxType(max) => json!({"match": "type", "max": max}),
            MatchingRule::MinMaxType(min, max) => json!({"match": "type", "min": min, "max": max}),
            MatchingRule::Timestamp(format) => json!({"match": "timestamp", "format": format}),
            MatchingRule::Time(format) => json!({"match": "time", "format": format}),
            MatchingRule::Date(format) => json!({"match": "date", "format": format}),
            MatchingRule::Include(value) => json!({"match": "include", "value": value}),
            MatchingRule::Number => json!({"match": "number"}),
            MatchingRule::Integer => json!({"match": "integer"}),
            MatchingRule::Decimal => json!({"match": "decimal"}),
            MatchingRule::Boolean => json!({"match": "boolean"}),
            MatchingRule::Null => json!({"match": "null"}),
            MatchingRule::ContentType(value) => json!({"match": "contentType", "value": value}),
            MatchingRule::ArrayContains(variants) => json!({
                "match": "arrayContains",
                "variants": variants
                    .iter()
                    .map(|variant| json!({
                        "index": variant.index,
                        "rules": variant.rules.to_v3_json(),
                    }))
                    .collect::<Vec<_>>()
            }),
            MatchingRule::Values => json!({"match": "values"}),
            MatchingRule::StatusCode(status) => json!({"match": "statusCode", "status": status.to_json()}),
            MatchingRule::NotEmpty => json!({"match": "notEmpty"}),
            MatchingRule::Semver => json!({"match": "semver"}),
            MatchingRule::EachKey(rules) => json!({
                "match": "eachKey",
                "rules": rules.iter().map(|r| r.to_json()).collect::<Vec<_>>()
            }),
            MatchingRule::EachValue(rules) => json!({
                "match": "eachValue",
                "rules": rules.iter().map(|r| r.to_json()).collect::<Vec<_>>()
            }),
        }
    }
}

impl Display for MatchingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingRule::Regex(pattern) => write!(f, "regex({})", pattern.as_str()),
            MatchingRule::MinType(min) => write!(f, "type(min {})", min),
            MatchingRule::MaxType(max) => write!(f, "type(max {})", max),
            MatchingRule::MinMaxType(min, max) => write!(f, "type(min {}, max {})", min, max),
            MatchingRule::Timestamp(format)
            | MatchingRule::Time(format)
            | MatchingRule::Date(format) => write!(f, "{}({})", self.name(), format),
            MatchingRule::Include(value) | MatchingRule::ContentType(value) => {
                write!(f, "{}({})", self.name(), value)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum RuleLogic {
    #[default]
    And,
    Or,
}

/// The rules attached to one path, combined with AND or OR.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleList {
    pub rules: Vec<MatchingRule>,
    pub logic: RuleLogic,
}

impl RuleList {
    pub fn new(rule: MatchingRule) -> Self {
        RuleList {
            rules: vec![rule],
            logic: RuleLogic::And,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn cascades(&self) -> bool {
        !self.rules.is_empty() && self.rules.iter().all(|r| r.cascades())
    }

    pub fn has_type_matcher(&self) -> bool {
        self.rules.iter().any(|r| r.is_type_matcher())
    }

    pub fn has_collection_matcher(&self) -> bool {
        self.rules.iter().any(|r| r.is_collection_matcher())
    }

    fn add_rule(&mut self, rule: MatchingRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    fn to_v3_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "matchers".into(),
            Value::Array(self.rules.iter().map(|r| r.to_json()).collect()),
        );
        if self.logic == RuleLogic::Or {
            map.insert("combine".into(), json!("OR"));
        }
        Value::Object(map)
    }

    fn from_v3_json(value: &Value) -> Result<Self, Error> {
        let logic = match value.get("combine").and_then(|c| c.as_str()) {
            Some(c) if c.eq_ignore_ascii_case("or") => RuleLogic::Or,
            _ => RuleLogic::And,
        };
        let rules = match value.get("matchers") {
            Some(Value::Array(matchers)) => matchers
                .iter()
                .map(MatchingRule::from_json)
                .collect::<Result<Vec<_>, Error>>()?,
            _ => vec![MatchingRule::from_json(value)?],
        };
        Ok(RuleList { rules, logic })
    }
}

/// Which part of a request, response or message a set of rules applies to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Category {
    Method,
    Path,
    Query,
    Header,
    Body,
    Status,
    Metadata,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::Method => "method",
            Category::Path => "path",
            Category::Query => "query",
            Category::Header => "header",
            Category::Body => "body",
            Category::Status => "status",
            Category::Metadata => "metadata",
        }
    }

    /// Categories holding a single rule list instead of a path map.
    pub fn is_single_valued(&self) -> bool {
        matches!(self, Category::Method | Category::Path | Category::Status)
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "method" => Ok(Category::Method),
            "path" => Ok(Category::Path),
            "query" => Ok(Category::Query),
            "header" | "headers" => Ok(Category::Header),
            "body" | "content" | "contents" => Ok(Category::Body),
            "status" => Ok(Category::Status),
            "metadata" => Ok(Category::Metadata),
            other => Err(Error::parse(format!("'{}' is not a matching rule category", other))),
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The rule lists of one category, keyed by path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRuleCategory {
    pub name: Category,
    pub rules: BTreeMap<DocPath, RuleList>,
}

/// A rule list selected for a concrete path. `cascaded` is set when the list
/// was declared on an ancestor of the path.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRules<'a> {
    pub path: &'a DocPath,
    pub rules: &'a RuleList,
    pub cascaded: bool,
}

impl MatchingRuleCategory {
    pub fn empty(name: Category) -> Self {
        MatchingRuleCategory {
            name,
            rules: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(|r| r.is_empty())
    }

    pub fn add_rule(&mut self, path: DocPath, rule: MatchingRule, logic: RuleLogic) {
        let list = self.rules.entry(path).or_default();
        list.logic = logic;
        list.add_rule(rule);
    }

    pub fn add_rule_list(&mut self, path: DocPath, rules: RuleList) {
        self.rules.insert(path, rules);
    }

    /// Selects the rule list governing `path`. The most specific expression
    /// wins: longer expressions first, then exact segments over wildcards. A
    /// list declared on an ancestor only applies if all its rules cascade.
    pub fn resolve(&self, path: &[&str]) -> Option<ResolvedRules<'_>> {
        self.rules
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .filter_map(|(expression, list)| {
                let weight = expression.path_weight(path);
                if weight == 0 {
                    return None;
                }
                let cascaded = expression.len() < path.len();
                if cascaded && !list.cascades() {
                    return None;
                }
                Some((expression.len(), weight, expression, list, cascaded))
            })
            .max_by_key(|(len, weight, _, _, _)| (*len, *weight))
            .map(|(_, _, path, rules, cascaded)| ResolvedRules {
                path,
                rules,
                cascaded,
            })
    }

    /// Looks up the rules of a header, query parameter or metadata key.
    pub fn resolve_key(&self, key: &str) -> Option<&RuleList> {
        let case_insensitive = self.name == Category::Header;
        self.rules
            .iter()
            .find(|(path, list)| {
                !list.is_empty()
                    && match path.last_field() {
                        Some(name) if case_insensitive => name.eq_ignore_ascii_case(key),
                        Some(name) => name == key,
                        None => false,
                    }
            })
            .map(|(_, list)| list)
    }

    /// The rules of a single-valued category (path, status, method).
    pub fn single(&self) -> Option<&RuleList> {
        self.rules
            .get(&DocPath::empty())
            .or_else(|| self.rules.get(&DocPath::root()))
            .filter(|list| !list.is_empty())
    }

    /// Whether some rule, cascaded or exact, is in effect at `path`.
    pub fn matcher_is_defined(&self, path: &[&str]) -> bool {
        self.resolve(path).is_some()
    }

    /// Whether a collection-relaxing rule applies at exactly `path` or was
    /// cascaded down to it.
    pub fn collection_matcher_defined(&self, path: &[&str]) -> bool {
        self.resolve(path)
            .map(|resolved| resolved.rules.has_collection_matcher())
            .unwrap_or(false)
    }

    pub fn to_v3_json(&self) -> Value {
        if self.name.is_single_valued() {
            return self
                .single()
                .map(|list| list.to_v3_json())
                .unwrap_or_else(|| json!({}));
        }

        Value::Object(
            self.rules
                .iter()
                .filter(|(_, list)| !list.is_empty())
                .map(|(path, list)| (path.to_string(), list.to_v3_json()))
                .collect(),
        )
    }

    pub fn from_json(name: Category, value: &Value) -> Result<Self, Error> {
        let mut category = MatchingRuleCategory::empty(name);
        let map = match value.as_object() {
            Some(map) => map,
            None => return Ok(category),
        };

        if name.is_single_valued() || map.contains_key("matchers") {
            if map.contains_key("matchers") || map.contains_key("match") {
                category.add_rule_list(DocPath::empty(), RuleList::from_v3_json(value)?);
            }
            return Ok(category);
        }

        for (key, rules) in map {
            category.add_rule_list(DocPath::new(key)?, RuleList::from_v3_json(rules)?);
        }
        Ok(category)
    }
}

/// All matching rules of a request, response or message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchingRules {
    pub categories: BTreeMap<Category, MatchingRuleCategory>,
}

impl MatchingRules {
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|c| c.is_empty())
    }

    pub fn category(&self, name: Category) -> Option<&MatchingRuleCategory> {
        self.categories.get(&name).filter(|c| !c.is_empty())
    }

    pub fn category_or_empty(&self, name: Category) -> MatchingRuleCategory {
        self.categories
            .get(&name)
            .cloned()
            .unwrap_or_else(|| MatchingRuleCategory::empty(name))
    }

    pub fn add_category(&mut self, name: Category) -> &mut MatchingRuleCategory {
        self.categories
            .entry(name)
            .or_insert_with(|| MatchingRuleCategory::empty(name))
    }

    pub fn add_rule(&mut self, name: Category, path: DocPath, rule: MatchingRule) {
        self.add_category(name).add_rule(path, rule, RuleLogic::And);
    }

    /// Merges `other` into these rules; lists from `other` replace lists at
    /// the same path.
    pub fn merge(&mut self, other: &MatchingRules) {
        for (name, category) in &other.categories {
            let target = self.add_category(*name);
            for (path, list) in &category.rules {
                target.rules.insert(path.clone(), list.clone());
            }
        }
    }

    /// V3/V4 form: `{"body": {"$.a": {"matchers": [..]}}, "path": {..}}`.
    pub fn to_v3_json(&self) -> Value {
        Value::Object(
            self.categories
                .values()
                .filter(|c| !c.is_empty())
                .map(|c| (c.name.name().to_string(), c.to_v3_json()))
                .collect(),
        )
    }

    /// V2 form: a flat map of `$.body..`, `$.headers..`, `$.query..` and
    /// `$.path` keys, one rule each.
    pub fn to_v2_json(&self) -> Value {
        let mut map = Map::new();
        for category in self.categories.values() {
            for (path, list) in &category.rules {
                let rule = match list.rules.first() {
                    Some(rule) => rule,
                    None => continue,
                };
                let key = match category.name {
                    Category::Body => {
                        let suffix = path.to_string();
                        format!("$.body{}", suffix.trim_start_matches('$'))
                    }
                    Category::Header => format!("$.headers.{}", path),
                    Category::Query => format!("$.query.{}", path),
                    Category::Path => "$.path".to_string(),
                    Category::Status => "$.status".to_string(),
                    Category::Method => "$.method".to_string(),
                    Category::Metadata => format!("$.metadata.{}", path),
                };
                let mut definition = rule.to_json();
                if let Some(obj) = definition.as_object_mut() {
                    // V2 only knows regex, type, min and max
                    if matches!(rule, MatchingRule::Regex(_) | MatchingRule::MinType(_) | MatchingRule::MaxType(_) | MatchingRule::MinMaxType(..)) {
                        obj.remove("match");
                        if !matches!(rule, MatchingRule::Regex(_)) {
                            obj.insert("match".into(), json!("type"));
                        }
                    }
                }
                map.insert(key, definition);
            }
        }
        Value::Object(map)
    }

    pub fn from_v2_json(value: &Value) -> Result<Self, Error> {
        let mut rules = MatchingRules::default();
        let map = match value.as_object() {
            Some(map) => map,
            None => return Ok(rules),
        };

        for (key, definition) in map {
            let rule = MatchingRule::from_json(definition)?;
            let path = DocPath::new(key)?;
            let (category, path) = match path.first_field() {
                Some("body") => (
                    Category::Body,
                    path.strip_prefix_field("body").unwrap_or_else(DocPath::root),
                ),
                Some("headers") | Some("header") => {
                    (Category::Header, DocPath::field(path.last_field().unwrap_or_default()))
                }
                Some("query") => (
                    Category::Query,
                    DocPath::field(path.last_field().unwrap_or_default()),
                ),
                Some("path") => (Category::Path, DocPath::empty()),
                Some("status") => (Category::Status, DocPath::empty()),
                Some("metadata") => (
                    Category::Metadata,
                    DocPath::field(path.last_field().unwrap_or_default()),
                ),
                _ => {
                    return Err(Error::parse(format!(
                        "'{}' is not a valid V2 matching rule path",
                        key
                    )))
                }
            };
            rules.add_rule(category, path, rule);
        }
        Ok(rules)
    }

    pub fn from_v3_json(value: &Value) -> Result<Self, Error> {
        let mut rules = MatchingRules::default();
        let map = match value.as_object() {
            Some(map) => map,
            None => return Ok(rules),
        };

        for (key, category) in map {
            let name: Category = key.parse()?;
            let parsed = MatchingRuleCategory::from_json(name, category)?;
            let target = rules.add_category(name);
            target.rules.extend(parsed.rules);
        }
        Ok(rules)
    }
}
