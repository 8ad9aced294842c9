use crate::error::Error;
use serde_json::Value;
use std::{fmt::Display, str::FromStr};

/// One step of a path expression like `$.items[*].name`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PathToken {
    Root,
    Field(String),
    Index(usize),
    Star,
    StarIndex,
}

/// A parsed path expression used to key matching rules and generators.
///
/// Expressions starting with `$` are JSON-path like. Anything else is taken as
/// a single field name, which is how header, query and metadata keys are
/// stored.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct DocPath {
    tokens: Vec<PathToken>,
}

impl DocPath {
    pub fn root() -> Self {
        DocPath {
            tokens: vec![PathToken::Root],
        }
    }

    pub fn empty() -> Self {
        DocPath { tokens: Vec::new() }
    }

    pub fn new<S: AsRef<str>>(expression: S) -> Result<Self, Error> {
        expression.as_ref().parse()
    }

    /// A single-field path, used for header names and query parameters.
    pub fn field<S: Into<String>>(name: S) -> Self {
        DocPath {
            tokens: vec![PathToken::Field(name.into())],
        }
    }

    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.tokens == [PathToken::Root]
    }

    pub fn join<S: Into<String>>(&self, field: S) -> Self {
        let mut tokens = self.tokens.clone();
        let field = field.into();
        if field == "*" {
            tokens.push(PathToken::Star);
        } else {
            tokens.push(PathToken::Field(field));
        }
        DocPath { tokens }
    }

    pub fn join_index(&self, index: usize) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(PathToken::Index(index));
        DocPath { tokens }
    }

    pub fn join_star_index(&self) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(PathToken::StarIndex);
        DocPath { tokens }
    }

    /// Drops the first field after the root, turning `$.body.a` into `$.a`.
    pub fn strip_prefix_field(&self, field: &str) -> Option<DocPath> {
        match self.tokens.as_slice() {
            [PathToken::Root, PathToken::Field(name), rest @ ..] if name.eq_ignore_ascii_case(field) => {
                let mut tokens = vec![PathToken::Root];
                tokens.extend(rest.iter().cloned());
                Some(DocPath { tokens })
            }
            _ => None,
        }
    }

    /// The first field name after the root, if any.
    pub fn first_field(&self) -> Option<&str> {
        self.tokens.iter().find_map(|token| match token {
            PathToken::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn last_field(&self) -> Option<&str> {
        match self.tokens.last() {
            Some(PathToken::Field(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// How well this expression matches a concrete path. Zero means no match,
    /// wildcards score lower than exact segments.
    pub fn path_weight(&self, path: &[&str]) -> usize {
        if self.tokens.len() > path.len() || self.tokens.is_empty() {
            return 0;
        }

        self.tokens
            .iter()
            .zip(path.iter())
            .fold(1, |weight, (token, segment)| {
                weight
                    * match token {
                        PathToken::Root => usize::from(*segment == "$") * 2,
                        PathToken::Field(name) => usize::from(name == segment) * 2,
                        PathToken::Index(index) => {
                            usize::from(segment.parse::<usize>().ok() == Some(*index)) * 2
                        }
                        PathToken::StarIndex => usize::from(segment.parse::<usize>().is_ok()),
                        PathToken::Star => 1,
                    }
            })
    }

    pub fn matches_path(&self, path: &[&str]) -> bool {
        self.path_weight(path) > 0
    }

    pub fn matches_path_exactly(&self, path: &[&str]) -> bool {
        self.tokens.len() == path.len() && self.matches_path(path)
    }

    /// Visits every value in `document` addressed by this expression.
    pub fn apply_mut<F: FnMut(&mut Value)>(&self, document: &mut Value, f: &mut F) {
        let tokens = match self.tokens.first() {
            Some(PathToken::Root) => &self.tokens[1..],
            _ => &self.tokens[..],
        };
        Self::apply_tokens(tokens, document, f);
    }

    fn apply_tokens<F: FnMut(&mut Value)>(tokens: &[PathToken], value: &mut Value, f: &mut F) {
        let (token, rest) = match tokens.split_first() {
            Some(split) => split,
            None => {
                f(value);
                return;
            }
        };

        match (token, value) {
            (PathToken::Field(name), Value::Object(map)) => {
                if let Some(child) = map.get_mut(name) {
                    Self::apply_tokens(rest, child, f);
                }
            }
            (PathToken::Index(index), Value::Array(items)) => {
                if let Some(child) = items.get_mut(*index) {
                    Self::apply_tokens(rest, child, f);
                }
            }
            (PathToken::StarIndex, Value::Array(items)) | (PathToken::Star, Value::Array(items)) => {
                for child in items.iter_mut() {
                    Self::apply_tokens(rest, child, f);
                }
            }
            (PathToken::Star, Value::Object(map)) => {
                for child in map.values_mut() {
                    Self::apply_tokens(rest, child, f);
                }
            }
            (PathToken::Root, value) => Self::apply_tokens(rest, value, f),
            _ => {}
        }
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '@' || c == '#')
}

impl FromStr for DocPath {
    type Err = Error;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(DocPath::empty());
        }
        if !expression.starts_with('$') {
            return Ok(DocPath::field(expression));
        }

        let chars: Vec<char> = expression.chars().collect();
        let mut tokens = vec![PathToken::Root];
        let mut i = 1;
        let invalid = |message: &str, at: usize| {
            Error::parse(format!(
                "Invalid path expression '{}' at index {}: {}",
                expression, at, message
            ))
        };

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    i += 1;
                    let start = i;
                    while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                        i += 1;
                    }
                    let name: String = chars[start..i].iter().collect();
                    if name.is_empty() {
                        return Err(invalid("expected a field name", start));
                    }
                    if name == "*" {
                        tokens.push(PathToken::Star);
                    } else {
                        tokens.push(PathToken::Field(name));
                    }
                }
                '[' => {
                    i += 1;
                    if i >= chars.len() {
                        return Err(invalid("unterminated '['", i));
                    }
                    if chars[i] == '\'' || chars[i] == '"' {
                        let quote = chars[i];
                        i += 1;
                        let start = i;
                        while i < chars.len() && chars[i] != quote {
                            i += 1;
                        }
                        if i >= chars.len() {
                            return Err(invalid("unterminated string", start));
                        }
                        let name: String = chars[start..i].iter().collect();
                        tokens.push(PathToken::Field(name));
                        i += 1;
                    } else if chars[i] == '*' {
                        tokens.push(PathToken::StarIndex);
                        i += 1;
                    } else {
                        let start = i;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                        let digits: String = chars[start..i].iter().collect();
                        let index = digits
                            .parse::<usize>()
                            .map_err(|_| invalid("expected an index, '*' or a quoted name", start))?;
                        tokens.push(PathToken::Index(index));
                    }
                    if i >= chars.len() || chars[i] != ']' {
                        return Err(invalid("expected ']'", i));
                    }
                    i += 1;
                }
                _ => return Err(invalid("expected '.' or '['", i)),
            }
        }

        Ok(DocPath { tokens })
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let [PathToken::Field(name)] = self.tokens.as_slice() {
            return write!(f, "{}", name);
        }

        for token in &self.tokens {
            match token {
                PathToken::Root => write!(f, "$")?,
                PathToken::Field(name) if is_identifier(name) => write!(f, ".{}", name)?,
                PathToken::Field(name) => write!(f, "['{}']", name)?,
                PathToken::Index(index) => write!(f, "[{}]", index)?,
                PathToken::Star => write!(f, ".*")?,
                PathToken::StarIndex => write!(f, "[*]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_and_prints_expressions() {
        for expression in &["$", "$.a.b", "$.items[*].id", "$.a[0]['x y']", "$.*", "Content-Type"] {
            let path = DocPath::new(expression).unwrap();
            assert_eq!(&path.to_string(), expression);
        }
        assert_eq!(DocPath::new("$['a']").unwrap().to_string(), "$.a");
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(DocPath::new("$.").is_err());
        assert!(DocPath::new("$[abc]").is_err());
        assert!(DocPath::new("$['unterminated").is_err());
        assert!(DocPath::new("$a").is_err());
    }

    #[test]
    fn exact_segments_weigh_more_than_wildcards() {
        let path = ["$", "items", "0", "id"];
        let exact = DocPath::new("$.items[0].id").unwrap();
        let wildcard = DocPath::new("$.items[*].id").unwrap();
        let star = DocPath::new("$.*[*].id").unwrap();
        assert!(exact.path_weight(&path) > wildcard.path_weight(&path));
        assert!(wildcard.path_weight(&path) > star.path_weight(&path));
        assert_eq!(DocPath::new("$.other").unwrap().path_weight(&path), 0);
        assert!(DocPath::new("$.items").unwrap().matches_path(&path));
        assert!(!DocPath::new("$.items").unwrap().matches_path_exactly(&path));
    }

    #[test]
    fn visits_wildcard_positions() {
        let mut document = json!({"items": [{"id": 1}, {"id": 2}]});
        let mut seen = Vec::new();
        DocPath::new("$.items[*].id")
            .unwrap()
            .apply_mut(&mut document, &mut |value| seen.push(value.clone()));
        assert_eq!(seen, vec![json!(1), json!(2)]);
    }
}
