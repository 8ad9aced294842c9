use super::{matchingrules::Category, path_exp::DocPath};
use crate::error::Error;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

/// Output formats of the `Uuid` generator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum UuidFormat {
    Simple,
    #[default]
    LowerCaseHyphenated,
    UpperCaseHyphenated,
    Urn,
}

impl FromStr for UuidFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(UuidFormat::Simple),
            "lower-case-hyphenated" | "lowercase" => Ok(UuidFormat::LowerCaseHyphenated),
            "upper-case-hyphenated" | "uppercase" => Ok(UuidFormat::UpperCaseHyphenated),
            "URN" | "urn" => Ok(UuidFormat::Urn),
            other => Err(Error::parse(format!("'{}' is not a valid UUID format", other))),
        }
    }
}

impl Display for UuidFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UuidFormat::Simple => write!(f, "simple"),
            UuidFormat::LowerCaseHyphenated => write!(f, "lower-case-hyphenated"),
            UuidFormat::UpperCaseHyphenated => write!(f, "upper-case-hyphenated"),
            UuidFormat::Urn => write!(f, "URN"),
        }
    }
}

/// The JSON type a provider-state value is converted to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Boolean,
    #[default]
    Raw,
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRING" => Ok(DataType::String),
            "INTEGER" => Ok(DataType::Integer),
            "DECIMAL" | "FLOAT" => Ok(DataType::Decimal),
            "BOOLEAN" => Ok(DataType::Boolean),
            "RAW" => Ok(DataType::Raw),
            other => Err(Error::parse(format!("'{}' is not a valid data type", other))),
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::String => write!(f, "STRING"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Decimal => write!(f, "DECIMAL"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Raw => write!(f, "RAW"),
        }
    }
}

/// Describes how to produce a value at the time an interaction is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Generator {
    RandomInt(i64, i64),
    RandomDecimal(usize),
    RandomHexadecimal(usize),
    RandomString(usize),
    Regex(String),
    Uuid(UuidFormat),
    /// Format and optional expression (e.g. `+ 1 day`).
    Date(Option<String>, Option<String>),
    Time(Option<String>, Option<String>),
    DateTime(Option<String>, Option<String>),
    RandomBoolean,
    ProviderStateGenerator(String, Option<DataType>),
    /// Example URL and a regex whose first group is the path to keep.
    MockServerURL(String, String),
}

impl Generator {
    pub fn name(&self) -> &'static str {
        match self {
            Generator::RandomInt(_, _) => "RandomInt",
            Generator::RandomDecimal(_) => "RandomDecimal",
            Generator::RandomHexadecimal(_) => "RandomHexadecimal",
            Generator::RandomString(_) => "RandomString",
            Generator::Regex(_) => "Regex",
            Generator::Uuid(_) => "Uuid",
            Generator::Date(_, _) => "Date",
            Generator::Time(_, _) => "Time",
            Generator::DateTime(_, _) => "DateTime",
            Generator::RandomBoolean => "RandomBoolean",
            Generator::ProviderStateGenerator(_, _) => "ProviderState",
            Generator::MockServerURL(_, _) => "MockServerURL",
        }
    }

    /// Whether the generator produces a new random value on every use.
    pub fn is_random(&self) -> bool {
        !matches!(
            self,
            Generator::ProviderStateGenerator(_, _) | Generator::MockServerURL(_, _)
        )
    }

    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::parse(format!("Generator '{}' is not an object", value)))?;
        let generator_type = map
            .get("type")
            .or_else(|| map.get("pact:generator:type"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::parse(format!("Generator '{}' has no type", value)))?;
        let get_str = |key: &str| map.get(key).and_then(|v| v.as_str()).map(String::from);
        let get_i64 = |key: &str| map.get(key).and_then(|v| v.as_i64());
        let get_usize = |key: &str, default: usize| {
            map.get(key)
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(default)
        };

        let generator = match generator_type {
            "RandomInt" => Generator::RandomInt(
                get_i64("min").unwrap_or(0),
                get_i64("max").unwrap_or(i32::MAX as i64),
            ),
            "RandomDecimal" => Generator::RandomDecimal(get_usize("digits", 10)),
            "RandomHexadecimal" => Generator::RandomHexadecimal(get_usize("digits", 10)),
            "RandomString" => Generator::RandomString(get_usize("size", 10)),
            "Regex" => Generator::Regex(
                get_str("regex").ok_or_else(|| Error::parse("Regex generator needs 'regex'"))?,
            ),
            "Uuid" => Generator::Uuid(match get_str("format") {
                Some(format) => format.parse()?,
                None => UuidFormat::default(),
            }),
            "Date" => Generator::Date(get_str("format"), get_str("expression")),
            "Time" => Generator::Time(get_str("format"), get_str("expression")),
            "DateTime" | "Timestamp" => {
                Generator::DateTime(get_str("format"), get_str("expression"))
            }
            "RandomBoolean" => Generator::RandomBoolean,
            "ProviderState" => Generator::ProviderStateGenerator(
                get_str("expression")
                    .ok_or_else(|| Error::parse("ProviderState generator needs 'expression'"))?,
                match get_str("dataType") {
                    Some(data_type) => Some(data_type.parse()?),
                    None => None,
                },
            ),
            "MockServerURL" => Generator::MockServerURL(
                get_str("example").unwrap_or_default(),
                get_str("regex").unwrap_or_default(),
            ),
            other => {
                return Err(Error::parse(format!(
                    "'{}' is not a known generator type",
                    other
                )))
            }
        };
        Ok(generator)
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), json!(self.name()));
        let mut optional = |key: &str, value: &Option<String>| {
            if let Some(value) = value {
                map.insert(key.into(), json!(value));
            }
        };
        match self {
            Generator::Date(format, expression)
            | Generator::Time(format, expression)
            | Generator::DateTime(format, expression) => {
                optional("format", format);
                optional("expression", expression);
            }
            _ => {}
        }
        match self {
            Generator::RandomInt(min, max) => {
                map.insert("min".into(), json!(min));
                map.insert("max".into(), json!(max));
            }
            Generator::RandomDecimal(digits) | Generator::RandomHexadecimal(digits) => {
                map.insert("digits".into(), json!(digits));
            }
            Generator::RandomString(size) => {
                map.insert("size".into(), json!(size));
            }
            Generator::Regex(regex) => {
                map.insert("regex".into(), json!(regex));
            }
            Generator::Uuid(format) => {
                map.insert("format".into(), json!(format.to_string()));
            }
            Generator::ProviderStateGenerator(expression, data_type) => {
                map.insert("expression".into(), json!(expression));
                if let Some(data_type) = data_type {
                    map.insert("dataType".into(), json!(data_type.to_string()));
                }
            }
            Generator::MockServerURL(example, regex) => {
                map.insert("example".into(), json!(example));
                map.insert("regex".into(), json!(regex));
            }
            _ => {}
        }
        Value::Object(map)
    }
}

/// Generators of a request, response or message, by category and path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Generators {
    pub categories: BTreeMap<Category, BTreeMap<DocPath, Generator>>,
}

/// Alias kept for readability at call sites that deal with one category.
pub type GeneratorCategory = Category;

impl Generators {
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|c| c.is_empty())
    }

    pub fn add_generator(&mut self, category: Category, path: DocPath, generator: Generator) {
        self.categories
            .entry(category)
            .or_default()
            .insert(path, generator);
    }

    pub fn category(&self, category: Category) -> Option<&BTreeMap<DocPath, Generator>> {
        self.categories.get(&category).filter(|c| !c.is_empty())
    }

    /// The generator of a single-valued category such as path or status.
    pub fn single(&self, category: Category) -> Option<&Generator> {
        self.category(category).and_then(|generators| {
            generators
                .get(&DocPath::empty())
                .or_else(|| generators.get(&DocPath::root()))
        })
    }

    pub fn merge(&mut self, other: &Generators) {
        for (category, generators) in &other.categories {
            self.categories
                .entry(*category)
                .or_default()
                .extend(generators.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (category, generators) in &self.categories {
            if generators.is_empty() {
                continue;
            }
            if category.is_single_valued() {
                if let Some(generator) = self.single(*category) {
                    map.insert(category.name().into(), generator.to_json());
                }
            } else {
                map.insert(
                    category.name().into(),
                    Value::Object(
                        generators
                            .iter()
                            .map(|(path, generator)| (path.to_string(), generator.to_json()))
                            .collect(),
                    ),
                );
            }
        }
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> Result<Self, Error> {
        let mut generators = Generators::default();
        let map = match value.as_object() {
            Some(map) => map,
            None => return Ok(generators),
        };

        for (key, definitions) in map {
            let category: Category = key.parse()?;
            if category.is_single_valued() {
                generators.add_generator(category, DocPath::empty(), Generator::from_json(definitions)?);
                continue;
            }
            if let Some(definitions) = definitions.as_object() {
                for (path, definition) in definitions {
                    generators.add_generator(
                        category,
                        DocPath::new(path)?,
                        Generator::from_json(definition)?,
                    );
                }
            }
        }
        Ok(generators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_json_round_trip() {
        let generators = vec![
            Generator::RandomInt(1, 10),
            Generator::RandomDecimal(4),
            Generator::RandomHexadecimal(8),
            Generator::RandomString(12),
            Generator::Regex("\\d{3}".into()),
            Generator::Uuid(UuidFormat::Urn),
            Generator::Date(Some("yyyy-MM-dd".into()), None),
            Generator::DateTime(None, Some("+ 1 day".into())),
            Generator::RandomBoolean,
            Generator::ProviderStateGenerator("${id}".into(), Some(DataType::Integer)),
            Generator::MockServerURL("http://localhost:1234/a".into(), ".*(/a)$".into()),
        ];
        for generator in generators {
            assert_eq!(Generator::from_json(&generator.to_json()).unwrap(), generator);
        }
    }

    #[test]
    fn categories_round_trip() {
        let mut generators = Generators::default();
        generators.add_generator(Category::Body, DocPath::new("$.id").unwrap(), Generator::RandomInt(0, 9));
        generators.add_generator(
            Category::Path,
            DocPath::empty(),
            Generator::ProviderStateGenerator("/users/${id}".into(), None),
        );
        let json = generators.to_json();
        assert_eq!(json["path"]["type"], "ProviderState");
        assert_eq!(json["body"]["$.id"]["type"], "RandomInt");
        assert_eq!(Generators::from_json(&json).unwrap(), generators);
    }

    #[test]
    fn unknown_generators_are_rejected() {
        assert!(Generator::from_json(&json!({"type": "Bogus"})).is_err());
        assert!(Generator::from_json(&json!({"min": 1})).is_err());
    }
}
