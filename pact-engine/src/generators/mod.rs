//! Producing concrete values from generators when an interaction is used.
//!
//! Pact files keep their literal examples. Generators are applied to copies of
//! requests, responses and messages right before they are sent or compared.

pub mod date_expression;
pub mod regex_gen;

use crate::error::{Error, Result};
use crate::matching::datetime::to_chrono_format;
use crate::matching::rules::json_to_string;
use crate::models::{
    generators::{DataType, UuidFormat},
    http::{Headers, Query},
    matchingrules::Category,
    Generator, Generators, HttpRequest, HttpResponse, MessageContents, OptionalBody,
};
use chrono::Local;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

lazy_static! {
    static ref EXPRESSION: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// Which side of the contract generated values are produced for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum GeneratorTestMode {
    /// Mock server responses during consumer tests.
    #[default]
    Consumer,
    /// Requests replayed against a provider.
    Provider,
}

/// Runtime inputs of generators.
#[derive(Debug, Clone, Default)]
pub struct GeneratorContext {
    pub mode: GeneratorTestMode,
    pub mock_server_url: Option<String>,
    pub provider_state_values: BTreeMap<String, Value>,
}

impl GeneratorContext {
    pub fn consumer(mock_server_url: Option<String>) -> Self {
        GeneratorContext {
            mode: GeneratorTestMode::Consumer,
            mock_server_url,
            ..GeneratorContext::default()
        }
    }

    pub fn provider(provider_state_values: BTreeMap<String, Value>) -> Self {
        GeneratorContext {
            mode: GeneratorTestMode::Provider,
            provider_state_values,
            ..GeneratorContext::default()
        }
    }

    /// Provider-state values only exist on the provider side and the mock
    /// server URL only on the consumer side.
    pub fn applies(&self, generator: &Generator) -> bool {
        match generator {
            Generator::ProviderStateGenerator(_, _) => self.mode == GeneratorTestMode::Provider,
            Generator::MockServerURL(_, _) => self.mode == GeneratorTestMode::Consumer,
            _ => true,
        }
    }
}

fn random_digits<R: Rng>(rng: &mut R, count: usize, alphabet: &[u8]) -> String {
    (0..count)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

fn random_decimal<R: Rng>(rng: &mut R, digits: usize) -> Value {
    let digits = digits.max(2);
    let mut text = random_digits(rng, digits, b"0123456789");
    // no leading zero, and a decimal point that is neither first nor last
    if text.starts_with('0') {
        text.replace_range(0..1, &rng.gen_range(1..=9).to_string());
    }
    let point = rng.gen_range(1..digits);
    text.insert(point, '.');
    text.parse::<f64>().map(Value::from).unwrap_or_else(|_| Value::String(text))
}

fn format_datetime(format: Option<&str>, default: &str, expression: Option<&str>) -> Result<Value> {
    let base = Local::now();
    let value = match expression {
        Some(expression) => date_expression::evaluate(expression, base)?,
        None => base,
    };
    let chrono_format = to_chrono_format(format.unwrap_or(default))?;
    Ok(Value::String(value.format(&chrono_format).to_string()))
}

/// Resolves `${name}` references against provider-state values. A template
/// that is exactly one reference keeps the type of the referenced value.
pub fn parse_expression(expression: &str, values: &BTreeMap<String, Value>) -> Result<Value> {
    let lookup = |name: &str| {
        values
            .get(name.trim())
            .ok_or_else(|| Error::parse(format!("No provider state value for '{}'", name.trim())))
    };

    if let Some(captures) = EXPRESSION.captures(expression) {
        if captures.get(0).map(|m| m.as_str()) == Some(expression) {
            return lookup(&captures[1]).cloned();
        }
    }

    let mut result = String::with_capacity(expression.len());
    let mut last = 0;
    for captures in EXPRESSION.captures_iter(expression) {
        if let Some(whole) = captures.get(0) {
            result.push_str(&expression[last..whole.start()]);
            result.push_str(&json_to_string(lookup(&captures[1])?));
            last = whole.end();
        }
    }
    result.push_str(&expression[last..]);
    Ok(Value::String(result))
}

fn convert(value: Value, data_type: Option<DataType>) -> Result<Value> {
    let text = || json_to_string(&value);
    match data_type.unwrap_or_default() {
        DataType::Raw => Ok(value.clone()),
        DataType::String => Ok(Value::String(text())),
        DataType::Integer => text()
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| Error::parse(format!("'{}' is not an integer", text()))),
        DataType::Decimal => text()
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| Error::parse(format!("'{}' is not a decimal", text()))),
        DataType::Boolean => match text().trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(Error::parse(format!("'{}' is not a boolean", other))),
        },
    }
}

/// Produces a value for one generator. `example` is the literal value the
/// generator replaces.
pub fn generate(generator: &Generator, context: &GeneratorContext, example: &Value) -> Result<Value> {
    let mut rng = rand::thread_rng();
    let value = match generator {
        Generator::RandomInt(min, max) => {
            let (low, high) = if min <= max { (*min, *max) } else { (*max, *min) };
            json!(rng.gen_range(low..=high))
        }
        Generator::RandomDecimal(digits) => random_decimal(&mut rng, *digits),
        Generator::RandomHexadecimal(digits) => {
            Value::String(random_digits(&mut rng, *digits, b"0123456789abcdef"))
        }
        Generator::RandomString(size) => Value::String(
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(*size)
                .map(char::from)
                .collect(),
        ),
        Generator::Regex(pattern) => Value::String(regex_gen::generate_from_regex(pattern, &mut rng)?),
        Generator::Uuid(format) => {
            let id = uuid::Uuid::new_v4();
            Value::String(match format {
                UuidFormat::Simple => id.simple().to_string(),
                UuidFormat::LowerCaseHyphenated => id.hyphenated().to_string(),
                UuidFormat::UpperCaseHyphenated => id.hyphenated().to_string().to_uppercase(),
                UuidFormat::Urn => id.urn().to_string(),
            })
        }
        Generator::Date(format, expression) => {
            format_datetime(format.as_deref(), "yyyy-MM-dd", expression.as_deref())?
        }
        Generator::Time(format, expression) => {
            format_datetime(format.as_deref(), "HH:mm:ss", expression.as_deref())?
        }
        Generator::DateTime(format, expression) => {
            format_datetime(format.as_deref(), "yyyy-MM-dd'T'HH:mm:ss", expression.as_deref())?
        }
        Generator::RandomBoolean => Value::Bool(rng.gen()),
        Generator::ProviderStateGenerator(expression, data_type) => {
            convert(parse_expression(expression, &context.provider_state_values)?, *data_type)?
        }
        Generator::MockServerURL(example_url, pattern) => {
            let base = context
                .mock_server_url
                .as_deref()
                .ok_or_else(|| Error::invalid_state("No mock server URL is available"))?;
            let source = if example_url.is_empty() {
                json_to_string(example)
            } else {
                example_url.clone()
            };
            let regex = Regex::new(pattern)?;
            let path = regex
                .captures(&source)
                .and_then(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| {
                    Error::parse(format!("'{}' does not match the regex '{}'", source, pattern))
                })?;
            Value::String(format!("{}{}", base.trim_end_matches('/'), path))
        }
    };
    Ok(value)
}

/// Runs a generator, keeping the example when it fails or does not apply.
fn generate_or_keep(generator: &Generator, context: &GeneratorContext, example: &Value) -> Value {
    if !context.applies(generator) {
        return example.clone();
    }
    match generate(generator, context, example) {
        Ok(value) => value,
        Err(err) => {
            warn!("Generator {} failed, keeping the example value: {}", generator.name(), err);
            example.clone()
        }
    }
}

fn apply_to_values(
    values: &mut BTreeMap<String, Vec<String>>,
    generators: &Generators,
    category: Category,
    context: &GeneratorContext,
) {
    let generators = match generators.category(category) {
        Some(generators) => generators,
        None => return,
    };
    for (path, generator) in generators {
        let name = match path.last_field() {
            Some(name) => name,
            None => continue,
        };
        let key = values
            .keys()
            .find(|key| {
                if category == Category::Header {
                    key.eq_ignore_ascii_case(name)
                } else {
                    key.as_str() == name
                }
            })
            .cloned()
            .unwrap_or_else(|| name.to_string());
        let entry = values.entry(key).or_default();
        let example = Value::String(entry.first().cloned().unwrap_or_default());
        let generated = json_to_string(&generate_or_keep(generator, context, &example));
        *entry = vec![generated];
    }
}

/// Applies body generators. JSON bodies are rewritten per path, other bodies
/// only honour a generator at the root.
pub fn generate_body(body: &OptionalBody, generators: &Generators, context: &GeneratorContext) -> OptionalBody {
    let body_generators = match generators.category(Category::Body) {
        Some(generators) => generators,
        None => return body.clone(),
    };
    let (bytes, content_type) = match body {
        OptionalBody::Present(bytes, content_type) => (bytes, content_type),
        other => return other.clone(),
    };

    let is_json = body
        .resolved_content_type()
        .map(|content_type| content_type.is_json())
        .unwrap_or(false);
    if is_json {
        if let Ok(mut document) = serde_json::from_slice::<Value>(bytes) {
            for (path, generator) in body_generators {
                path.apply_mut(&mut document, &mut |value: &mut Value| {
                    *value = generate_or_keep(generator, context, value);
                });
            }
            debug!("Applied {} body generator(s)", body_generators.len());
            return OptionalBody::Present(document.to_string().into_bytes(), content_type.clone());
        }
    }

    match body_generators.iter().find(|(path, _)| path.is_root()) {
        Some((_, generator)) => {
            let example = Value::String(String::from_utf8_lossy(bytes).into_owned());
            let generated = json_to_string(&generate_or_keep(generator, context, &example));
            OptionalBody::Present(generated.into_bytes(), content_type.clone())
        }
        None => body.clone(),
    }
}

/// A copy of the request with its generators applied.
pub fn generate_request(request: &HttpRequest, context: &GeneratorContext) -> HttpRequest {
    let mut generated = request.clone();
    let generators = &request.generators;
    if let Some(generator) = generators.single(Category::Path) {
        let example = Value::String(request.path.clone());
        generated.path = json_to_string(&generate_or_keep(generator, context, &example));
    }
    if generators.category(Category::Query).is_some() {
        let mut query: Query = generated.query.take().unwrap_or_default();
        apply_to_values(&mut query, generators, Category::Query, context);
        generated.query = Some(query);
    }
    if generators.category(Category::Header).is_some() {
        let mut headers: Headers = generated.headers.take().unwrap_or_default();
        apply_to_values(&mut headers, generators, Category::Header, context);
        generated.headers = Some(headers);
    }
    generated.body = generate_body(&request.body, generators, context);
    generated
}

/// A copy of the response with its generators applied.
pub fn generate_response(response: &HttpResponse, context: &GeneratorContext) -> HttpResponse {
    let mut generated = response.clone();
    let generators = &response.generators;
    if let Some(generator) = generators.single(Category::Status) {
        let value = generate_or_keep(generator, context, &json!(response.status));
        match value.as_u64().and_then(|status| u16::try_from(status).ok()) {
            Some(status) => generated.status = status,
            None => warn!("Generated status {} is not a valid status code", value),
        }
    }
    if generators.category(Category::Header).is_some() {
        let mut headers: Headers = generated.headers.take().unwrap_or_default();
        apply_to_values(&mut headers, generators, Category::Header, context);
        generated.headers = Some(headers);
    }
    generated.body = generate_body(&response.body, generators, context);
    generated
}

/// A copy of the message with its generators applied to the contents and the
/// metadata.
pub fn generate_message(message: &MessageContents, context: &GeneratorContext) -> MessageContents {
    let mut generated = message.clone();
    generated.contents = generate_body(&message.contents, &message.generators, context);
    if let Some(generators) = message.generators.category(Category::Metadata) {
        for (path, generator) in generators {
            if let Some(key) = path.last_field() {
                let example = generated.metadata.get(key).cloned().unwrap_or(Value::Null);
                let value = generate_or_keep(generator, context, &example);
                generated.metadata.insert(key.to_string(), value);
            }
        }
    }
    generated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, DocPath};
    use regex::Regex;

    fn provider_context(values: Value) -> GeneratorContext {
        let values = values
            .as_object()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        GeneratorContext::provider(values)
    }

    #[test]
    fn random_generators_respect_their_parameters() {
        let context = GeneratorContext::default();
        for _ in 0..50 {
            let value = generate(&Generator::RandomInt(5, 7), &context, &Value::Null).unwrap();
            let number = value.as_i64().unwrap();
            assert!((5..=7).contains(&number));
        }
        let hex = generate(&Generator::RandomHexadecimal(12), &context, &Value::Null).unwrap();
        assert!(Regex::new("^[0-9a-f]{12}$").unwrap().is_match(hex.as_str().unwrap()));
        let text = generate(&Generator::RandomString(9), &context, &Value::Null).unwrap();
        assert_eq!(text.as_str().unwrap().len(), 9);
        let decimal = generate(&Generator::RandomDecimal(6), &context, &Value::Null).unwrap();
        assert!(decimal.is_f64());
        assert!(generate(&Generator::RandomBoolean, &context, &Value::Null).unwrap().is_boolean());
    }

    #[test]
    fn uuid_formats() {
        let context = GeneratorContext::default();
        let simple = generate(&Generator::Uuid(UuidFormat::Simple), &context, &Value::Null).unwrap();
        assert_eq!(simple.as_str().unwrap().len(), 32);
        let urn = generate(&Generator::Uuid(UuidFormat::Urn), &context, &Value::Null).unwrap();
        assert!(urn.as_str().unwrap().starts_with("urn:uuid:"));
        let upper = generate(&Generator::Uuid(UuidFormat::UpperCaseHyphenated), &context, &Value::Null).unwrap();
        let upper = upper.as_str().unwrap();
        assert_eq!(upper, upper.to_uppercase());
    }

    #[test]
    fn dates_use_java_style_formats() {
        let context = GeneratorContext::default();
        let date = generate(&Generator::Date(None, None), &context, &Value::Null).unwrap();
        assert!(Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap().is_match(date.as_str().unwrap()));
        let time = generate(&Generator::Time(Some("HH:mm".into()), Some("+ 1 hour".into())), &context, &Value::Null)
            .unwrap();
        assert!(Regex::new(r"^\d{2}:\d{2}$").unwrap().is_match(time.as_str().unwrap()));
    }

    #[test]
    fn provider_state_expressions() {
        let context = provider_context(json!({"id": 42, "name": "Mary"}));
        let whole = generate(&Generator::ProviderStateGenerator("${id}".into(), None), &context, &Value::Null).unwrap();
        assert_eq!(whole, json!(42));
        let templated = generate(
            &Generator::ProviderStateGenerator("/users/${id}/${name}".into(), None),
            &context,
            &Value::Null,
        )
        .unwrap();
        assert_eq!(templated, json!("/users/42/Mary"));
        let typed = generate(
            &Generator::ProviderStateGenerator("${id}".into(), Some(DataType::String)),
            &context,
            &Value::Null,
        )
        .unwrap();
        assert_eq!(typed, json!("42"));
        assert!(generate(&Generator::ProviderStateGenerator("${missing}".into(), None), &context, &Value::Null).is_err());
    }

    #[test]
    fn mock_server_url_replaces_the_host() {
        let context = GeneratorContext::consumer(Some("http://127.0.0.1:4321".into()));
        let generator = Generator::MockServerURL("http://example.com/orders/1".into(), ".*(/orders/\\d+)$".into());
        assert_eq!(
            generate(&generator, &context, &Value::Null).unwrap(),
            json!("http://127.0.0.1:4321/orders/1")
        );
        assert!(generate(&generator, &GeneratorContext::default(), &Value::Null).is_err());
    }

    #[test]
    fn generators_apply_only_in_their_mode() {
        let mut response = HttpResponse {
            status: 200,
            body: OptionalBody::Present(br#"{"id":1,"link":"http://x/a"}"#.to_vec(), Some(ContentType::json())),
            ..HttpResponse::default()
        };
        response.generators.add_generator(
            Category::Body,
            DocPath::new("$.link").unwrap(),
            Generator::MockServerURL("http://x/a".into(), ".*(/a)$".into()),
        );
        response.generators.add_generator(
            Category::Body,
            DocPath::new("$.id").unwrap(),
            Generator::ProviderStateGenerator("${id}".into(), None),
        );

        let generated = generate_response(&response, &GeneratorContext::consumer(Some("http://localhost:9".into())));
        assert_eq!(generated.body.as_json().unwrap(), json!({"id": 1, "link": "http://localhost:9/a"}));
        assert_eq!(response.body.as_json().unwrap()["link"], json!("http://x/a"));
    }

    #[test]
    fn request_generators_cover_path_query_and_headers() {
        let mut request = HttpRequest {
            method: "GET".into(),
            path: "/users/1".into(),
            ..HttpRequest::default()
        };
        request.generators.add_generator(
            Category::Path,
            DocPath::empty(),
            Generator::ProviderStateGenerator("/users/${id}".into(), None),
        );
        request.generators.add_generator(
            Category::Query,
            DocPath::field("page"),
            Generator::ProviderStateGenerator("${page}".into(), None),
        );
        request.generators.add_generator(
            Category::Header,
            DocPath::field("X-Token"),
            Generator::ProviderStateGenerator("token-${id}".into(), None),
        );
        let context = provider_context(json!({"id": 7, "page": 3}));
        let generated = generate_request(&request, &context);
        assert_eq!(generated.path, "/users/7");
        assert_eq!(generated.query.unwrap()["page"], vec!["3".to_string()]);
        assert_eq!(generated.headers.unwrap()["X-Token"], vec!["token-7".to_string()]);
    }

    #[test]
    fn message_metadata_generators() {
        let mut message = MessageContents::default();
        message.metadata.insert("id".into(), json!("x"));
        message.generators.add_generator(Category::Metadata, DocPath::field("id"), Generator::RandomInt(1, 1));
        let generated = generate_message(&message, &GeneratorContext::default());
        assert_eq!(generated.metadata["id"], json!(1));
    }
}
