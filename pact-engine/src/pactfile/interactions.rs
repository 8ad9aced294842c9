//! JSON form of single interactions for each specification version.

use crate::error::{Error, Result};
use crate::matching::headers::header_values;
use crate::models::{
    http::{parse_query_string, Headers, Query},
    AsyncMessage, Comments, ContentType, Generators, HttpInteraction, HttpRequest, HttpResponse,
    InteractionKind, MatchingRules, MessageContents, OptionalBody, PactSpecification, ProviderState,
    SyncMessage,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

type Object = Map<String, Value>;

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Object> {
    value
        .as_object()
        .ok_or_else(|| Error::parse(format!("{} must be a JSON object but was '{}'", what, value)))
}

fn encode_headers(headers: &Headers, specification: PactSpecification) -> Value {
    Value::Object(
        headers
            .iter()
            .map(|(name, values)| {
                let value = if specification >= PactSpecification::V4 {
                    json!(values)
                } else {
                    json!(values.join(", "))
                };
                (name.clone(), value)
            })
            .collect(),
    )
}

fn decode_headers(value: Option<&Value>) -> Result<Option<Headers>> {
    let map = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => as_object(value, "headers")?,
    };
    let mut headers = Headers::new();
    for (name, value) in map {
        let values = match value {
            Value::String(s) => header_values(name, &[s.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(String::from).unwrap_or_else(|| item.to_string()))
                .collect(),
            other => vec![other.to_string()],
        };
        headers.insert(name.clone(), values);
    }
    Ok(Some(headers))
}

fn header_content_type(headers: &Option<Headers>) -> Option<ContentType> {
    headers
        .as_ref()?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, values)| values.first())
        .and_then(|value| value.parse().ok())
}

fn encode_query(request: &HttpRequest, specification: PactSpecification) -> Option<Value> {
    let query = request.query.as_ref().filter(|q| !q.is_empty())?;
    if specification >= PactSpecification::V3 {
        Some(Value::Object(
            query.iter().map(|(name, values)| (name.clone(), json!(values))).collect(),
        ))
    } else {
        request.query_string().map(Value::String)
    }
}

fn decode_query(value: Option<&Value>) -> Result<Option<Query>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(parse_query_string(s)),
        Some(Value::Object(map)) => {
            let mut query = Query::new();
            for (name, values) in map {
                let values = match values {
                    Value::Array(items) => items
                        .iter()
                        .map(|item| item.as_str().map(String::from).unwrap_or_else(|| item.to_string()))
                        .collect(),
                    Value::String(s) => vec![s.clone()],
                    other => vec![other.to_string()],
                };
                query.insert(name.clone(), values);
            }
            Ok(Some(query))
        }
        Some(other) => Err(Error::parse(format!("Query '{}' is neither a string nor a map", other))),
    }
}

fn encode_body(body: &OptionalBody, specification: PactSpecification) -> Option<Value> {
    if specification >= PactSpecification::V4 {
        body.to_v4_value()
    } else {
        body.to_pact_value()
    }
}

fn decode_body(value: Option<&Value>, content_type: Option<ContentType>, specification: PactSpecification) -> OptionalBody {
    if specification >= PactSpecification::V4 {
        OptionalBody::from_v4_value(value, content_type)
    } else {
        OptionalBody::from_pact_value(value, content_type)
    }
}

fn encode_rules(rules: &MatchingRules, specification: PactSpecification) -> Option<Value> {
    if rules.is_empty() || specification < PactSpecification::V2 {
        return None;
    }
    if specification == PactSpecification::V2 {
        Some(rules.to_v2_json())
    } else {
        Some(rules.to_v3_json())
    }
}

/// Both layouts are accepted: flat V2 keys start with `$`.
fn decode_rules(value: Option<&Value>) -> Result<MatchingRules> {
    match value {
        Some(Value::Object(map)) if map.keys().any(|key| key.starts_with('$')) => {
            MatchingRules::from_v2_json(&Value::Object(map.clone()))
        }
        Some(value @ Value::Object(_)) => MatchingRules::from_v3_json(value),
        _ => Ok(MatchingRules::default()),
    }
}

fn encode_generators(generators: &Generators, specification: PactSpecification) -> Option<Value> {
    if generators.is_empty() || specification < PactSpecification::V3 {
        None
    } else {
        Some(generators.to_json())
    }
}

fn decode_generators(value: Option<&Value>) -> Result<Generators> {
    match value {
        Some(value @ Value::Object(_)) => Generators::from_json(value),
        _ => Ok(Generators::default()),
    }
}

fn insert_some(map: &mut Object, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn encode_provider_states(map: &mut Object, states: &[ProviderState], specification: PactSpecification) {
    if states.is_empty() {
        return;
    }
    if specification >= PactSpecification::V3 {
        map.insert(
            "providerStates".into(),
            Value::Array(states.iter().map(ProviderState::to_json).collect()),
        );
    } else {
        map.insert("providerState".into(), Value::String(states[0].name.clone()));
    }
}

fn decode_provider_states(map: &Object) -> Vec<ProviderState> {
    if let Some(Value::Array(states)) = map.get("providerStates") {
        return states.iter().filter_map(ProviderState::from_json).collect();
    }
    map.get("providerState")
        .or_else(|| map.get("provider_state"))
        .and_then(|state| state.as_str())
        .filter(|state| !state.is_empty())
        .map(|state| vec![ProviderState::new(state)])
        .unwrap_or_default()
}

fn description_of(map: &Object) -> Result<String> {
    map.get("description")
        .and_then(|d| d.as_str())
        .map(String::from)
        .ok_or_else(|| Error::parse("Interaction has no description"))
}

/// `type`, `key`, `pending` and `comments` of a V4 interaction.
fn encode_v4_attributes(
    map: &mut Object,
    kind: InteractionKind,
    key: &Option<String>,
    pending: bool,
    comments: &Comments,
) {
    map.insert("type".into(), Value::String(kind.v4_type().to_string()));
    if let Some(key) = key {
        map.insert("key".into(), Value::String(key.clone()));
    }
    if pending {
        map.insert("pending".into(), Value::Bool(true));
    }
    if !comments.is_empty() {
        map.insert("comments".into(), comments.to_json());
    }
}

struct V4Attributes {
    key: Option<String>,
    pending: bool,
    comments: Comments,
}

fn decode_v4_attributes(map: &Object) -> V4Attributes {
    V4Attributes {
        key: map.get("key").and_then(|k| k.as_str()).map(String::from),
        pending: map.get("pending").and_then(|p| p.as_bool()).unwrap_or(false),
        comments: map.get("comments").map(Comments::from_json).unwrap_or_default(),
    }
}

fn broker_id(map: &Object) -> Option<String> {
    map.get("_id").and_then(|id| id.as_str()).map(String::from)
}

pub(crate) fn encode_http(interaction: &HttpInteraction, specification: PactSpecification) -> Value {
    let mut map = Object::new();
    if specification >= PactSpecification::V4 {
        encode_v4_attributes(
            &mut map,
            InteractionKind::Http,
            &interaction.key,
            interaction.pending,
            &interaction.comments,
        );
    }
    map.insert("description".into(), Value::String(interaction.description.clone()));
    encode_provider_states(&mut map, &interaction.provider_states, specification);

    let request = &interaction.request;
    let mut request_map = Object::new();
    request_map.insert("method".into(), Value::String(request.method.to_uppercase()));
    request_map.insert("path".into(), Value::String(request.path.clone()));
    insert_some(&mut request_map, "query", encode_query(request, specification));
    if let Some(headers) = request.headers.as_ref().filter(|h| !h.is_empty()) {
        request_map.insert("headers".into(), encode_headers(headers, specification));
    }
    insert_some(&mut request_map, "body", encode_body(&request.body, specification));
    insert_some(&mut request_map, "matchingRules", encode_rules(&request.matching_rules, specification));
    insert_some(&mut request_map, "generators", encode_generators(&request.generators, specification));
    map.insert("request".into(), Value::Object(request_map));

    let response = &interaction.response;
    let mut response_map = Object::new();
    response_map.insert("status".into(), json!(response.status));
    if let Some(headers) = response.headers.as_ref().filter(|h| !h.is_empty()) {
        response_map.insert("headers".into(), encode_headers(headers, specification));
    }
    insert_some(&mut response_map, "body", encode_body(&response.body, specification));
    insert_some(&mut response_map, "matchingRules", encode_rules(&response.matching_rules, specification));
    insert_some(&mut response_map, "generators", encode_generators(&response.generators, specification));
    map.insert("response".into(), Value::Object(response_map));

    Value::Object(map)
}

pub(crate) fn decode_http(value: &Value, specification: PactSpecification) -> Result<HttpInteraction> {
    let map = as_object(value, "Interaction")?;
    let description = description_of(map)?;
    let request_map = as_object(
        map.get("request")
            .ok_or_else(|| Error::parse(format!("Interaction '{}' has no request", description)))?,
        "request",
    )?;
    let response_map = as_object(
        map.get("response")
            .ok_or_else(|| Error::parse(format!("Interaction '{}' has no response", description)))?,
        "response",
    )?;

    let request_headers = decode_headers(request_map.get("headers"))?;
    let request_type = header_content_type(&request_headers);
    let request = HttpRequest {
        method: request_map
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("GET")
            .to_uppercase(),
        path: request_map
            .get("path")
            .and_then(|p| p.as_str())
            .unwrap_or("/")
            .to_string(),
        query: decode_query(request_map.get("query"))?,
        body: decode_body(request_map.get("body"), request_type, specification),
        headers: request_headers,
        matching_rules: decode_rules(request_map.get("matchingRules"))?,
        generators: decode_generators(request_map.get("generators"))?,
    };

    let response_headers = decode_headers(response_map.get("headers"))?;
    let response_type = header_content_type(&response_headers);
    let status = response_map
        .get("status")
        .and_then(|s| s.as_u64())
        .map(u16::try_from)
        .transpose()
        .map_err(|_| Error::parse(format!("Interaction '{}' has an invalid status", description)))?
        .unwrap_or(200);
    let response = HttpResponse {
        status,
        body: decode_body(response_map.get("body"), response_type, specification),
        headers: response_headers,
        matching_rules: decode_rules(response_map.get("matchingRules"))?,
        generators: decode_generators(response_map.get("generators"))?,
    };

    let attributes = decode_v4_attributes(map);
    Ok(HttpInteraction {
        id: broker_id(map),
        key: attributes.key,
        description,
        provider_states: decode_provider_states(map),
        request,
        response,
        pending: attributes.pending,
        comments: attributes.comments,
    })
}

fn encode_contents(map: &mut Object, contents: &MessageContents, specification: PactSpecification) {
    insert_some(map, "contents", encode_body(&contents.contents, specification));
    if !contents.metadata.is_empty() {
        map.insert(
            "metadata".into(),
            Value::Object(contents.metadata.clone().into_iter().collect()),
        );
    }
    insert_some(map, "matchingRules", encode_rules(&contents.matching_rules, specification));
    insert_some(map, "generators", encode_generators(&contents.generators, specification));
}

fn decode_contents(map: &Object, specification: PactSpecification) -> Result<MessageContents> {
    let metadata: BTreeMap<String, Value> = match map.get("metadata").or_else(|| map.get("metaData")) {
        Some(Value::Object(metadata)) => metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    };
    let content_type = metadata
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("contentType") || key.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, value)| value.as_str())
        .and_then(|value| value.parse().ok());
    Ok(MessageContents {
        contents: decode_body(map.get("contents"), content_type, specification),
        metadata,
        matching_rules: decode_rules(map.get("matchingRules"))?,
        generators: decode_generators(map.get("generators"))?,
    })
}

pub(crate) fn encode_async(message: &AsyncMessage, specification: PactSpecification) -> Value {
    let mut map = Object::new();
    if specification >= PactSpecification::V4 {
        encode_v4_attributes(
            &mut map,
            InteractionKind::AsyncMessage,
            &message.key,
            message.pending,
            &message.comments,
        );
    }
    map.insert("description".into(), Value::String(message.description.clone()));
    encode_provider_states(&mut map, &message.provider_states, specification);
    encode_contents(&mut map, &message.contents, specification);
    Value::Object(map)
}

pub(crate) fn decode_async(value: &Value, specification: PactSpecification) -> Result<AsyncMessage> {
    let map = as_object(value, "Message")?;
    let attributes = decode_v4_attributes(map);
    Ok(AsyncMessage {
        id: broker_id(map),
        key: attributes.key,
        description: description_of(map)?,
        provider_states: decode_provider_states(map),
        contents: decode_contents(map, specification)?,
        pending: attributes.pending,
        comments: attributes.comments,
    })
}

pub(crate) fn encode_sync(message: &SyncMessage) -> Value {
    let specification = PactSpecification::V4;
    let mut map = Object::new();
    encode_v4_attributes(
        &mut map,
        InteractionKind::SyncMessage,
        &message.key,
        message.pending,
        &message.comments,
    );
    map.insert("description".into(), Value::String(message.description.clone()));
    encode_provider_states(&mut map, &message.provider_states, specification);

    let mut request = Object::new();
    encode_contents(&mut request, &message.request, specification);
    map.insert("request".into(), Value::Object(request));
    let responses = message
        .response
        .iter()
        .map(|response| {
            let mut response_map = Object::new();
            encode_contents(&mut response_map, response, specification);
            Value::Object(response_map)
        })
        .collect();
    map.insert("response".into(), Value::Array(responses));
    Value::Object(map)
}

pub(crate) fn decode_sync(value: &Value) -> Result<SyncMessage> {
    let specification = PactSpecification::V4;
    let map = as_object(value, "Message")?;
    let description = description_of(map)?;
    let request = match map.get("request") {
        Some(request) => decode_contents(as_object(request, "request")?, specification)?,
        None => MessageContents::default(),
    };
    let response = match map.get("response") {
        Some(Value::Array(responses)) => responses
            .iter()
            .map(|response| decode_contents(as_object(response, "response")?, specification))
            .collect::<Result<Vec<_>>>()?,
        Some(other) => vec![decode_contents(as_object(other, "response")?, specification)?],
        None => vec![],
    };
    let attributes = decode_v4_attributes(map);
    Ok(SyncMessage {
        id: broker_id(map),
        key: attributes.key,
        description,
        provider_states: decode_provider_states(map),
        request,
        response,
        pending: attributes.pending,
        comments: attributes.comments,
    })
}
