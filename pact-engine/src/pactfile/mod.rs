//! Versioned JSON pact file format.
//!
//! A document is encoded for one [`PactSpecification`]. Decoding detects the
//! version from the metadata and falls back to V2 for HTTP pacts and V3 for
//! message pacts when none is recorded.

mod interactions;
mod io;

pub use io::{load_pact_directory, merge_pacts, read_pact_file, write_pact_file};

use crate::error::{Error, Result};
use crate::models::{Interaction, InteractionKind, Pact, PactSpecification};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Metadata namespace written by this crate.
pub const ENGINE_METADATA_KEY: &str = "pact-engine";

const VERSION_KEYS: [&str; 3] = ["pactSpecification", "pact-specification", "pactSpecificationVersion"];
const V4_ONLY_KEYS: [&str; 4] = ["type", "key", "pending", "comments"];

/// Serialises `pact` in the layout of `specification`.
pub fn encode(pact: &Pact, specification: PactSpecification) -> Result<Value> {
    let mut http = Vec::new();
    let mut messages = Vec::new();

    for interaction in &pact.interactions {
        if interaction.requires_v4() && specification < PactSpecification::V4 {
            if let Interaction::SyncMessage(_) = interaction {
                return Err(Error::UnsupportedVersion(format!(
                    "synchronous message '{}' can not be written as a {} pact",
                    interaction.description(),
                    specification
                )));
            }
            warn!(
                "'{}' uses V4 attributes that a {} pact can not hold, they will be dropped",
                interaction.description(),
                specification
            );
        }

        match interaction {
            Interaction::Http(http_interaction) => {
                http.push(interactions::encode_http(http_interaction, specification));
            }
            Interaction::AsyncMessage(message) => {
                if !specification.supports_messages() {
                    return Err(Error::UnsupportedVersion(format!(
                        "message '{}' can not be written as a {} pact",
                        message.description, specification
                    )));
                }
                let encoded = interactions::encode_async(message, specification);
                if specification >= PactSpecification::V4 {
                    http.push(encoded);
                } else {
                    messages.push(encoded);
                }
            }
            Interaction::SyncMessage(message) => http.push(interactions::encode_sync(message)),
        }
    }

    let mut document = Map::new();
    document.insert("consumer".into(), json!({ "name": pact.consumer }));
    document.insert("provider".into(), json!({ "name": pact.provider }));
    if specification == PactSpecification::V3 && !messages.is_empty() {
        if !http.is_empty() {
            document.insert("interactions".into(), Value::Array(http));
        }
        document.insert("messages".into(), Value::Array(messages));
    } else {
        document.insert("interactions".into(), Value::Array(http));
    }
    document.insert("metadata".into(), encode_metadata(pact, specification));

    Ok(Value::Object(document))
}

fn encode_metadata(pact: &Pact, specification: PactSpecification) -> Value {
    let mut metadata = Map::new();
    for (namespace, values) in &pact.metadata {
        if VERSION_KEYS.contains(&namespace.as_str()) || namespace == ENGINE_METADATA_KEY {
            continue;
        }
        metadata.insert(
            namespace.clone(),
            Value::Object(values.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
    }
    metadata.insert(
        "pactSpecification".into(),
        json!({ "version": specification.version_str() }),
    );
    metadata.insert(
        ENGINE_METADATA_KEY.into(),
        json!({ "version": env!("CARGO_PKG_VERSION") }),
    );
    Value::Object(metadata)
}

/// Reads the specification version recorded in a document's metadata.
pub fn specification_of(document: &Value) -> Result<Option<PactSpecification>> {
    let metadata = match document.get("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => return Ok(None),
    };
    let version = metadata
        .get("pactSpecification")
        .or_else(|| metadata.get("pact-specification"))
        .and_then(|section| section.get("version"))
        .or_else(|| metadata.get("pactSpecificationVersion"));
    match version {
        Some(Value::String(version)) => version.parse().map(Some),
        Some(Value::Number(version)) => version.to_string().parse().map(Some),
        Some(other) => Err(Error::parse(format!("'{}' is not a specification version", other))),
        None => Ok(None),
    }
}

fn party_name(document: &Value, party: &str) -> Result<String> {
    document
        .get(party)
        .and_then(|p| p.get("name"))
        .and_then(|n| n.as_str())
        .map(String::from)
        .ok_or_else(|| Error::parse(format!("Pact document has no {} name", party)))
}

/// Reads a pact document of any supported version.
pub fn decode(document: &Value) -> Result<Pact> {
    if !document.is_object() {
        return Err(Error::parse("A pact document must be a JSON object"));
    }
    let consumer = party_name(document, "consumer")?;
    let provider = party_name(document, "provider")?;

    let http = document.get("interactions");
    let messages = document.get("messages");
    if http.is_none() && messages.is_none() {
        return Err(Error::parse(format!(
            "Pact between {} and {} has no interactions",
            consumer, provider
        )));
    }
    let http = array_of(http, "interactions")?;
    let messages = array_of(messages, "messages")?;

    let specification = match specification_of(document)? {
        Some(specification) => specification,
        None if !messages.is_empty() => PactSpecification::V3,
        None => PactSpecification::V2,
    };
    debug!("Reading a {} pact between {} and {}", specification, consumer, provider);

    let mut pact = Pact::new(consumer, provider, specification);
    for value in http {
        pact.interactions.push(decode_interaction(value, specification, InteractionKind::Http)?);
    }
    for value in messages {
        pact.interactions.push(decode_interaction(value, specification, InteractionKind::AsyncMessage)?);
    }
    pact.metadata = decode_metadata(document);
    Ok(pact)
}

fn array_of<'a>(value: Option<&'a Value>, name: &str) -> Result<&'a [Value]> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(Error::parse(format!("'{}' must be an array but was '{}'", name, other))),
    }
}

fn decode_interaction(value: &Value, specification: PactSpecification, default_kind: InteractionKind) -> Result<Interaction> {
    if specification < PactSpecification::V4 {
        if let Some(key) = V4_ONLY_KEYS.iter().find(|key| value.get(**key).is_some()) {
            return Err(Error::parse(format!(
                "Interaction attribute '{}' requires a V4 pact but the document is {}",
                key, specification
            )));
        }
        return match default_kind {
            InteractionKind::Http => interactions::decode_http(value, specification).map(Interaction::Http),
            _ => interactions::decode_async(value, specification).map(Interaction::AsyncMessage),
        };
    }

    let kind = match value.get("type").and_then(|t| t.as_str()) {
        Some(kind) => kind.parse()?,
        None => default_kind,
    };
    match kind {
        InteractionKind::Http => interactions::decode_http(value, specification).map(Interaction::Http),
        InteractionKind::AsyncMessage => {
            interactions::decode_async(value, specification).map(Interaction::AsyncMessage)
        }
        InteractionKind::SyncMessage => interactions::decode_sync(value).map(Interaction::SyncMessage),
    }
}

fn decode_metadata(document: &Value) -> BTreeMap<String, BTreeMap<String, Value>> {
    let mut metadata = BTreeMap::new();
    if let Some(Value::Object(map)) = document.get("metadata") {
        for (namespace, values) in map {
            if VERSION_KEYS.contains(&namespace.as_str()) || namespace == ENGINE_METADATA_KEY {
                continue;
            }
            if let Value::Object(values) = values {
                metadata.insert(
                    namespace.clone(),
                    values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                );
            }
        }
    }
    metadata
}
