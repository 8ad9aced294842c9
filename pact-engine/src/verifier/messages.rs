//! Producing the messages that message interactions describe.

use super::http_client::HttpClient;
use crate::{
    error::{Error, Result},
    models::{
        http::HttpPart,
        ContentType, HttpRequest, MessageContents, OptionalBody, ProviderState,
    },
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::{collections::BTreeMap, fmt};
use tracing::debug;

/// Header carrying base64 encoded JSON message metadata.
pub const MESSAGE_METADATA_HEADER: &str = "Pact-Message-Metadata";

/// Produces messages in-process.
pub trait MessageHandler: fmt::Debug + Send + Sync {
    /// The message an asynchronous interaction expects.
    fn produce(&self, description: &str, provider_states: &[ProviderState]) -> Result<MessageContents>;

    /// The responses to the request of a synchronous interaction.
    fn respond(
        &self,
        description: &str,
        request: &MessageContents,
        provider_states: &[ProviderState],
    ) -> Result<Vec<MessageContents>> {
        let _ = (request, provider_states);
        Err(Error::configuration(format!(
            "The message handler cannot respond to synchronous message '{}'",
            description
        )))
    }
}

type ProducerFn = dyn Fn(&BTreeMap<String, Value>) -> Result<MessageContents> + Send + Sync;

enum Producer {
    Static(MessageContents),
    Function(Box<ProducerFn>),
}

/// Messages keyed by interaction description, either fixed or built from
/// the provider state parameters.
#[derive(Default)]
pub struct MessageProducers {
    producers: BTreeMap<String, Producer>,
}

impl MessageProducers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message<S: Into<String>>(&mut self, description: S, message: MessageContents) -> &mut Self {
        self.producers.insert(description.into(), Producer::Static(message));
        self
    }

    /// A JSON message with the given metadata.
    pub fn add_json<S: Into<String>>(
        &mut self,
        description: S,
        contents: &Value,
        metadata: BTreeMap<String, Value>,
    ) -> &mut Self {
        let message = MessageContents {
            contents: OptionalBody::Present(contents.to_string().into_bytes(), Some(ContentType::json())),
            metadata,
            ..MessageContents::default()
        };
        self.add_message(description, message)
    }

    pub fn add_producer<S, F>(&mut self, description: S, producer: F) -> &mut Self
    where
        S: Into<String>,
        F: Fn(&BTreeMap<String, Value>) -> Result<MessageContents> + Send + Sync + 'static,
    {
        self.producers
            .insert(description.into(), Producer::Function(Box::new(producer)));
        self
    }
}

impl fmt::Debug for MessageProducers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProducers")
            .field("descriptions", &self.producers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn state_params(provider_states: &[ProviderState]) -> BTreeMap<String, Value> {
    provider_states
        .iter()
        .flat_map(|state| state.params.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect()
}

impl MessageHandler for MessageProducers {
    fn produce(&self, description: &str, provider_states: &[ProviderState]) -> Result<MessageContents> {
        match self.producers.get(description) {
            Some(Producer::Static(message)) => Ok(message.clone()),
            Some(Producer::Function(producer)) => producer(&state_params(provider_states)),
            None => Err(Error::configuration(format!(
                "No message producer is registered for '{}'",
                description
            ))),
        }
    }
}

/// Asks the provider's message endpoint for the message of an interaction.
/// The endpoint receives `{"description", "providerStates"}` and answers with
/// the message body, its metadata in the `Pact-Message-Metadata` header.
pub(crate) async fn fetch_message(
    client: &(dyn HttpClient + Send + Sync),
    base_url: &str,
    description: &str,
    provider_states: &[ProviderState],
) -> Result<MessageContents> {
    let body = json!({
        "description": description,
        "providerStates": provider_states.iter().map(ProviderState::to_json).collect::<Vec<_>>(),
    });
    let mut request = HttpRequest {
        method: "POST".into(),
        path: String::new(),
        body: OptionalBody::Present(body.to_string().into_bytes(), Some(ContentType::json())),
        ..HttpRequest::default()
    };
    request.add_header("Content-Type", "application/json");
    debug!("Requesting message '{}' from {}", description, base_url);

    let response = client.make_request(base_url, &request).await?;
    if !(200..300).contains(&response.status) {
        return Err(Error::Network(format!(
            "The message endpoint {} returned status {}",
            base_url, response.status
        )));
    }

    let mut metadata = response
        .lookup_header(MESSAGE_METADATA_HEADER)
        .and_then(|values| values.first())
        .map(|encoded| decode_metadata(encoded))
        .transpose()?
        .unwrap_or_default();
    if !metadata.keys().any(|k| k.eq_ignore_ascii_case("contentType") || k.eq_ignore_ascii_case("content-type")) {
        if let Some(content_type) = response.lookup_header("content-type").and_then(|v| v.first()) {
            metadata.insert("contentType".into(), Value::String(content_type.clone()));
        }
    }

    Ok(MessageContents {
        contents: response.body,
        metadata,
        ..MessageContents::default()
    })
}

fn decode_metadata(encoded: &str) -> Result<BTreeMap<String, Value>> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| Error::parse(format!("Message metadata is not valid base64: {}", err)))?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(Error::parse(format!("Message metadata must be a JSON object, got {}", other))),
    }
}

/// Encodes metadata for the `Pact-Message-Metadata` header.
pub fn encode_metadata(metadata: &BTreeMap<String, Value>) -> String {
    BASE64.encode(json!(metadata).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpResponse;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct MessageEndpoint;

    #[async_trait]
    impl HttpClient for MessageEndpoint {
        async fn make_request(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse> {
            assert_eq!(base_url, "http://localhost:9000/_pact/message");
            let body = request.body.as_json().unwrap();
            assert_eq!(body["description"], "an alligator named Mary");
            assert_eq!(body["providerStates"][0]["name"], "Mary exists");

            let mut metadata = BTreeMap::new();
            metadata.insert("queue".to_string(), json!("alligators"));
            let mut response = HttpResponse {
                body: OptionalBody::present(r#"{"name":"Mary"}"#, None),
                ..HttpResponse::default()
            };
            response.add_header(MESSAGE_METADATA_HEADER, encode_metadata(&metadata));
            response.add_header("Content-Type", "application/json");
            Ok(response)
        }
    }

    #[tokio::test]
    async fn messages_come_with_their_metadata() {
        let message = fetch_message(
            &MessageEndpoint,
            "http://localhost:9000/_pact/message",
            "an alligator named Mary",
            &[ProviderState::new("Mary exists")],
        )
        .await
        .unwrap();

        assert_eq!(message.metadata["queue"], "alligators");
        assert_eq!(message.metadata["contentType"], "application/json");
        assert_eq!(message.contents.as_json().unwrap()["name"], "Mary");
    }

    #[test]
    fn producers_use_provider_state_parameters() {
        let mut producers = MessageProducers::new();
        producers
            .add_json("a fixed alligator", &json!({"name": "Tom"}), BTreeMap::new())
            .add_producer("an alligator", |params| {
                let name = params.get("name").cloned().unwrap_or(Value::Null);
                Ok(MessageContents {
                    contents: OptionalBody::Present(
                        json!({ "name": name }).to_string().into_bytes(),
                        Some(ContentType::json()),
                    ),
                    ..MessageContents::default()
                })
            });

        let mut params = BTreeMap::new();
        params.insert("name".to_string(), json!("Mary"));
        let state = ProviderState::with_params("an alligator exists", params);

        let message = producers.produce("an alligator", &[state]).unwrap();
        assert_eq!(message.contents.as_json().unwrap()["name"], "Mary");
        let message = producers.produce("a fixed alligator", &[]).unwrap();
        assert_eq!(message.contents.as_json().unwrap()["name"], "Tom");
        assert!(producers.produce("an unknown message", &[]).is_err());
        assert!(producers
            .respond("an alligator", &MessageContents::default(), &[])
            .is_err());
    }

    #[test]
    fn metadata_headers_must_be_json_objects() {
        assert!(decode_metadata(&BASE64.encode("[1,2]")).is_err());
        assert!(decode_metadata("!!!").is_err());
    }
}
