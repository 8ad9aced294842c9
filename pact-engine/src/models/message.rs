use super::{
    body::OptionalBody, content_type::ContentType, generators::Generators,
    interaction::Comments, matchingrules::MatchingRules, provider_state::ProviderState,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// The payload of a message together with its metadata and rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageContents {
    pub contents: OptionalBody,
    pub metadata: BTreeMap<String, Value>,
    pub matching_rules: MatchingRules,
    pub generators: Generators,
}

impl MessageContents {
    /// Content type from the `contentType`/`content-type` metadata entry, or
    /// from the contents themselves.
    pub fn content_type(&self) -> Option<ContentType> {
        self.metadata
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("contentType") || key.eq_ignore_ascii_case("content-type"))
            .and_then(|(_, value)| value.as_str())
            .and_then(|value| value.parse().ok())
            .or_else(|| self.contents.resolved_content_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsyncMessage {
    pub id: Option<String>,
    pub key: Option<String>,
    pub description: String,
    pub provider_states: Vec<ProviderState>,
    pub contents: MessageContents,
    pub pending: bool,
    pub comments: Comments,
}

impl AsyncMessage {
    pub fn new<S: Into<String>>(description: S) -> Self {
        AsyncMessage {
            description: description.into(),
            ..AsyncMessage::default()
        }
    }
}

/// A request message answered by zero or more response messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncMessage {
    pub id: Option<String>,
    pub key: Option<String>,
    pub description: String,
    pub provider_states: Vec<ProviderState>,
    pub request: MessageContents,
    pub response: Vec<MessageContents>,
    pub pending: bool,
    pub comments: Comments,
}

impl SyncMessage {
    pub fn new<S: Into<String>>(description: S) -> Self {
        SyncMessage {
            description: description.into(),
            ..SyncMessage::default()
        }
    }
}
