use super::{
    http::HttpInteraction,
    message::{AsyncMessage, SyncMessage},
    provider_state::ProviderState,
};
use crate::error::Error;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

/// V4 interaction comments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Comments {
    pub text: Vec<String>,
    pub test_name: Option<String>,
    pub other: BTreeMap<String, Value>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.test_name.is_none() && self.other.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut map: Map<String, Value> = self.other.clone().into_iter().collect();
        if !self.text.is_empty() {
            map.insert("text".into(), json!(self.text));
        }
        if let Some(test_name) = &self.test_name {
            map.insert("testname".into(), json!(test_name));
        }
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> Self {
        let mut comments = Comments::default();
        if let Some(map) = value.as_object() {
            for (key, value) in map {
                match (key.as_str(), value) {
                    ("text", Value::Array(text)) => {
                        comments.text = text
                            .iter()
                            .map(|t| t.as_str().map(String::from).unwrap_or_else(|| t.to_string()))
                            .collect()
                    }
                    ("testname", Value::String(name)) => comments.test_name = Some(name.clone()),
                    _ => {
                        comments.other.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        comments
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InteractionKind {
    Http,
    AsyncMessage,
    SyncMessage,
}

impl InteractionKind {
    /// The V4 `type` attribute.
    pub fn v4_type(&self) -> &'static str {
        match self {
            InteractionKind::Http => "Synchronous/HTTP",
            InteractionKind::AsyncMessage => "Asynchronous/Messages",
            InteractionKind::SyncMessage => "Synchronous/Messages",
        }
    }
}

impl FromStr for InteractionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Synchronous/HTTP" | "HTTP" | "http" => Ok(InteractionKind::Http),
            "Asynchronous/Messages" | "Async" | "async" => Ok(InteractionKind::AsyncMessage),
            "Synchronous/Messages" | "Sync" | "sync" => Ok(InteractionKind::SyncMessage),
            other => Err(Error::parse(format!("'{}' is not a known interaction type", other))),
        }
    }
}

impl Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.v4_type())
    }
}

/// One expected exchange between consumer and provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Http(HttpInteraction),
    AsyncMessage(AsyncMessage),
    SyncMessage(SyncMessage),
}

impl Interaction {
    pub fn new<S: Into<String>>(description: S, kind: InteractionKind) -> Self {
        match kind {
            InteractionKind::Http => Interaction::Http(HttpInteraction::new(description)),
            InteractionKind::AsyncMessage => {
                Interaction::AsyncMessage(AsyncMessage::new(description))
            }
            InteractionKind::SyncMessage => Interaction::SyncMessage(SyncMessage::new(description)),
        }
    }

    pub fn kind(&self) -> InteractionKind {
        match self {
            Interaction::Http(_) => InteractionKind::Http,
            Interaction::AsyncMessage(_) => InteractionKind::AsyncMessage,
            Interaction::SyncMessage(_) => InteractionKind::SyncMessage,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Interaction::Http(i) => &i.description,
            Interaction::AsyncMessage(i) => &i.description,
            Interaction::SyncMessage(i) => &i.description,
        }
    }

    pub fn provider_states(&self) -> &[ProviderState] {
        match self {
            Interaction::Http(i) => &i.provider_states,
            Interaction::AsyncMessage(i) => &i.provider_states,
            Interaction::SyncMessage(i) => &i.provider_states,
        }
    }

    pub fn provider_states_mut(&mut self) -> &mut Vec<ProviderState> {
        match self {
            Interaction::Http(i) => &mut i.provider_states,
            Interaction::AsyncMessage(i) => &mut i.provider_states,
            Interaction::SyncMessage(i) => &mut i.provider_states,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Interaction::Http(i) => i.id.as_deref(),
            Interaction::AsyncMessage(i) => i.id.as_deref(),
            Interaction::SyncMessage(i) => i.id.as_deref(),
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Interaction::Http(i) => i.key.as_deref(),
            Interaction::AsyncMessage(i) => i.key.as_deref(),
            Interaction::SyncMessage(i) => i.key.as_deref(),
        }
    }

    pub fn set_key(&mut self, key: Option<String>) {
        match self {
            Interaction::Http(i) => i.key = key,
            Interaction::AsyncMessage(i) => i.key = key,
            Interaction::SyncMessage(i) => i.key = key,
        }
    }

    pub fn pending(&self) -> bool {
        match self {
            Interaction::Http(i) => i.pending,
            Interaction::AsyncMessage(i) => i.pending,
            Interaction::SyncMessage(i) => i.pending,
        }
    }

    pub fn set_pending(&mut self, pending: bool) {
        match self {
            Interaction::Http(i) => i.pending = pending,
            Interaction::AsyncMessage(i) => i.pending = pending,
            Interaction::SyncMessage(i) => i.pending = pending,
        }
    }

    pub fn comments(&self) -> &Comments {
        match self {
            Interaction::Http(i) => &i.comments,
            Interaction::AsyncMessage(i) => &i.comments,
            Interaction::SyncMessage(i) => &i.comments,
        }
    }

    pub fn comments_mut(&mut self) -> &mut Comments {
        match self {
            Interaction::Http(i) => &mut i.comments,
            Interaction::AsyncMessage(i) => &mut i.comments,
            Interaction::SyncMessage(i) => &mut i.comments,
        }
    }

    pub fn as_http(&self) -> Option<&HttpInteraction> {
        match self {
            Interaction::Http(i) => Some(i),
            _ => None,
        }
    }

    /// Whether the interaction uses anything a V4 pact is needed for.
    pub fn requires_v4(&self) -> bool {
        self.key().is_some()
            || self.pending()
            || !self.comments().is_empty()
            || matches!(self, Interaction::SyncMessage(_))
    }

    /// Identifier used in verification results: the broker id, the key or
    /// the description.
    pub fn unique_id(&self) -> String {
        self.id()
            .or_else(|| self.key())
            .unwrap_or_else(|| self.description())
            .to_string()
    }
}

impl Display for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interaction::Http(i) => write!(
                f,
                "HTTP interaction '{}' ({} {})",
                i.description, i.request.method, i.request.path
            ),
            Interaction::AsyncMessage(i) => write!(f, "Asynchronous message '{}'", i.description),
            Interaction::SyncMessage(i) => write!(f, "Synchronous message '{}'", i.description),
        }
    }
}
