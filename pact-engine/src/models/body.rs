use super::content_type::ContentType;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use std::fmt::Display;

/// The body of a request, response or message.
///
/// `Missing` means the body was not specified at all, which is different from
/// an explicitly empty body or a JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum OptionalBody {
    #[default]
    Missing,
    Empty,
    Null,
    Present(Vec<u8>, Option<ContentType>),
}

impl OptionalBody {
    pub fn present<B: Into<Vec<u8>>>(body: B, content_type: Option<ContentType>) -> Self {
        let body = body.into();
        if body.is_empty() {
            OptionalBody::Empty
        } else {
            OptionalBody::Present(body, content_type)
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => OptionalBody::Null,
            _ => OptionalBody::Present(value.to_string().into_bytes(), Some(ContentType::json())),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, OptionalBody::Present(..))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, OptionalBody::Missing)
    }

    pub fn value(&self) -> Option<&[u8]> {
        match self {
            OptionalBody::Present(bytes, _) => Some(bytes),
            _ => None,
        }
    }

    pub fn value_as_string(&self) -> Option<String> {
        self.value().map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// The bytes of the body, empty unless present.
    pub fn bytes(&self) -> Vec<u8> {
        self.value().map(|b| b.to_vec()).unwrap_or_default()
    }

    pub fn content_type(&self) -> Option<&ContentType> {
        match self {
            OptionalBody::Present(_, content_type) => content_type.as_ref(),
            _ => None,
        }
    }

    pub fn with_content_type(self, content_type: Option<ContentType>) -> Self {
        match self {
            OptionalBody::Present(bytes, existing) => {
                OptionalBody::Present(bytes, content_type.or(existing))
            }
            other => other,
        }
    }

    /// Content type of the body, either declared or sniffed from the bytes.
    pub fn resolved_content_type(&self) -> Option<ContentType> {
        match self {
            OptionalBody::Present(bytes, content_type) => content_type
                .clone()
                .or_else(|| ContentType::detect(bytes)),
            _ => None,
        }
    }

    /// Parses the body as JSON. `Null` bodies become JSON null.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            OptionalBody::Null => Some(Value::Null),
            OptionalBody::Present(bytes, _) => serde_json::from_slice(bytes).ok(),
            _ => None,
        }
    }

    /// The representation used inside V2/V3 pact files: JSON bodies are
    /// embedded as JSON, binary bodies as base64 strings and the rest as text.
    pub fn to_pact_value(&self) -> Option<Value> {
        match self {
            OptionalBody::Missing => None,
            OptionalBody::Empty => Some(Value::String(String::new())),
            OptionalBody::Null => Some(Value::Null),
            OptionalBody::Present(bytes, _) => {
                let content_type = self.resolved_content_type();
                if content_type.as_ref().map(|c| c.is_json()).unwrap_or(false) {
                    if let Ok(json) = serde_json::from_slice::<Value>(bytes) {
                        return Some(json);
                    }
                }

                match std::str::from_utf8(bytes) {
                    Ok(text) if !content_type.map(|c| c.is_binary()).unwrap_or(false) => {
                        Some(Value::String(text.to_string()))
                    }
                    _ => Some(Value::String(BASE64.encode(bytes))),
                }
            }
        }
    }

    /// Inverse of [`OptionalBody::to_pact_value`].
    pub fn from_pact_value(value: Option<&Value>, content_type: Option<ContentType>) -> Self {
        match value {
            None => OptionalBody::Missing,
            Some(Value::Null) => OptionalBody::Null,
            Some(Value::String(s)) if s.is_empty() => OptionalBody::Empty,
            Some(Value::String(s)) => {
                let is_json = content_type.as_ref().map(|c| c.is_json()).unwrap_or(false);
                let is_binary = content_type.as_ref().map(|c| c.is_binary()).unwrap_or(false);
                if is_binary {
                    match BASE64.decode(s) {
                        Ok(bytes) => OptionalBody::Present(bytes, content_type),
                        Err(_) => OptionalBody::Present(s.clone().into_bytes(), content_type),
                    }
                } else if is_json {
                    OptionalBody::Present(json_string_body(s), content_type)
                } else {
                    OptionalBody::Present(s.clone().into_bytes(), content_type)
                }
            }
            Some(json) => OptionalBody::Present(
                json.to_string().into_bytes(),
                content_type.or_else(|| Some(ContentType::json())),
            ),
        }
    }

    /// V4 body form: `{"content": .., "contentType": .., "encoded": ..}`.
    pub fn to_v4_value(&self) -> Option<Value> {
        match self {
            OptionalBody::Missing => None,
            OptionalBody::Empty => Some(serde_json::json!({ "content": "" })),
            OptionalBody::Null => Some(serde_json::json!({ "content": null })),
            OptionalBody::Present(bytes, _) => {
                let content_type = self
                    .resolved_content_type()
                    .unwrap_or_else(ContentType::octet_stream);
                let mut map = serde_json::Map::new();
                if content_type.is_json() {
                    match serde_json::from_slice::<Value>(bytes) {
                        Ok(json) => {
                            map.insert("content".into(), json);
                            map.insert("encoded".into(), Value::Bool(false));
                        }
                        Err(_) => {
                            map.insert("content".into(), Value::String(String::from_utf8_lossy(bytes).into()));
                            map.insert("encoded".into(), Value::Bool(false));
                        }
                    }
                } else if content_type.is_text() {
                    match std::str::from_utf8(bytes) {
                        Ok(text) => {
                            map.insert("content".into(), Value::String(text.into()));
                            map.insert("encoded".into(), Value::Bool(false));
                        }
                        Err(_) => {
                            map.insert("content".into(), Value::String(BASE64.encode(bytes)));
                            map.insert("encoded".into(), Value::String("base64".into()));
                        }
                    }
                } else {
                    map.insert("content".into(), Value::String(BASE64.encode(bytes)));
                    map.insert("encoded".into(), Value::String("base64".into()));
                }
                map.insert("contentType".into(), Value::String(content_type.to_string()));
                Some(Value::Object(map))
            }
        }
    }

    pub fn from_v4_value(value: Option<&Value>, fallback_type: Option<ContentType>) -> Self {
        let body = match value {
            None => return OptionalBody::Missing,
            Some(Value::Object(body)) => body,
            Some(other) => return OptionalBody::from_pact_value(Some(other), fallback_type),
        };

        let content_type = body
            .get("contentType")
            .and_then(|c| c.as_str())
            .and_then(|c| c.parse::<ContentType>().ok())
            .or(fallback_type);
        let encoded = match body.get("encoded") {
            Some(Value::String(encoding)) => encoding.eq_ignore_ascii_case("base64"),
            Some(Value::Bool(flag)) => *flag,
            _ => false,
        };

        match body.get("content") {
            None => OptionalBody::Missing,
            Some(Value::Null) => OptionalBody::Null,
            Some(Value::String(s)) if s.is_empty() => OptionalBody::Empty,
            Some(Value::String(s)) if encoded => match BASE64.decode(s) {
                Ok(bytes) => OptionalBody::Present(bytes, content_type),
                Err(_) => OptionalBody::Present(s.clone().into_bytes(), content_type),
            },
            Some(Value::String(s)) => {
                if content_type.as_ref().map(|c| c.is_json()).unwrap_or(false) {
                    OptionalBody::Present(json_string_body(s), content_type)
                } else {
                    OptionalBody::Present(s.clone().into_bytes(), content_type)
                }
            }
            Some(json) => OptionalBody::Present(
                json.to_string().into_bytes(),
                content_type.or_else(|| Some(ContentType::json())),
            ),
        }
    }
}

/// A string stored under a JSON content type is either a serialised JSON
/// document or a bare JSON string that lost its quotes.
fn json_string_body(s: &str) -> Vec<u8> {
    if serde_json::from_str::<Value>(s).is_ok() {
        s.as_bytes().to_vec()
    } else {
        Value::String(s.to_string()).to_string().into_bytes()
    }
}

impl Display for OptionalBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionalBody::Missing => write!(f, "Missing"),
            OptionalBody::Empty => write!(f, "Empty"),
            OptionalBody::Null => write!(f, "Null"),
            OptionalBody::Present(bytes, content_type) => {
                let content_type = content_type
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".into());
                write!(f, "Present({} bytes, {})", bytes.len(), content_type)
            }
        }
    }
}
