use crate::matching::Mismatch;
use crate::models::HttpRequest;
use serde_json::{json, Map, Value};

/// What happened to one request received by a mock server, or to one
/// interaction that never got its request.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    RequestMatch {
        interaction: String,
        request: HttpRequest,
    },
    /// Method and path agreed with an interaction but something else did not.
    RequestMismatch {
        interaction: String,
        request: HttpRequest,
        mismatches: Vec<Mismatch>,
    },
    RequestNotFound {
        request: HttpRequest,
    },
    MissingRequest {
        interaction: String,
        request: HttpRequest,
    },
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        matches!(self, MatchResult::RequestMatch { .. })
    }

    pub fn match_type(&self) -> &'static str {
        match self {
            MatchResult::RequestMatch { .. } => "request-match",
            MatchResult::RequestMismatch { .. } => "request-mismatch",
            MatchResult::RequestNotFound { .. } => "request-not-found",
            MatchResult::MissingRequest { .. } => "missing-request",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MatchResult::RequestMatch { interaction, request } => json!({
                "type": self.match_type(),
                "interaction": interaction,
                "method": request.method,
                "path": request.path,
            }),
            MatchResult::RequestMismatch { interaction, request, mismatches } => json!({
                "type": self.match_type(),
                "interaction": interaction,
                "method": request.method,
                "path": request.path,
                "mismatches": mismatches.iter().map(Mismatch::to_json).collect::<Vec<_>>(),
            }),
            MatchResult::RequestNotFound { request } => json!({
                "type": self.match_type(),
                "method": request.method,
                "path": request.path,
                "request": request_json(request),
            }),
            MatchResult::MissingRequest { interaction, request } => json!({
                "type": self.match_type(),
                "interaction": interaction,
                "method": request.method,
                "path": request.path,
                "request": request_json(request),
            }),
        }
    }
}

pub(crate) fn request_json(request: &HttpRequest) -> Value {
    let mut map = Map::new();
    map.insert("method".into(), Value::String(request.method.clone()));
    map.insert("path".into(), Value::String(request.path.clone()));
    if let Some(query) = request.query_string() {
        map.insert("query".into(), Value::String(query));
    }
    if let Some(headers) = request.headers.as_ref().filter(|h| !h.is_empty()) {
        map.insert("headers".into(), json!(headers));
    }
    if let Some(body) = request.body.value_as_string().filter(|b| !b.is_empty()) {
        map.insert("body".into(), Value::String(body));
    }
    Value::Object(map)
}
