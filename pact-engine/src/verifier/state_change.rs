//! Putting the provider into the state an interaction expects.

use super::{configuration::StateChangeConfig, http_client::HttpClient, sources::send_json};
use crate::{
    error::{Error, Result},
    models::ProviderState,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;
use url::Url;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StateAction {
    Setup,
    Teardown,
}

impl StateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateAction::Setup => "setup",
            StateAction::Teardown => "teardown",
        }
    }
}

impl fmt::Display for StateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies provider states. Setup may return values that provider state
/// generators substitute into the request.
#[async_trait]
pub trait StateHandler: fmt::Debug + Send + Sync {
    async fn change_state(
        &self,
        state: &ProviderState,
        action: StateAction,
    ) -> Result<BTreeMap<String, Value>>;
}

type StateFn = dyn Fn(&ProviderState, StateAction) -> Result<BTreeMap<String, Value>> + Send + Sync;

/// A closure called for every state change.
pub struct FnStateHandler {
    handler: Box<StateFn>,
}

impl FnStateHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ProviderState, StateAction) -> Result<BTreeMap<String, Value>> + Send + Sync + 'static,
    {
        FnStateHandler {
            handler: Box::new(handler),
        }
    }
}

impl fmt::Debug for FnStateHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStateHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl StateHandler for FnStateHandler {
    async fn change_state(
        &self,
        state: &ProviderState,
        action: StateAction,
    ) -> Result<BTreeMap<String, Value>> {
        (self.handler)(state, action)
    }
}

type StateParamsFn = dyn Fn(&BTreeMap<String, Value>, StateAction) -> Result<BTreeMap<String, Value>> + Send + Sync;

/// Closures keyed by state name. Unknown states fail.
#[derive(Default)]
pub struct StateHandlerMap {
    handlers: BTreeMap<String, Box<StateParamsFn>>,
}

impl StateHandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S, F>(&mut self, state: S, handler: F) -> &mut Self
    where
        S: Into<String>,
        F: Fn(&BTreeMap<String, Value>, StateAction) -> Result<BTreeMap<String, Value>> + Send + Sync + 'static,
    {
        self.handlers.insert(state.into(), Box::new(handler));
        self
    }
}

impl fmt::Debug for StateHandlerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandlerMap")
            .field("states", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl StateHandler for StateHandlerMap {
    async fn change_state(
        &self,
        state: &ProviderState,
        action: StateAction,
    ) -> Result<BTreeMap<String, Value>> {
        match self.handlers.get(&state.name) {
            Some(handler) => handler(&state.params, action),
            None => Err(Error::StateChange {
                state: state.name.clone(),
                message: "No handler is registered for this state".into(),
            }),
        }
    }
}

/// Calls the provider's state change endpoint with `POST`.
#[derive(Debug)]
pub struct HttpStateHandler {
    config: StateChangeConfig,
    client: Arc<dyn HttpClient + Send + Sync>,
}

impl HttpStateHandler {
    pub fn new(config: StateChangeConfig, client: Arc<dyn HttpClient + Send + Sync>) -> Self {
        HttpStateHandler { config, client }
    }

    fn query_url(&self, state: &ProviderState, action: StateAction) -> Result<String> {
        let mut url = Url::parse(&self.config.url)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("state", &state.name);
            query.append_pair("action", action.as_str());
            for (name, value) in &state.params {
                match value {
                    Value::String(s) => query.append_pair(name, s),
                    other => query.append_pair(name, &other.to_string()),
                };
            }
        }
        Ok(url.to_string())
    }
}

#[async_trait]
impl StateHandler for HttpStateHandler {
    async fn change_state(
        &self,
        state: &ProviderState,
        action: StateAction,
    ) -> Result<BTreeMap<String, Value>> {
        let failed = |message: String| Error::StateChange {
            state: state.name.clone(),
            message,
        };

        let (url, body) = if self.config.body {
            let body = json!({
                "state": state.name,
                "params": state.params,
                "action": action.as_str(),
            });
            (self.config.url.clone(), Some(body))
        } else {
            (self.query_url(state, action)?, None)
        };
        debug!("Calling state change endpoint {} for '{}' ({})", url, state.name, action);

        let (status, response) = send_json(self.client.as_ref(), "POST", &url, None, body.as_ref())
            .await
            .map_err(|err| failed(err.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(failed(format!("The state change endpoint returned status {}", status)));
        }

        Ok(match response {
            Value::Object(values) => values.into_iter().collect(),
            _ => BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{http::HttpPart, HttpRequest, HttpResponse, OptionalBody};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct RecordingClient {
        status: u16,
        body: &'static str,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingClient {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(RecordingClient {
                status,
                body,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn make_request(&self, _base_url: &str, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(HttpResponse {
                status: self.status,
                body: OptionalBody::present(self.body, None),
                ..HttpResponse::default()
            })
        }
    }

    fn state() -> ProviderState {
        let mut params = BTreeMap::new();
        params.insert("name".to_string(), json!("Mary"));
        params.insert("age".to_string(), json!(3));
        ProviderState::with_params("an alligator exists", params)
    }

    #[tokio::test]
    async fn state_changes_are_posted_as_json() {
        let client = RecordingClient::new(200, r#"{"id": 42}"#);
        let handler = HttpStateHandler::new(
            StateChangeConfig {
                url: "http://localhost:8080/_pact/state".into(),
                teardown: false,
                body: true,
            },
            client.clone(),
        );

        let values = handler.change_state(&state(), StateAction::Setup).await.unwrap();
        assert_eq!(values["id"], json!(42));

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/_pact/state");
        let body = requests[0].body.as_json().unwrap();
        assert_eq!(body["state"], "an alligator exists");
        assert_eq!(body["action"], "setup");
        assert_eq!(body["params"]["name"], "Mary");
        assert!(requests[0].has_header("content-type"));
    }

    #[tokio::test]
    async fn state_changes_can_use_query_parameters() {
        let client = RecordingClient::new(204, "");
        let handler = HttpStateHandler::new(
            StateChangeConfig {
                url: "http://localhost:8080/_pact/state".into(),
                teardown: true,
                body: false,
            },
            client.clone(),
        );

        let values = handler.change_state(&state(), StateAction::Teardown).await.unwrap();
        assert!(values.is_empty());

        let requests = client.requests.lock().unwrap();
        let query = requests[0].query.as_ref().unwrap();
        assert_eq!(query["state"], vec!["an alligator exists".to_string()]);
        assert_eq!(query["action"], vec!["teardown".to_string()]);
        assert_eq!(query["name"], vec!["Mary".to_string()]);
        assert_eq!(query["age"], vec!["3".to_string()]);
        assert!(requests[0].body.is_missing());
    }

    #[tokio::test]
    async fn error_statuses_fail_the_state_change() {
        let client = RecordingClient::new(500, "boom");
        let handler = HttpStateHandler::new(
            StateChangeConfig {
                url: "http://localhost:8080/_pact/state".into(),
                teardown: false,
                body: true,
            },
            client,
        );
        match handler.change_state(&state(), StateAction::Setup).await {
            Err(Error::StateChange { state, message }) => {
                assert_eq!(state, "an alligator exists");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn mapped_handlers_receive_the_parameters() {
        let mut handlers = StateHandlerMap::new();
        handlers.add("an alligator exists", |params, action| {
            assert_eq!(action, StateAction::Setup);
            let mut values = BTreeMap::new();
            values.insert("name".to_string(), params["name"].clone());
            Ok(values)
        });

        let values = handlers.change_state(&state(), StateAction::Setup).await.unwrap();
        assert_eq!(values["name"], "Mary");

        let unknown = ProviderState::new("no alligators");
        assert!(matches!(
            handlers.change_state(&unknown, StateAction::Setup).await,
            Err(Error::StateChange { .. })
        ));
    }
}
