//! Replays pacts against a running provider.
//!
//! A verifier moves through `Configured -> Running -> Completed` exactly
//! once. Interactions are verified one at a time on a tokio runtime owned
//! by the run, logging through the verifier's own dispatcher.

mod configuration;
mod filters;
mod http_client;
mod messages;
mod publish;
mod results;
mod sources;
mod state_change;

pub use configuration::{
    FilterInfo, ProviderInfo, ProviderTransport, PublishOptions, StateChangeConfig, VerifierConfiguration,
    DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use filters::{BodyFilter, FiltersBuilder, HeadersFilter, RequestFilter};
pub use http_client::{HttpClient, HyperHttpClient};
pub use messages::{encode_metadata, MessageHandler, MessageProducers, MESSAGE_METADATA_HEADER};
pub use results::{ExitCode, InteractionResult, InteractionStatus, VerificationError, VerificationResult};
pub use sources::{
    BrokerSource, HttpAuth, PactSource, BROKER_PASSWORD_ENV, BROKER_TOKEN_ENV, BROKER_URL_ENV,
    BROKER_USERNAME_ENV,
};
pub use state_change::{FnStateHandler, HttpStateHandler, StateAction, StateHandler, StateHandlerMap};

use crate::{
    error::{Error, Result},
    generators::{generate_message, generate_request, generate_response, GeneratorContext},
    logging::LogBuffer,
    matching::{match_message, match_response, match_sync_message},
    models::{http::HttpPart, AsyncMessage, HttpInteraction, Interaction, ProviderState, SyncMessage},
};
use configuration::StateChangeSetup;
use serde_json::Value;
use sources::LoadedPact;
use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::runtime::Builder;
use tracing::{debug, info, instrument::WithSubscriber, warn, Dispatch};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VerifierState {
    Configured,
    Running,
    Completed,
}

#[derive(Debug)]
pub struct Verifier {
    configuration: VerifierConfiguration,
    state: VerifierState,
    result: Option<VerificationResult>,
    logs: Option<LogBuffer>,
    dispatch: Dispatch,
}

/// What one run needs while verifying interactions.
struct Run<'a> {
    configuration: &'a VerifierConfiguration,
    client: Arc<dyn HttpClient + Send + Sync>,
    state_handler: Option<(Arc<dyn StateHandler>, bool)>,
}

impl Verifier {
    pub fn new(configuration: VerifierConfiguration) -> Result<Verifier> {
        let (dispatch, logs) = configuration.log_config().dispatch()?;
        Ok(Verifier {
            configuration,
            state: VerifierState::Configured,
            result: None,
            logs,
            dispatch,
        })
    }

    pub fn state(&self) -> VerifierState {
        self.state
    }

    pub fn configuration(&self) -> &VerifierConfiguration {
        &self.configuration
    }

    /// Changes to the configuration before the run starts.
    pub fn configuration_mut(&mut self) -> Result<&mut VerifierConfiguration> {
        if self.state != VerifierState::Configured {
            return Err(Error::invalid_state("The verifier has already run"));
        }
        Ok(&mut self.configuration)
    }

    pub fn results(&self) -> Option<&VerificationResult> {
        self.result.as_ref()
    }

    /// The text report of the completed run.
    pub fn output(&self) -> String {
        self.result.as_ref().map(VerificationResult::output).unwrap_or_default()
    }

    /// Log output of the verifier's in-memory sink.
    pub fn logs(&self) -> String {
        self.logs.as_ref().map(LogBuffer::contents).unwrap_or_default()
    }

    /// Runs the verification on a runtime of its own. Must not be called
    /// from within an async context; use [`Verifier::verify_async`] there.
    pub fn verify(&mut self) -> Result<&VerificationResult> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(self.run())?;
        self.result
            .as_ref()
            .ok_or_else(|| Error::invalid_state("The verification produced no result"))
    }

    pub async fn verify_async(&mut self) -> Result<&VerificationResult> {
        self.run().await?;
        self.result
            .as_ref()
            .ok_or_else(|| Error::invalid_state("The verification produced no result"))
    }

    /// Runs the verification and reduces the outcome to an exit code. Panics
    /// are caught and reported as [`ExitCode::Panic`].
    pub fn execute(&mut self) -> ExitCode {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.verify().map(VerificationResult::exit_code)));
        match outcome {
            Ok(Ok(code)) => code,
            Ok(Err(err)) => {
                let _guard = tracing::dispatcher::set_default(&self.dispatch);
                warn!("Verification failed: {}", err);
                ExitCode::for_error(&err)
            }
            Err(_) => ExitCode::Panic,
        }
    }

    async fn run(&mut self) -> Result<()> {
        let dispatch = self.dispatch.clone();
        async {
            if self.state != VerifierState::Configured {
                return Err(Error::invalid_state(format!(
                    "A {:?} verifier cannot be run again",
                    self.state
                )));
            }
            self.validate()?;
            self.state = VerifierState::Running;
            info!("Verifying provider {}", self.configuration.provider().name);

            let result = execute_run(&self.configuration).await;
            self.state = VerifierState::Completed;
            let result = result?;
            info!(
                "Verification of {} completed: {} interaction(s), success: {}",
                self.configuration.provider().name,
                result.interactions.len(),
                result.success()
            );
            self.result = Some(result);
            Ok(())
        }
        .with_subscriber(dispatch)
        .await
    }

    /// Checks done before any I/O.
    fn validate(&self) -> Result<()> {
        let configuration = &self.configuration;
        if configuration.provider().name.trim().is_empty() {
            return Err(Error::MissingArgument("provider name".into()));
        }
        if configuration.sources().is_empty() {
            return Err(Error::MissingArgument("pact sources".into()));
        }
        if configuration.provider().transports.is_empty() && configuration.message_handler().is_none() {
            return Err(Error::MissingArgument("provider transports".into()));
        }
        if let Some(options) = configuration.publish_options() {
            options.version()?;
        }
        Ok(())
    }
}

async fn execute_run(configuration: &VerifierConfiguration) -> Result<VerificationResult> {
    let client: Arc<dyn HttpClient + Send + Sync> = match configuration.http_client() {
        Some(client) => client,
        None => Arc::new(HyperHttpClient::with_options(
            Some(Duration::from_millis(configuration.request_timeout())),
            configuration.disable_ssl_verification(),
        )?),
    };
    resolve_provider(configuration.provider()).await?;

    let state_handler = configuration.state_change().map(|setup| match setup {
        StateChangeSetup::Url(config) => (
            Arc::new(HttpStateHandler::new(config.clone(), client.clone())) as Arc<dyn StateHandler>,
            config.teardown,
        ),
        StateChangeSetup::Handler { handler, teardown } => (handler.clone(), *teardown),
    });
    let run = Run {
        configuration,
        client,
        state_handler,
    };

    let mut result = VerificationResult::default();
    let mut loaded = Vec::new();
    for source in configuration.sources() {
        match sources::load_source(source, &configuration.provider().name, run.client.as_ref()).await {
            Ok(pacts) => loaded.extend(pacts),
            Err(err) => {
                warn!("Could not load pacts from {}: {}", source.describe(), err);
                result.errors.push((source.describe(), err.to_string()));
            }
        }
    }
    let loaded = sources::merge_loaded(loaded)?;

    for pact in &loaded {
        let consumers = configuration.consumer_filters();
        if !consumers.is_empty() && !consumers.contains(&pact.pact.consumer) {
            debug!("Skipping the pact of consumer {}", pact.pact.consumer);
            continue;
        }
        if pact.pact.provider != configuration.provider().name {
            warn!(
                "Pact from {} is for provider {}, not {}",
                pact.source,
                pact.pact.provider,
                configuration.provider().name
            );
        }

        let interactions: Vec<&Interaction> = pact
            .pact
            .interactions
            .iter()
            .filter(|interaction| configuration.filter().matches(interaction))
            .collect();
        if interactions.is_empty() {
            if configuration.error_on_empty_pact() {
                result.errors.push((
                    pact.source.clone(),
                    format!(
                        "No interactions to verify in the pact between {} and {}",
                        pact.pact.consumer, pact.pact.provider
                    ),
                ));
            } else {
                warn!("No interactions to verify in the pact from {}", pact.source);
            }
            continue;
        }

        info!(
            "Verifying {} interaction(s) between {} and {}",
            interactions.len(),
            pact.pact.consumer,
            pact.pact.provider
        );
        let first = result.interactions.len();
        for interaction in interactions {
            let interaction_result = run.verify_interaction(pact, interaction).await;
            match interaction_result.status() {
                InteractionStatus::Success => info!("  {} ... OK", interaction.description()),
                InteractionStatus::Pending => warn!("  {} ... FAILED (pending)", interaction.description()),
                InteractionStatus::Failure => warn!("  {} ... FAILED", interaction.description()),
            }
            result.interactions.push(interaction_result);
        }

        if let Some(options) = configuration.publish_options() {
            let results: Vec<&InteractionResult> = result.interactions[first..].iter().collect();
            publish_pact_results(&run, pact, options, &results, &mut result.notices).await;
        }
    }

    Ok(result)
}

/// Aborts the run when the provider's host does not resolve.
async fn resolve_provider(provider: &ProviderInfo) -> Result<()> {
    let transport = match provider.transport("http") {
        Some(transport) => transport,
        None => return Ok(()),
    };
    let resolved = tokio::net::lookup_host((provider.host.as_str(), transport.port()))
        .await
        .map_err(|err| Error::Network(format!("Could not resolve provider host {}: {}", provider.host, err)))?
        .next();
    match resolved {
        Some(address) => {
            debug!("Provider {} resolved to {}", provider.name, address);
            Ok(())
        }
        None => Err(Error::Network(format!(
            "Provider host {} has no addresses",
            provider.host
        ))),
    }
}

async fn publish_pact_results(
    run: &Run<'_>,
    pact: &LoadedPact,
    options: &PublishOptions,
    results: &[&InteractionResult],
    notices: &mut Vec<String>,
) {
    if pact.brokers.is_empty() {
        debug!("The pact from {} has no broker to publish results to", pact.source);
        return;
    }
    for broker in &pact.brokers {
        let published = async {
            publish::record_provider_version(run.client.as_ref(), broker, &pact.pact.provider, options).await?;
            publish::publish_results(run.client.as_ref(), broker, options, results).await
        }
        .await;
        if let Err(err) = published {
            warn!("Could not publish verification results to {}: {}", broker.publish_url, err);
            notices.push(format!(
                "Failed to publish verification results to {}: {}",
                broker.publish_url, err
            ));
        }
    }
}

impl<'a> Run<'a> {
    async fn verify_interaction(&self, pact: &LoadedPact, interaction: &Interaction) -> InteractionResult {
        let started = Instant::now();
        let states = interaction.provider_states();
        debug!("Verifying {}", interaction);

        let error = match self.setup_states(states).await {
            Err(error) => Some(error),
            Ok(state_values) => {
                let outcome = match interaction {
                    Interaction::Http(http) => self.verify_http(http, state_values).await,
                    Interaction::AsyncMessage(message) => self.verify_async_message(message, state_values).await,
                    Interaction::SyncMessage(message) => self.verify_sync_message(message, state_values).await,
                };
                self.teardown_states(states).await;
                outcome.err()
            }
        };

        InteractionResult {
            consumer: pact.pact.consumer.clone(),
            provider: pact.pact.provider.clone(),
            description: interaction.description().to_string(),
            interaction_id: interaction.unique_id(),
            provider_states: states.iter().map(|state| state.name.clone()).collect(),
            pending: interaction.pending(),
            error,
            duration_ms: started.elapsed().as_millis(),
        }
    }

    /// Sets up every state, collecting the values they return.
    async fn setup_states(
        &self,
        states: &[ProviderState],
    ) -> std::result::Result<BTreeMap<String, Value>, VerificationError> {
        let mut values = BTreeMap::new();
        let handler = match &self.state_handler {
            Some((handler, _)) => handler,
            None => {
                if !states.is_empty() {
                    debug!("No state handler is configured, skipping {} state(s)", states.len());
                }
                return Ok(values);
            }
        };
        for state in states {
            match handler.change_state(state, StateAction::Setup).await {
                Ok(state_values) => values.extend(state_values),
                Err(err) => {
                    warn!("State change for '{}' failed: {}", state.name, err);
                    let message = match err {
                        Error::StateChange { message, .. } => message,
                        other => other.to_string(),
                    };
                    return Err(VerificationError::StateChangeFailed {
                        state: state.name.clone(),
                        message,
                    });
                }
            }
        }
        Ok(values)
    }

    async fn teardown_states(&self, states: &[ProviderState]) {
        if let Some((handler, true)) = &self.state_handler {
            for state in states.iter().rev() {
                if let Err(err) = handler.change_state(state, StateAction::Teardown).await {
                    warn!("Teardown of state '{}' failed: {}", state.name, err);
                }
            }
        }
    }

    fn base_url(&self, protocol: &str) -> std::result::Result<String, VerificationError> {
        let provider = self.configuration.provider();
        provider
            .transport(protocol)
            .map(|transport| transport.base_url(&provider.host))
            .ok_or_else(|| {
                VerificationError::RequestFailed(format!(
                    "Provider {} has no {} transport",
                    provider.name, protocol
                ))
            })
    }

    async fn verify_http(
        &self,
        interaction: &HttpInteraction,
        state_values: BTreeMap<String, Value>,
    ) -> std::result::Result<(), VerificationError> {
        let context = GeneratorContext::provider(state_values);
        let mut request = generate_request(&interaction.request, &context);
        let expected = generate_response(&interaction.response, &context);
        for filter in self.configuration.request_filters() {
            filter.apply(&mut request);
        }
        for (name, value) in self.configuration.custom_headers() {
            request.set_header(name, value.clone());
        }
        request.remove_header("content-length");

        let base_url = self.base_url("http")?;
        let response = self
            .client
            .make_request(&base_url, &request)
            .await
            .map_err(|err| VerificationError::RequestFailed(err.to_string()))?;
        debug!("Provider answered {} with status {}", request.path, response.status);

        let mismatches = match_response(&expected, &response);
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(VerificationError::Mismatches(mismatches))
        }
    }

    async fn verify_async_message(
        &self,
        message: &AsyncMessage,
        state_values: BTreeMap<String, Value>,
    ) -> std::result::Result<(), VerificationError> {
        let expected = generate_message(&message.contents, &GeneratorContext::provider(state_values));
        let actual = match self.configuration.message_handler() {
            Some(handler) => handler.produce(&message.description, &message.provider_states),
            None => {
                let base_url = self.base_url("message")?;
                messages::fetch_message(
                    self.client.as_ref(),
                    &base_url,
                    &message.description,
                    &message.provider_states,
                )
                .await
            }
        }
        .map_err(|err| VerificationError::RequestFailed(err.to_string()))?;

        let mismatches = match_message(&expected, &actual);
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(VerificationError::Mismatches(mismatches))
        }
    }

    async fn verify_sync_message(
        &self,
        message: &SyncMessage,
        state_values: BTreeMap<String, Value>,
    ) -> std::result::Result<(), VerificationError> {
        let handler = self.configuration.message_handler().ok_or_else(|| {
            VerificationError::RequestFailed(format!(
                "Synchronous message '{}' needs an in-process message handler",
                message.description
            ))
        })?;
        let context = GeneratorContext::provider(state_values);
        let request = generate_message(&message.request, &context);
        let responses = handler
            .respond(&message.description, &request, &message.provider_states)
            .map_err(|err| VerificationError::RequestFailed(err.to_string()))?;

        let mut expected = message.clone();
        expected.request = request.clone();
        expected.response = message
            .response
            .iter()
            .map(|response| generate_message(response, &context))
            .collect();
        let mismatches = match_sync_message(&expected, &request, &responses);
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(VerificationError::Mismatches(mismatches))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        logging::LogConfig,
        matching::Mismatch,
        models::{
            generators::DataType, matchingrules::Category, ContentType, DocPath, Generator, HttpRequest,
            HttpResponse, InteractionPart, OptionalBody, Pact, PactSpecification,
        },
        pactfile,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::{path::Path, sync::Mutex};

    /// A provider answering every request with a fixed response.
    #[derive(Debug)]
    struct FixedProvider {
        response: HttpResponse,
        requests: Mutex<Vec<(String, HttpRequest)>>,
    }

    impl FixedProvider {
        fn new(status: u16, body: &str) -> Arc<Self> {
            let mut response = HttpResponse {
                status,
                body: OptionalBody::present(body, None),
                ..HttpResponse::default()
            };
            response.add_header("Content-Type", "application/json");
            Arc::new(FixedProvider {
                response,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(String, HttpRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for FixedProvider {
        async fn make_request(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((base_url.to_string(), request.clone()));
            Ok(self.response.clone())
        }
    }

    fn write_alligator_pact(dir: &Path) {
        let mut pact = Pact::new("Alligator Web", "Alligator Service", PactSpecification::V3);
        let handle = pact.upon_receiving("a request for an alligator").unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .given("there is an alligator named Mary")
            .with_request("GET", "/alligators/Mary")
            .unwrap()
            .with_header(InteractionPart::Request, "Accept", "application/json")
            .unwrap()
            .will_respond_with(200)
            .unwrap()
            .with_header(InteractionPart::Response, "Content-Type", "application/json")
            .unwrap()
            .with_body(InteractionPart::Response, Some("application/json"), r#"{"name": "Mary"}"#)
            .unwrap();
        pactfile::write_pact_file(dir.join("alligators.json"), &pact, PactSpecification::V3, true).unwrap();
    }

    fn configuration(dir: &Path, client: Arc<FixedProvider>) -> VerifierConfiguration {
        let mut provider = ProviderInfo::new("Alligator Service");
        provider.set_host("127.0.0.1");
        provider.add_transport(ProviderTransport::new("http").with_port(Some(8080)).with_path("/api"));
        let mut configuration = VerifierConfiguration::new(provider);
        configuration.add_source(PactSource::Dir(dir.to_path_buf()));
        configuration.set_http_client(client);
        configuration.set_log_config(LogConfig::default());
        configuration
    }

    #[test]
    fn matching_providers_pass() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let provider = FixedProvider::new(200, r#"{"name": "Mary"}"#);
        let mut configuration = configuration(dir.path(), provider.clone());
        configuration.add_custom_header("Authorization", "Bearer 123");

        let mut verifier = Verifier::new(configuration).unwrap();
        let result = verifier.verify().unwrap();
        assert!(result.success());
        assert_eq!(result.interactions.len(), 1);
        assert_eq!(verifier.state(), VerifierState::Completed);

        let requests = provider.requests();
        assert_eq!(requests[0].0, "http://127.0.0.1:8080/api");
        assert_eq!(requests[0].1.path, "/alligators/Mary");
        assert_eq!(requests[0].1.lookup_header("authorization").unwrap()[0], "Bearer 123");
        assert!(verifier.logs().contains("Verifying provider Alligator Service"));
    }

    #[test]
    fn body_differences_fail_the_interaction() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let provider = FixedProvider::new(200, r#"{"name": "Tom"}"#);
        let mut verifier = Verifier::new(configuration(dir.path(), provider)).unwrap();
        let result = verifier.verify().unwrap().clone();

        assert!(!result.success());
        let mismatches = result.mismatches();
        assert_eq!(mismatches.len(), 1);
        match mismatches[0] {
            Mismatch::BodyMismatch { path, expected, actual, .. } => {
                assert_eq!(path, "$.name");
                assert_eq!(expected, &Some(json!("Mary")));
                assert_eq!(actual, &Some(json!("Tom")));
            }
            other => panic!("unexpected mismatch {:?}", other),
        }

        let provider = FixedProvider::new(200, r#"{"name": "Tom"}"#);
        let mut verifier = Verifier::new(configuration(dir.path(), provider)).unwrap();
        assert_eq!(verifier.execute(), ExitCode::Failure);
    }

    #[test]
    fn wrong_status_codes_are_a_single_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let provider = FixedProvider::new(404, r#"{"name": "Mary"}"#);
        let mut verifier = Verifier::new(configuration(dir.path(), provider)).unwrap();
        let result = verifier.verify().unwrap();
        assert_eq!(result.mismatches().len(), 1);
        assert!(matches!(result.mismatches()[0], Mismatch::StatusMismatch { expected: 200, actual: 404, .. }));
    }

    #[test]
    fn failed_state_changes_skip_the_provider() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let provider = FixedProvider::new(200, r#"{"name": "Mary"}"#);
        let mut configuration = configuration(dir.path(), provider.clone());
        configuration.set_state_handler(
            Arc::new(FnStateHandler::new(|state, _| {
                Err(Error::StateChange {
                    state: state.name.clone(),
                    message: "database unavailable".into(),
                })
            })),
            false,
        );

        let mut verifier = Verifier::new(configuration).unwrap();
        let result = verifier.verify().unwrap();
        assert!(!result.success());
        assert_eq!(
            result.interactions[0].error,
            Some(VerificationError::StateChangeFailed {
                state: "there is an alligator named Mary".into(),
                message: "database unavailable".into(),
            })
        );
        assert!(provider.requests().is_empty());
    }

    #[test]
    fn states_are_torn_down_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let provider = FixedProvider::new(200, r#"{"name": "Mary"}"#);
        let mut configuration = configuration(dir.path(), provider);
        let actions = Arc::new(Mutex::new(Vec::new()));
        let recorded = actions.clone();
        configuration.set_state_handler(
            Arc::new(FnStateHandler::new(move |state, action| {
                recorded.lock().unwrap().push(format!("{} {}", action, state.name));
                Ok(BTreeMap::new())
            })),
            true,
        );

        Verifier::new(configuration).unwrap().verify().unwrap();
        assert_eq!(
            *actions.lock().unwrap(),
            vec![
                "setup there is an alligator named Mary".to_string(),
                "teardown there is an alligator named Mary".to_string(),
            ]
        );
    }

    #[test]
    fn verifiers_run_once() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let mut verifier = Verifier::new(configuration(dir.path(), FixedProvider::new(200, "{}"))).unwrap();
        verifier.verify().unwrap();
        assert!(matches!(verifier.verify(), Err(Error::InvalidState(_))));
        assert!(verifier.configuration_mut().is_err());
    }

    #[test]
    fn publishing_without_a_version_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let provider = FixedProvider::new(200, "{}");
        let mut configuration = configuration(dir.path(), provider.clone());
        configuration.set_publish_options(PublishOptions::default());

        let mut verifier = Verifier::new(configuration).unwrap();
        assert!(matches!(verifier.verify(), Err(Error::Configuration(_))));
        assert_eq!(verifier.state(), VerifierState::Configured);
        assert!(provider.requests().is_empty());
    }

    #[test]
    fn missing_sources_are_missing_arguments() {
        let mut provider = ProviderInfo::new("Alligator Service");
        provider.add_transport(ProviderTransport::new("http").with_port(Some(8080)));
        let mut verifier = Verifier::new(VerifierConfiguration::new(provider)).unwrap();
        assert_eq!(verifier.execute(), ExitCode::NullArgument);
    }

    #[test]
    fn unresolvable_providers_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let mut configuration = configuration(dir.path(), FixedProvider::new(200, "{}"));
        configuration.provider_mut().set_host("provider.invalid");
        let mut verifier = Verifier::new(configuration).unwrap();
        assert!(matches!(verifier.verify(), Err(Error::Network(_))));
    }

    #[test]
    fn unreadable_sources_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let mut configuration = configuration(dir.path(), FixedProvider::new(200, r#"{"name": "Mary"}"#));
        configuration.add_source(PactSource::File(dir.path().join("missing.json")));
        let mut verifier = Verifier::new(configuration).unwrap();
        let result = verifier.verify().unwrap();
        assert_eq!(result.interactions.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(!result.success());
    }

    #[test]
    fn filters_and_empty_pacts() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let mut configuration = configuration(dir.path(), FixedProvider::new(200, r#"{"name": "Mary"}"#));
        configuration.set_filter(FilterInfo::new(Some("Tom"), None, false).unwrap());
        configuration.set_error_on_empty_pact(true);
        let mut verifier = Verifier::new(configuration).unwrap();
        let result = verifier.verify().unwrap();
        assert!(result.interactions.is_empty());
        assert!(!result.success());
    }

    #[test]
    fn request_filters_rewrite_requests() {
        let dir = tempfile::tempdir().unwrap();
        write_alligator_pact(dir.path());
        let provider = FixedProvider::new(200, r#"{"name": "Mary"}"#);
        let mut configuration = configuration(dir.path(), provider.clone());
        configuration.add_request_filters(|filters| {
            filters
                .remove_headers(vec!["accept"])
                .add_header("X-Api-Key", "secret")
        });
        Verifier::new(configuration).unwrap().verify().unwrap();

        let request = &provider.requests()[0].1;
        assert!(!request.has_header("accept"));
        assert_eq!(request.lookup_header("x-api-key").unwrap()[0], "secret");
    }

    #[test]
    fn message_interactions_use_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        let mut pact = Pact::new("Alligator Web", "Alligator Service", PactSpecification::V3);
        let mut message = AsyncMessage::new("an alligator created event");
        message.contents.contents = OptionalBody::present(r#"{"name": "Mary"}"#, Some(ContentType::json()));
        pact.interactions.push(Interaction::AsyncMessage(message));
        pactfile::write_pact_file(dir.path().join("events.json"), &pact, PactSpecification::V3, true).unwrap();

        let mut provider = ProviderInfo::new("Alligator Service");
        provider.set_host("127.0.0.1");
        let mut configuration = VerifierConfiguration::new(provider);
        configuration.add_source(PactSource::Dir(dir.path().to_path_buf()));
        let mut producers = MessageProducers::new();
        producers.add_json("an alligator created event", &json!({"name": "Tom"}), BTreeMap::new());
        configuration.set_message_handler(Arc::new(producers));

        let mut verifier = Verifier::new(configuration).unwrap();
        let result = verifier.verify().unwrap();
        assert!(!result.success());
        assert!(matches!(result.mismatches()[0], Mismatch::BodyMismatch { .. }));
    }

    fn id_from_state() -> Arc<FnStateHandler> {
        Arc::new(FnStateHandler::new(|_, _| {
            let mut values = BTreeMap::new();
            values.insert("id".to_string(), json!(42));
            Ok(values)
        }))
    }

    #[test]
    fn provider_state_values_replace_expected_examples() {
        let dir = tempfile::tempdir().unwrap();
        let mut pact = Pact::new("Alligator Web", "Alligator Service", PactSpecification::V3);
        let handle = pact.upon_receiving("a request for a new alligator").unwrap();
        pact.interaction_mut(handle)
            .unwrap()
            .given("an alligator was created")
            .with_request("GET", "/alligators/latest")
            .unwrap()
            .will_respond_with(200)
            .unwrap()
            .with_body(InteractionPart::Response, Some("application/json"), r#"{"id": 100}"#)
            .unwrap()
            .with_generators(
                InteractionPart::Response,
                r#"{"body": {"$.id": {"type": "ProviderState", "expression": "${id}", "dataType": "INTEGER"}}}"#,
            )
            .unwrap();
        pactfile::write_pact_file(dir.path().join("latest.json"), &pact, PactSpecification::V3, true).unwrap();

        let mut generated = configuration(dir.path(), FixedProvider::new(200, r#"{"id": 42}"#));
        generated.set_state_handler(id_from_state(), false);
        let mut verifier = Verifier::new(generated).unwrap();
        let result = verifier.verify().unwrap();
        assert!(result.success(), "{:?}", result.mismatches());

        let mut example = configuration(dir.path(), FixedProvider::new(200, r#"{"id": 100}"#));
        example.set_state_handler(id_from_state(), false);
        let mut verifier = Verifier::new(example).unwrap();
        let result = verifier.verify().unwrap();
        let mismatches = result.mismatches();
        assert_eq!(mismatches.len(), 1);
        match mismatches[0] {
            Mismatch::BodyMismatch { path, expected, .. } => {
                assert_eq!(path, "$.id");
                assert_eq!(expected, &Some(json!(42)));
            }
            other => panic!("unexpected mismatch {:?}", other),
        }
    }

    #[test]
    fn provider_state_values_replace_expected_message_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut pact = Pact::new("Alligator Web", "Alligator Service", PactSpecification::V3);
        let mut message = AsyncMessage::new("an alligator created event");
        message.provider_states.push(ProviderState::new("an alligator was created"));
        message.contents.contents = OptionalBody::present(r#"{"id": 100}"#, Some(ContentType::json()));
        message.contents.generators.add_generator(
            Category::Body,
            DocPath::new("$.id").unwrap(),
            Generator::ProviderStateGenerator("${id}".into(), Some(DataType::Integer)),
        );
        pact.interactions.push(Interaction::AsyncMessage(message));
        pactfile::write_pact_file(dir.path().join("events.json"), &pact, PactSpecification::V3, true).unwrap();

        let mut provider = ProviderInfo::new("Alligator Service");
        provider.set_host("127.0.0.1");
        let mut configuration = VerifierConfiguration::new(provider);
        configuration.add_source(PactSource::Dir(dir.path().to_path_buf()));
        configuration.set_state_handler(id_from_state(), false);
        let mut producers = MessageProducers::new();
        producers.add_json("an alligator created event", &json!({"id": 42}), BTreeMap::new());
        configuration.set_message_handler(Arc::new(producers));

        let mut verifier = Verifier::new(configuration).unwrap();
        let result = verifier.verify().unwrap();
        assert!(result.success(), "{:?}", result.mismatches());
    }
}
