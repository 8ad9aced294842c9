use crate::fixtures::{alligator_pact, provider_pact, CONSUMER, PROVIDER};
use pact_engine::{
    matching::Mismatch,
    pactfile,
    verifier::{InteractionStatus, VerificationError},
    ExitCode, InteractionPart, MockServer, MockServerConfiguration, Pact, PactSource, PactSpecification,
    ProviderInfo, ProviderTransport, Verifier, VerifierConfiguration,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_pact(dir: &TempDir, pact: &Pact) -> PathBuf {
    let path = dir.path().join(pact.default_file_name());
    pactfile::write_pact_file(&path, pact, pact.specification, true).unwrap();
    path
}

fn provider_double(mut pact: Pact) -> MockServer {
    MockServer::start(&mut pact, &MockServerConfiguration::new()).unwrap()
}

fn configuration(provider: &MockServer, pact_file: &Path) -> VerifierConfiguration {
    let mut info = ProviderInfo::new(PROVIDER);
    info.set_host("127.0.0.1");
    info.add_transport(ProviderTransport::new("http").with_port(Some(provider.port())));
    let mut configuration = VerifierConfiguration::new(info);
    configuration.add_source(PactSource::File(pact_file.to_path_buf()));
    configuration
}

fn version_pact() -> Pact {
    let mut pact = Pact::new(CONSUMER, PROVIDER, PactSpecification::V3);
    let handle = pact.upon_receiving("a request for the version").unwrap();
    pact.interaction_mut(handle)
        .unwrap()
        .with_request("GET", "/version")
        .unwrap()
        .will_respond_with(200)
        .unwrap()
        .with_body(
            InteractionPart::Response,
            Some("application/json"),
            r#"{"version": {"pact:matcher:type": "regex", "regex": "\\d+\\.\\d+\\.\\d+", "value": "1.0.0"}}"#,
        )
        .unwrap();
    pact
}

#[test]
fn matching_providers_pass() {
    let dir = tempfile::tempdir().unwrap();
    let pact_file = write_pact(&dir, &alligator_pact());
    let mut provider = provider_double(provider_pact("GET", "/alligators/Mary", 200, r#"{"name":"Mary"}"#));

    let mut verifier = Verifier::new(configuration(&provider, &pact_file)).unwrap();
    let result = verifier.verify().unwrap();
    assert!(result.success(), "{}", result.output());
    assert_eq!(result.interactions.len(), 1);
    assert_eq!(result.interactions[0].status(), InteractionStatus::Success);
    assert_eq!(
        result.interactions[0].provider_states,
        vec!["there is an alligator named Mary".to_string()]
    );

    provider.stop().unwrap();
    assert!(provider.matched().unwrap());
}

#[test]
fn body_differences_are_reported_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let pact_file = write_pact(&dir, &alligator_pact());
    let provider = provider_double(provider_pact("GET", "/alligators/Mary", 200, r#"{"name":"Tom"}"#));

    let mut verifier = Verifier::new(configuration(&provider, &pact_file)).unwrap();
    let result = verifier.verify().unwrap();
    assert!(!result.success());
    assert_eq!(result.exit_code(), ExitCode::Failure);

    let mismatches = result.mismatches();
    assert_eq!(mismatches.len(), 1);
    match mismatches[0] {
        Mismatch::BodyMismatch { path, expected, actual, .. } => {
            assert_eq!(path, "$.name");
            assert_eq!(expected, &Some(json!("Mary")));
            assert_eq!(actual, &Some(json!("Tom")));
        }
        other => panic!("Unexpected mismatch {:?}", other),
    }
    assert!(verifier.output().contains("There were 1 pact failures"));
}

#[test]
fn status_differences_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let pact_file = write_pact(&dir, &alligator_pact());
    let provider = provider_double(provider_pact("GET", "/alligators/Mary", 404, r#"{"name":"Mary"}"#));

    let mut verifier = Verifier::new(configuration(&provider, &pact_file)).unwrap();
    let result = verifier.verify().unwrap();
    let mismatches = result.mismatches();
    assert_eq!(mismatches.len(), 1);
    assert!(matches!(
        mismatches[0],
        Mismatch::StatusMismatch { expected: 200, actual: 404, .. }
    ));
}

#[test]
fn regex_matchers_accept_other_examples() {
    let dir = tempfile::tempdir().unwrap();
    let pact_file = write_pact(&dir, &version_pact());

    let provider = provider_double(provider_pact("GET", "/version", 200, r#"{"version":"1.2.3"}"#));
    let mut verifier = Verifier::new(configuration(&provider, &pact_file)).unwrap();
    assert!(verifier.verify().unwrap().success());

    let provider = provider_double(provider_pact("GET", "/version", 200, r#"{"version":"abc"}"#));
    let mut verifier = Verifier::new(configuration(&provider, &pact_file)).unwrap();
    let result = verifier.verify().unwrap();
    let mismatches = result.mismatches();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].mismatch_type(), "BodyMismatch");
}

#[test]
fn failed_state_changes_skip_the_provider() {
    let dir = tempfile::tempdir().unwrap();
    let pact_file = write_pact(&dir, &alligator_pact());
    let mut provider = provider_double(provider_pact("GET", "/alligators/Mary", 200, r#"{"name":"Mary"}"#));
    let mut state_changes = provider_double(provider_pact("POST", "/_pact/state", 500, r#"{"error":"boom"}"#));

    let mut configuration = configuration(&provider, &pact_file);
    configuration.set_state_change_url(format!("{}/_pact/state", state_changes.url()), false, true);
    let mut verifier = Verifier::new(configuration).unwrap();
    let result = verifier.verify().unwrap();

    assert!(!result.success());
    match &result.interactions[0].error {
        Some(VerificationError::StateChangeFailed { state, .. }) => {
            assert_eq!(state, "there is an alligator named Mary")
        }
        other => panic!("Unexpected error {:?}", other),
    }

    state_changes.stop().unwrap();
    assert!(state_changes.matched().unwrap());
    provider.stop().unwrap();
    assert!(provider.match_results().unwrap().iter().all(|result| !result.matched()));
    assert_eq!(provider.mismatches().unwrap()[0]["type"], "missing-request");
}

#[test]
fn directories_of_pacts_are_verified() {
    let dir = tempfile::tempdir().unwrap();
    write_pact(&dir, &alligator_pact());
    let provider = provider_double(provider_pact("GET", "/alligators/Mary", 200, r#"{"name":"Mary"}"#));

    let mut info = ProviderInfo::new(PROVIDER);
    info.set_host("127.0.0.1");
    info.add_transport(ProviderTransport::new("http").with_port(Some(provider.port())));
    let mut configuration = VerifierConfiguration::new(info);
    configuration.add_source(PactSource::Dir(dir.path().to_path_buf()));

    let mut verifier = Verifier::new(configuration).unwrap();
    assert_eq!(verifier.execute(), ExitCode::Success);
    assert_eq!(verifier.results().unwrap().interactions.len(), 1);
}
