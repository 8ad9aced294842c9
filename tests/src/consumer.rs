use crate::fixtures::alligator_pact;
use hyper::{body, Body, Client, Request};
use pact_engine::{pactfile, MockServer, MockServerConfiguration};
use serde_json::{json, Value};
use std::fs;

#[tokio::test]
async fn alligator_requests_are_served_and_matched() {
    let mut pact = alligator_pact();
    let mut mock_server = MockServer::start(&mut pact, &MockServerConfiguration::new()).unwrap();

    let request = Request::get(format!("{}/alligators/Mary", mock_server.url()))
        .header("Accept", "application/json")
        .header("Connection", "close")
        .body(Body::empty())
        .unwrap();
    let response = Client::new().request(request).await.unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("application/json"));
    let bytes = body::to_bytes(response.into_body()).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"name": "Mary"}));

    mock_server.stop().unwrap();
    assert!(mock_server.matched().unwrap());
    assert_eq!(mock_server.mismatches().unwrap(), json!([]));
}

#[tokio::test]
async fn unexpected_requests_are_reported() {
    let mut pact = alligator_pact();
    let mut mock_server = MockServer::start(&mut pact, &MockServerConfiguration::new()).unwrap();

    let request = Request::get(format!("{}/alligators/Tom", mock_server.url()))
        .header("Connection", "close")
        .body(Body::empty())
        .unwrap();
    let response = Client::new().request(request).await.unwrap();
    assert_eq!(response.status(), 500);

    mock_server.stop().unwrap();
    assert!(!mock_server.matched().unwrap());
    let types: Vec<Value> = mock_server
        .mismatches()
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|mismatch| mismatch["type"].clone())
        .collect();
    assert_eq!(types, vec![json!("request-not-found"), json!("missing-request")]);
}

#[test]
fn servers_without_requests_miss_every_interaction() {
    let mut pact = alligator_pact();
    let mut mock_server = MockServer::start(&mut pact, &MockServerConfiguration::new()).unwrap();
    mock_server.stop().unwrap();

    assert!(!mock_server.matched().unwrap());
    let mismatches = mock_server.mismatches().unwrap();
    assert_eq!(mismatches.as_array().unwrap().len(), 1);
    assert_eq!(mismatches[0]["type"], "missing-request");
    assert_eq!(mismatches[0]["request"]["path"], "/alligators/Mary");
}

#[test]
fn pact_files_are_written_after_the_server_stops() {
    let dir = tempfile::tempdir().unwrap();
    let mut pact = alligator_pact();
    let mut mock_server = MockServer::start(&mut pact, &MockServerConfiguration::new()).unwrap();
    assert!(mock_server.write_pact_file(dir.path(), true).is_err());
    mock_server.stop().unwrap();

    let path = mock_server.write_pact_file(dir.path(), true).unwrap();
    assert_eq!(path.file_name().unwrap(), "Alligator Web-Alligator Service.json");
    let first = fs::read(&path).unwrap();
    mock_server.write_pact_file(dir.path(), true).unwrap();
    assert_eq!(first, fs::read(&path).unwrap());

    let written = pactfile::read_pact_file(&path).unwrap();
    assert_eq!(written.consumer, "Alligator Web");
    assert_eq!(written.interactions.len(), 1);
    assert_eq!(written.interactions[0].description(), "a request for an alligator");
}

#[test]
fn started_pacts_are_locked() {
    let mut pact = alligator_pact();
    let _mock_server = MockServer::start(&mut pact, &MockServerConfiguration::new()).unwrap();
    assert!(pact.is_locked());
    assert!(pact.upon_receiving("a request for Tom").is_err());
}
