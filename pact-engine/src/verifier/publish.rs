//! Publishing verification results back to the broker a pact came from.

use super::{
    configuration::PublishOptions,
    http_client::HttpClient,
    results::InteractionResult,
    sources::{send_json, BrokerLink},
};
use crate::error::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

/// The document posted to a pact's `pb:publish-verification-results` link.
pub(crate) fn verification_document(
    options: &PublishOptions,
    results: &[&InteractionResult],
) -> Result<Value> {
    let version = options.version()?;
    let test_results: Vec<Value> = results
        .iter()
        .map(|result| {
            let mut entry = json!({
                "interactionId": result.interaction_id,
                "success": result.error.is_none(),
            });
            if let Some(error) = &result.error {
                entry["mismatches"] = error.to_json();
            }
            entry
        })
        .collect();

    let mut document = json!({
        "providerApplicationVersion": version,
        "success": results.iter().all(|result| result.error.is_none() || result.pending),
        "testResults": test_results,
        "verifiedBy": {
            "implementation": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    if let Some(build_url) = &options.build_url {
        document["buildUrl"] = json!(build_url);
    }
    Ok(document)
}

fn pacticipant_url(base: &str, provider: &str, segments: &[&str]) -> Result<String> {
    let mut url = Url::parse(base)?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::configuration(format!("{} cannot be a broker URL", base)))?;
        path.pop_if_empty().extend(["pacticipants", provider]);
        path.extend(segments);
    }
    Ok(url.to_string())
}

async fn send(
    client: &(dyn HttpClient + Send + Sync),
    method: &str,
    url: &str,
    broker: &BrokerLink,
    body: &Value,
) -> Result<()> {
    debug!("{} {}", method, url);
    let (status, _) = send_json(client, method, url, broker.auth.as_ref(), Some(body)).await?;
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(Error::Network(format!("{} {} returned status {}", method, url, status)))
    }
}

/// Tags and branches the provider version on the broker.
pub(crate) async fn record_provider_version(
    client: &(dyn HttpClient + Send + Sync),
    broker: &BrokerLink,
    provider: &str,
    options: &PublishOptions,
) -> Result<()> {
    let version = options.version()?;
    for tag in &options.provider_tags {
        let url = pacticipant_url(&broker.base_url, provider, &["versions", version, "tags", tag])?;
        send(client, "PUT", &url, broker, &json!({})).await?;
    }
    if let Some(branch) = &options.provider_branch {
        let url = pacticipant_url(&broker.base_url, provider, &["branches", branch, "versions", version])?;
        send(client, "PUT", &url, broker, &json!({})).await?;
    }
    Ok(())
}

pub(crate) async fn publish_results(
    client: &(dyn HttpClient + Send + Sync),
    broker: &BrokerLink,
    options: &PublishOptions,
    results: &[&InteractionResult],
) -> Result<()> {
    let document = verification_document(options, results)?;
    send(client, "POST", &broker.publish_url, broker, &document).await?;
    info!(
        "Published verification results to {} (success: {})",
        broker.publish_url, document["success"]
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        matching::Mismatch,
        models::{HttpRequest, HttpResponse},
        verifier::results::VerificationError,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingBroker {
        requests: Mutex<Vec<(String, HttpRequest)>>,
    }

    #[async_trait]
    impl HttpClient for RecordingBroker {
        async fn make_request(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests
                .lock()
                .unwrap()
                .push((base_url.to_string(), request.clone()));
            Ok(HttpResponse {
                status: 201,
                ..HttpResponse::default()
            })
        }
    }

    fn interaction_result(error: Option<VerificationError>) -> InteractionResult {
        InteractionResult {
            consumer: "Alligator Web".into(),
            provider: "Alligator Service".into(),
            description: "a request for Mary".into(),
            interaction_id: "a request for Mary".into(),
            provider_states: Vec::new(),
            pending: false,
            error,
            duration_ms: 1,
        }
    }

    fn broker() -> BrokerLink {
        BrokerLink {
            base_url: "http://broker.example.com".into(),
            auth: None,
            publish_url: "http://broker.example.com/pacts/1/verification-results".into(),
        }
    }

    #[test]
    fn documents_describe_each_interaction() {
        let failed = interaction_result(Some(VerificationError::Mismatches(vec![Mismatch::StatusMismatch {
            expected: 200,
            actual: 500,
            mismatch: "expected 200 but was 500".into(),
        }])));
        let options = PublishOptions::new("1.0.0").with_build_url("http://ci.example.com/1");
        let document = verification_document(&options, &[&failed]).unwrap();
        assert_eq!(document["providerApplicationVersion"], "1.0.0");
        assert_eq!(document["success"], false);
        assert_eq!(document["buildUrl"], "http://ci.example.com/1");
        assert_eq!(document["testResults"][0]["success"], false);
        assert_eq!(document["testResults"][0]["mismatches"]["mismatches"][0]["type"], "StatusMismatch");
    }

    #[test]
    fn documents_need_a_version() {
        let passed = interaction_result(None);
        assert!(matches!(
            verification_document(&PublishOptions::default(), &[&passed]),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn provider_versions_are_tagged_and_branched() {
        let client = RecordingBroker::default();
        let options = PublishOptions::new("1.0.0")
            .with_tags(vec!["prod"])
            .with_branch("main");
        record_provider_version(&client, &broker(), "Alligator Service", &options)
            .await
            .unwrap();
        publish_results(&client, &broker(), &options, &[&interaction_result(None)])
            .await
            .unwrap();

        let requests = client.requests.lock().unwrap();
        let paths: Vec<(&str, &str)> = requests
            .iter()
            .map(|(_, request)| (request.method.as_str(), request.path.as_str()))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("PUT", "/pacticipants/Alligator%20Service/versions/1.0.0/tags/prod"),
                ("PUT", "/pacticipants/Alligator%20Service/branches/main/versions/1.0.0"),
                ("POST", "/pacts/1/verification-results"),
            ]
        );
        assert_eq!(requests[2].1.body.as_json().unwrap()["success"], true);
    }
}
