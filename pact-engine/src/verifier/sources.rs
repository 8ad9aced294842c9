//! Where pacts to verify come from, and loading them.

use super::http_client::HttpClient;
use crate::{
    error::{Error, Result},
    models::{
        http::{parse_query_string, HttpPart},
        ContentType, HttpRequest, OptionalBody, Pact,
    },
    pactfile,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::{env, path::PathBuf};
use tracing::{debug, info, warn};
use url::Url;

pub const BROKER_URL_ENV: &str = "PACT_BROKER_BASE_URL";
pub const BROKER_USERNAME_ENV: &str = "PACT_BROKER_USERNAME";
pub const BROKER_PASSWORD_ENV: &str = "PACT_BROKER_PASSWORD";
pub const BROKER_TOKEN_ENV: &str = "PACT_BROKER_TOKEN";

/// Credentials for fetching pacts over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    User {
        username: String,
        password: Option<String>,
    },
    Token(String),
}

impl HttpAuth {
    pub fn header_value(&self) -> String {
        match self {
            HttpAuth::User { username, password } => {
                let credentials = format!("{}:{}", username, password.as_deref().unwrap_or(""));
                format!("Basic {}", BASE64.encode(credentials))
            }
            HttpAuth::Token(token) => format!("Bearer {}", token),
        }
    }

    /// Credentials from the `PACT_BROKER_*` variables. A token wins over a
    /// username.
    pub fn from_env() -> Option<HttpAuth> {
        let present = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());
        if let Some(token) = present(BROKER_TOKEN_ENV) {
            return Some(HttpAuth::Token(token));
        }
        present(BROKER_USERNAME_ENV).map(|username| HttpAuth::User {
            username,
            password: present(BROKER_PASSWORD_ENV),
        })
    }

    /// Removes credentials embedded in `url`, returning them separately.
    pub(crate) fn split_url(url: &str) -> Result<(String, Option<HttpAuth>)> {
        let mut parsed = Url::parse(url)?;
        if parsed.username().is_empty() {
            return Ok((url.to_string(), None));
        }
        let auth = HttpAuth::User {
            username: parsed.username().to_string(),
            password: parsed.password().map(str::to_string),
        };
        parsed
            .set_username("")
            .and_then(|_| parsed.set_password(None))
            .map_err(|_| Error::configuration(format!("Cannot remove the credentials from {}", url)))?;
        Ok((parsed.to_string(), Some(auth)))
    }
}

/// Pacts fetched from a broker for the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSource {
    pub url: String,
    pub auth: Option<HttpAuth>,
    /// Consumer version selectors, sent as given.
    pub selectors: Vec<Value>,
    pub provider_tags: Vec<String>,
    pub provider_branch: Option<String>,
    pub include_pending: bool,
    pub include_wip_since: Option<String>,
}

impl BrokerSource {
    pub fn new<S: Into<String>>(url: S) -> Self {
        BrokerSource {
            url: url.into(),
            auth: None,
            selectors: Vec::new(),
            provider_tags: Vec::new(),
            provider_branch: None,
            include_pending: false,
            include_wip_since: None,
        }
    }

    /// A broker source from `PACT_BROKER_BASE_URL` and the credential
    /// variables.
    pub fn from_env() -> Result<Self> {
        let url = env::var(BROKER_URL_ENV)
            .map_err(|_| Error::configuration(format!("{} is not set", BROKER_URL_ENV)))?;
        Ok(BrokerSource::new(url))
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn include_pending(mut self) -> Self {
        self.include_pending = true;
        self
    }

    pub fn exclude_pending(mut self) -> Self {
        self.include_pending = false;
        self
    }

    /// Work-in-progress pacts created since `date` (`YYYY-MM-DD`).
    pub fn include_wip_since<S: Into<String>>(mut self, date: S) -> Self {
        self.include_wip_since = Some(date.into());
        self
    }

    pub fn exclude_wip(mut self) -> Self {
        self.include_wip_since = None;
        self
    }

    pub fn provider_tags<S: Into<String>, I: IntoIterator<Item = S>>(mut self, tags: I) -> Self {
        self.provider_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn provider_branch<S: Into<String>>(mut self, branch: S) -> Self {
        self.provider_branch = Some(branch.into());
        self
    }

    pub fn consumer_version_selector(mut self, selector: Value) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Selects the latest pact of each consumer version tag.
    pub fn consumer_tags<S: Into<String>, I: IntoIterator<Item = S>>(mut self, tags: I) -> Self {
        self.selectors.extend(
            tags.into_iter()
                .map(|tag| json!({ "tag": tag.into(), "latest": true })),
        );
        self
    }

    /// Explicit credentials, then the environment.
    pub(crate) fn resolved_auth(&self) -> Option<HttpAuth> {
        self.auth.clone().or_else(HttpAuth::from_env)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PactSource {
    File(PathBuf),
    /// Every `*.json` file of the directory.
    Dir(PathBuf),
    Url {
        url: String,
        auth: Option<HttpAuth>,
    },
    Broker(BrokerSource),
}

impl PactSource {
    pub fn describe(&self) -> String {
        match self {
            PactSource::File(path) => format!("file {}", path.display()),
            PactSource::Dir(path) => format!("directory {}", path.display()),
            PactSource::Url { url, .. } => format!("URL {}", url),
            PactSource::Broker(broker) => format!("broker {}", broker.url),
        }
    }
}

/// A broker a pact came from, for publishing results.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerLink {
    pub base_url: String,
    pub auth: Option<HttpAuth>,
    pub publish_url: String,
}

/// A pact ready for verification.
#[derive(Debug, Clone)]
pub struct LoadedPact {
    pub pact: Pact,
    pub source: String,
    pub brokers: Vec<BrokerLink>,
}

/// Sends a JSON request to `url`, returning the status and the JSON body
/// (`null` when there is none).
pub(crate) async fn send_json(
    client: &(dyn HttpClient + Send + Sync),
    method: &str,
    url: &str,
    auth: Option<&HttpAuth>,
    body: Option<&Value>,
) -> Result<(u16, Value)> {
    let parsed = Url::parse(url)?;
    let base_url = parsed.origin().ascii_serialization();
    let mut request = HttpRequest {
        method: method.to_string(),
        path: parsed.path().to_string(),
        query: parsed.query().and_then(parse_query_string),
        ..HttpRequest::default()
    };
    request.add_header("Accept", "application/hal+json, application/json");
    if let Some(auth) = auth {
        request.add_header("Authorization", auth.header_value());
    }
    if let Some(body) = body {
        request.add_header("Content-Type", "application/json");
        request.body = OptionalBody::Present(body.to_string().into_bytes(), Some(ContentType::json()));
    }

    let response = client.make_request(&base_url, &request).await?;
    let json = response.body.as_json().unwrap_or(Value::Null);
    Ok((response.status, json))
}

async fn fetch_json(
    client: &(dyn HttpClient + Send + Sync),
    url: &str,
    auth: Option<&HttpAuth>,
) -> Result<Value> {
    let (status, json) = send_json(client, "GET", url, auth, None).await?;
    if (200..300).contains(&status) {
        Ok(json)
    } else {
        Err(Error::Network(format!("GET {} returned status {}", url, status)))
    }
}

fn link(document: &Value, name: &str) -> Option<String> {
    document
        .pointer(&format!("/_links/{}/href", name.replace('/', "~1")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn broker_url(base: &str, segments: &[&str]) -> Result<String> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| Error::configuration(format!("{} cannot be a broker URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.to_string())
}

/// Loads every pact of `source`.
pub(crate) async fn load_source(
    source: &PactSource,
    provider: &str,
    client: &(dyn HttpClient + Send + Sync),
) -> Result<Vec<LoadedPact>> {
    let described = source.describe();
    debug!("Loading pacts from {}", described);
    let local = |pact: Pact| LoadedPact {
        pact,
        source: described.clone(),
        brokers: Vec::new(),
    };

    match source {
        PactSource::File(path) => Ok(vec![local(pactfile::read_pact_file(path)?)]),
        PactSource::Dir(path) => Ok(pactfile::load_pact_directory(path)?
            .into_iter()
            .map(|(_, pact)| local(pact))
            .collect()),
        PactSource::Url { url, auth } => {
            let document = fetch_json(client, url, auth.as_ref()).await?;
            Ok(vec![local(pactfile::decode(&document)?)])
        }
        PactSource::Broker(broker) => load_from_broker(broker, provider, client).await,
    }
}

async fn load_from_broker(
    broker: &BrokerSource,
    provider: &str,
    client: &(dyn HttpClient + Send + Sync),
) -> Result<Vec<LoadedPact>> {
    let auth = broker.resolved_auth();
    let for_verification = broker_url(&broker.url, &["pacts", "provider", provider, "for-verification"])?;
    let mut body = json!({
        "consumerVersionSelectors": broker.selectors,
        "includePendingStatus": broker.include_pending,
    });
    if !broker.provider_tags.is_empty() {
        body["providerVersionTags"] = json!(broker.provider_tags);
    }
    if let Some(branch) = &broker.provider_branch {
        body["providerVersionBranch"] = json!(branch);
    }
    if let Some(since) = &broker.include_wip_since {
        body["includeWipPactsSince"] = json!(since);
    }

    // (href, pending)
    let (status, response) = send_json(client, "POST", &for_verification, auth.as_ref(), Some(&body)).await?;
    let pacts: Vec<(String, bool)> = match status {
        200..=299 => response
            .pointer("/_embedded/pacts")
            .and_then(Value::as_array)
            .map(|pacts| {
                pacts
                    .iter()
                    .filter_map(|pact| {
                        let pending = pact
                            .pointer("/verificationProperties/pending")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        link(pact, "self").map(|href| (href, pending))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        404 => {
            warn!("The broker at {} does not support selectors, fetching the latest pacts", broker.url);
            let latest = broker_url(&broker.url, &["pacts", "provider", provider, "latest"])?;
            fetch_json(client, &latest, auth.as_ref())
                .await?
                .pointer("/_links/pb:pacts")
                .and_then(Value::as_array)
                .map(|links| {
                    links
                        .iter()
                        .filter_map(|link| link.get("href").and_then(Value::as_str))
                        .map(|href| (href.to_string(), false))
                        .collect()
                })
                .unwrap_or_default()
        }
        _ => {
            return Err(Error::Network(format!(
                "POST {} returned status {}",
                for_verification, status
            )))
        }
    };
    info!("The broker at {} returned {} pact(s) for {}", broker.url, pacts.len(), provider);

    let mut loaded = Vec::new();
    for (href, pending) in pacts {
        let document = fetch_json(client, &href, auth.as_ref()).await?;
        let mut pact = pactfile::decode(&document)?;
        if pending {
            for interaction in pact.interactions.iter_mut() {
                interaction.set_pending(true);
            }
        }
        let brokers = link(&document, "pb:publish-verification-results")
            .map(|publish_url| BrokerLink {
                base_url: broker.url.clone(),
                auth: auth.clone(),
                publish_url,
            })
            .into_iter()
            .collect();
        loaded.push(LoadedPact {
            pact,
            source: format!("broker {}", href),
            brokers,
        });
    }
    Ok(loaded)
}

/// Merges pacts between the same consumer and provider. Later sources win
/// for interactions with the same description.
pub(crate) fn merge_loaded(pacts: Vec<LoadedPact>) -> Result<Vec<LoadedPact>> {
    let mut merged: Vec<LoadedPact> = Vec::new();
    for loaded in pacts {
        let existing = merged.iter_mut().find(|existing| {
            existing.pact.consumer == loaded.pact.consumer && existing.pact.provider == loaded.pact.provider
        });
        match existing {
            Some(existing) => {
                debug!(
                    "Merging pact from {} into the pact between {} and {}",
                    loaded.source, existing.pact.consumer, existing.pact.provider
                );
                existing.pact = pactfile::merge_pacts(&existing.pact, &loaded.pact)?;
                existing.source = format!("{}, {}", existing.source, loaded.source);
                existing.brokers.extend(loaded.brokers);
            }
            None => merged.push(loaded),
        }
    }
    Ok(merged)
}
