use crate::{
    error::{Error, Result},
    models::{HttpRequest, HttpResponse},
    util,
};
use async_trait::async_trait;
use hyper::{client::HttpConnector, Body, Client};
use hyper_tls::HttpsConnector;
use std::{fmt::Debug, time::Duration};
use tracing::debug;

/// Sends model requests. The verifier talks to providers, state change
/// endpoints and brokers through this trait.
#[async_trait]
pub trait HttpClient: Debug {
    async fn make_request(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct HyperHttpClient {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    timeout: Option<Duration>,
}

impl HyperHttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder().build(HttpsConnector::new()),
            timeout: None,
        }
    }

    /// A client that gives up on requests after `timeout`, optionally
    /// accepting any TLS certificate.
    pub fn with_options(timeout: Option<Duration>, disable_ssl_verification: bool) -> Result<Self> {
        let client = if disable_ssl_verification {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?;
            let mut http = HttpConnector::new();
            http.enforce_http(false);
            Client::builder().build(HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls))))
        } else {
            Client::builder().build(HttpsConnector::new())
        };
        Ok(Self { client, timeout })
    }
}

impl Default for HyperHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn make_request(&self, base_url: &str, request: &HttpRequest) -> Result<HttpResponse> {
        let hyper_request = util::build_request(base_url, request)?;
        debug!("Sending {} {}{}", request.method, base_url, request.path_and_query());

        let exchange = async {
            let response = self.client.request(hyper_request).await?;
            util::read_response(response).await
        };

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| Error::Timeout(timeout.as_millis() as u64))?,
            None => exchange.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{
        service::{make_service_fn, service_fn},
        Response, Server,
    };
    use std::convert::Infallible;

    async fn start_server(delay: Duration) -> String {
        let make_service = make_service_fn(move |_| async move {
            Ok::<_, Infallible>(service_fn(move |_request| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, Infallible>(Response::new(Body::from("pong")))
            }))
        });
        let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_service);
        let url = format!("http://{}", server.local_addr());
        tokio::spawn(server);
        url
    }

    #[tokio::test]
    async fn reads_the_provider_response() {
        let url = start_server(Duration::from_millis(0)).await;
        let client = HyperHttpClient::new();
        let response = client
            .make_request(&url, &HttpRequest::default())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.value_as_string().unwrap(), "pong");
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let url = start_server(Duration::from_millis(500)).await;
        let client = HyperHttpClient::with_options(Some(Duration::from_millis(50)), false).unwrap();
        let result = client.make_request(&url, &HttpRequest::default()).await;
        assert!(matches!(result, Err(Error::Timeout(50))));
    }
}
