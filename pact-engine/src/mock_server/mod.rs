//! In-process mock provider for consumer tests.
//!
//! A server moves through `Created -> Bound -> Listening -> Stopped`. It runs
//! on its own thread with a single-threaded tokio runtime, so every request
//! it serves logs through the server's own dispatcher. Matching and the
//! bookkeeping of requested interactions happen under one lock.

mod configuration;
mod match_result;
mod transport;

pub use configuration::{MockServerConfiguration, Transport};
pub use match_result::MatchResult;
pub use transport::{CustomTransport, TlsTransport, TransportStream};

use crate::{
    error::{Error, Result},
    generators::{generate_response, GeneratorContext},
    logging::LogBuffer,
    matching::{match_request, Mismatch},
    models::{HttpRequest, HttpResponse, Interaction, Pact},
    pactfile, util,
};
use futures::stream;
use hyper::{
    header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
    server::accept,
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    io,
    net::{SocketAddr, TcpListener as StdTcpListener},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};
use tokio::{
    net::TcpListener,
    runtime::Builder,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, info, warn, Dispatch};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MockServerState {
    Created,
    Bound,
    Listening,
    Stopped,
}

/// State shared with the connection handlers.
#[derive(Debug)]
struct MatchLog {
    pact: Pact,
    url: String,
    cors_preflight: bool,
    /// Times each interaction was requested, by interaction index.
    requested: Vec<usize>,
    results: Vec<MatchResult>,
}

enum Reply {
    Matched(HttpResponse),
    Preflight,
    Unmatched(Value),
}

impl MatchLog {
    fn new(pact: Pact, url: String, cors_preflight: bool) -> Self {
        let requested = vec![0; pact.interactions.len()];
        MatchLog {
            pact,
            url,
            cors_preflight,
            requested,
            results: Vec::new(),
        }
    }

    fn handle(&mut self, request: HttpRequest) -> Reply {
        let mut partial = None;
        for (index, interaction) in self.pact.interactions.iter().enumerate() {
            let http = match interaction {
                Interaction::Http(http) => http,
                _ => continue,
            };
            let result = match_request(&http.request, &request);
            if result.all_matched() {
                debug!("Request {} {} matched '{}'", request.method, request.path, http.description);
                self.requested[index] += 1;
                self.results.push(MatchResult::RequestMatch {
                    interaction: http.description.clone(),
                    request,
                });
                let context = GeneratorContext::consumer(Some(self.url.clone()));
                return Reply::Matched(generate_response(&http.response, &context));
            }
            if partial.is_none() && result.method_and_path_matched() {
                partial = Some((http.description.clone(), result.mismatches()));
            }
        }

        if self.cors_preflight && request.method == "OPTIONS" {
            debug!("Answering CORS preflight for {}", request.path);
            return Reply::Preflight;
        }

        match partial {
            Some((interaction, mismatches)) => {
                warn!(
                    "Request {} {} did not match '{}': {} mismatch(es)",
                    request.method,
                    request.path,
                    interaction,
                    mismatches.len()
                );
                let body = json!({
                    "error": format!("Request-Mismatch : {} {}", request.method, request.path),
                    "mismatches": mismatches.iter().map(Mismatch::to_json).collect::<Vec<_>>(),
                });
                self.results.push(MatchResult::RequestMismatch {
                    interaction,
                    request,
                    mismatches,
                });
                Reply::Unmatched(body)
            }
            None => {
                warn!("Unexpected request {} {}", request.method, request.path);
                let body = json!({
                    "error": format!("Unexpected-Request : {} {}", request.method, request.path),
                    "request": match_result::request_json(&request),
                });
                self.results.push(MatchResult::RequestNotFound { request });
                Reply::Unmatched(body)
            }
        }
    }

    /// Every result that is not a match, followed by one `missing-request`
    /// per interaction never requested.
    fn mismatches(&self) -> Vec<MatchResult> {
        let mut mismatches: Vec<MatchResult> = self.results.iter().filter(|r| !r.matched()).cloned().collect();
        for (index, interaction) in self.pact.interactions.iter().enumerate() {
            if let Interaction::Http(http) = interaction {
                if self.requested[index] == 0 {
                    mismatches.push(MatchResult::MissingRequest {
                        interaction: http.description.clone(),
                        request: http.request.clone(),
                    });
                }
            }
        }
        mismatches
    }
}

/// Connections that finished their handshake but are not served yet.
const PENDING_CONNECTIONS: usize = 64;

#[derive(Debug)]
pub struct MockServer {
    state: MockServerState,
    match_log: Arc<Mutex<MatchLog>>,
    address: SocketAddr,
    url: String,
    ca_certificate: Option<String>,
    shutdown: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
    logs: Option<LogBuffer>,
    dispatch: Dispatch,
}

impl MockServer {
    /// Binds and starts a server for the HTTP interactions of `pact`. The
    /// pact is locked against further changes.
    pub fn start(pact: &mut Pact, configuration: &MockServerConfiguration) -> Result<MockServer> {
        let (dispatch, logs) = configuration.log_config().dispatch()?;
        let _guard = tracing::dispatcher::set_default(&dispatch);
        let mut state = MockServerState::Created;
        debug!("Mock server for {} -> {} is {:?}", pact.consumer, pact.provider, state);

        let listener = StdTcpListener::bind((configuration.host(), configuration.port()))
            .map_err(|err| {
                Error::Network(format!(
                    "Could not bind {}:{}: {}",
                    configuration.host(),
                    configuration.port(),
                    err
                ))
            })?;
        listener.set_nonblocking(true)?;
        let address = listener.local_addr()?;
        state = MockServerState::Bound;
        debug!("Mock server bound to {}", address);

        let (transport, ca_certificate): (Option<Arc<dyn CustomTransport>>, Option<String>) =
            match configuration.transport() {
                Transport::Http => (None, None),
                Transport::Https => {
                    let tls = TlsTransport::generate(configuration.host())?;
                    let ca_certificate = tls.ca_certificate().to_string();
                    (Some(Arc::new(tls)), Some(ca_certificate))
                }
                Transport::Custom(custom) => (Some(custom.clone()), None),
            };
        let url = format!(
            "{}://{}:{}",
            configuration.transport().scheme(),
            configuration.host(),
            address.port()
        );

        pact.lock();
        let match_log = Arc::new(Mutex::new(MatchLog::new(
            pact.clone(),
            url.clone(),
            configuration.cors_preflight(),
        )));

        let runtime = Builder::new_current_thread().enable_all().build()?;
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let server_log = match_log.clone();
        let server_dispatch = dispatch.clone();
        let join_handle = thread::Builder::new()
            .name(format!("pact-mock-server-{}", address.port()))
            .spawn(move || {
                tracing::dispatcher::with_default(&server_dispatch, || {
                    if let Err(err) = runtime.block_on(serve(listener, transport, server_log, shutdown_receiver)) {
                        error!("Mock server error: {}", err);
                    }
                });
            })?;
        state = MockServerState::Listening;
        info!(
            "Mock server for {} -> {} listening on {} ({} interactions)",
            pact.consumer,
            pact.provider,
            url,
            pact.http_interactions().count()
        );

        Ok(MockServer {
            state,
            match_log,
            address,
            url,
            ca_certificate,
            shutdown: Some(shutdown_sender),
            join_handle: Some(join_handle),
            logs,
            dispatch,
        })
    }

    pub fn state(&self) -> MockServerState {
        self.state
    }

    /// `scheme://host:port`
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// PEM of the CA behind an `https` server.
    pub fn ca_certificate(&self) -> Option<&str> {
        self.ca_certificate.as_deref()
    }

    /// All requests were expected and every interaction was requested.
    pub fn matched(&self) -> Result<bool> {
        Ok(self.match_log.lock()?.mismatches().is_empty())
    }

    pub fn match_results(&self) -> Result<Vec<MatchResult>> {
        let match_log = self.match_log.lock()?;
        let mut results = match_log.results.clone();
        results.extend(
            match_log
                .mismatches()
                .into_iter()
                .filter(|result| matches!(result, MatchResult::MissingRequest { .. })),
        );
        Ok(results)
    }

    /// Mismatches as a JSON array.
    pub fn mismatches(&self) -> Result<Value> {
        let match_log = self.match_log.lock()?;
        Ok(Value::Array(match_log.mismatches().iter().map(MatchResult::to_json).collect()))
    }

    /// Log output of the server's in-memory sink.
    pub fn logs(&self) -> String {
        self.logs.as_ref().map(LogBuffer::contents).unwrap_or_default()
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == MockServerState::Stopped {
            return Ok(());
        }
        let _guard = tracing::dispatcher::set_default(&self.dispatch);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .join()
                .map_err(|_| Error::invalid_state("The mock server thread panicked"))?;
        }
        self.state = MockServerState::Stopped;
        info!("Mock server on {} stopped, matched: {}", self.url, self.matched()?);
        Ok(())
    }

    /// Writes the pact to `<directory>/<consumer>-<provider>.json`. Only a
    /// stopped server can write its pact.
    pub fn write_pact_file<P: AsRef<Path>>(&self, directory: P, overwrite: bool) -> Result<PathBuf> {
        if self.state != MockServerState::Stopped {
            return Err(Error::invalid_state(format!(
                "The mock server on {} must be stopped before writing its pact file",
                self.url
            )));
        }
        let _guard = tracing::dispatcher::set_default(&self.dispatch);
        let match_log = self.match_log.lock()?;
        if !match_log.mismatches().is_empty() {
            warn!("Writing the pact file of a mock server that did not match all requests");
        }
        let pact = &match_log.pact;
        let path = directory.as_ref().join(pact.default_file_name());
        pactfile::write_pact_file(&path, pact, pact.specification, overwrite)?;
        Ok(path)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            let _guard = tracing::dispatcher::set_default(&self.dispatch);
            warn!("Mock server on {} did not shut down cleanly: {}", self.url, err);
        }
    }
}

async fn serve(
    listener: StdTcpListener,
    transport: Option<Arc<dyn CustomTransport>>,
    match_log: Arc<Mutex<MatchLog>>,
    shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::from_std(listener)?;
    let (sender, receiver) = mpsc::channel(PENDING_CONNECTIONS);
    let acceptor = tokio::spawn(accept_connections(listener, transport, sender));

    let incoming = stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|connection| (Ok::<_, io::Error>(connection), receiver))
    });

    let server = Server::builder(accept::from_stream(incoming)).serve(make_service_fn(move |_| {
        let match_log = match_log.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                let match_log = match_log.clone();
                async move { Ok::<_, Infallible>(handle_request(match_log, request).await) }
            }))
        }
    }));

    server
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
        })
        .await?;
    acceptor.abort();
    Ok(())
}

/// Accepts TCP connections. Transport handshakes run on their own tasks so a
/// client that never completes one cannot hold up other connections.
async fn accept_connections(
    listener: TcpListener,
    transport: Option<Arc<dyn CustomTransport>>,
    sender: mpsc::Sender<Box<dyn TransportStream>>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("Failed to accept a connection: {}", err);
                continue;
            }
        };
        match &transport {
            None => {
                if sender.send(Box::new(stream)).await.is_err() {
                    return;
                }
            }
            Some(transport) => {
                let transport = transport.clone();
                let sender = sender.clone();
                tokio::spawn(async move {
                    match transport.accept(stream).await {
                        Ok(connection) => {
                            let _ = sender.send(connection).await;
                        }
                        Err(err) => warn!("Dropping connection from {}: {}", peer, err),
                    }
                });
            }
        }
    }
}

async fn handle_request(match_log: Arc<Mutex<MatchLog>>, request: Request<Body>) -> Response<Body> {
    let request = match util::read_request(request).await {
        Ok(request) => request,
        Err(err) => return json_response(StatusCode::BAD_REQUEST, json!({ "error": err.to_string() })),
    };
    debug!("Received {} {}", request.method, request.path_and_query());

    let reply = match match_log.lock() {
        Ok(mut match_log) => match_log.handle(request),
        Err(_) => Reply::Unmatched(json!({ "error": Error::PoisonedLock.to_string() })),
    };

    match reply {
        Reply::Matched(response) => match util::build_response(&response) {
            Ok(response) => response,
            Err(err) => {
                error!("Could not build the expected response: {}", err);
                json_response(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": err.to_string() }))
            }
        },
        Reply::Preflight => preflight_response(),
        Reply::Unmatched(body) => json_response(StatusCode::INTERNAL_SERVER_ERROR, body),
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
    response
}

fn preflight_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, POST, PUT, DELETE, CONNECT, OPTIONS, TRACE, PATCH"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}
