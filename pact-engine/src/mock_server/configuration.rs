use super::transport::CustomTransport;
use crate::logging::LogConfig;
use std::{fmt, sync::Arc};

/// How a mock server accepts connections.
#[derive(Clone)]
pub enum Transport {
    Http,
    /// TLS with a certificate generated for the server.
    Https,
    Custom(Arc<dyn CustomTransport>),
}

impl Transport {
    pub fn name(&self) -> &str {
        match self {
            Transport::Http => "http",
            Transport::Https => "https",
            Transport::Custom(transport) => transport.name(),
        }
    }

    pub fn scheme(&self) -> &str {
        match self {
            Transport::Http => "http",
            Transport::Https => "https",
            Transport::Custom(transport) => transport.scheme(),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport({})", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct MockServerConfiguration {
    host: String,
    port: u16,
    transport: Transport,
    cors_preflight: bool,
    log_config: LogConfig,
    custom_transports: Vec<Arc<dyn CustomTransport>>,
}

impl Default for MockServerConfiguration {
    fn default() -> Self {
        MockServerConfiguration {
            host: "127.0.0.1".into(),
            port: 0,
            transport: Transport::Http,
            cors_preflight: false,
            log_config: LogConfig::default(),
            custom_transports: Vec::new(),
        }
    }
}

impl MockServerConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host<S: Into<String>>(&mut self, host: S) {
        self.host = host.into();
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port `0` lets the operating system pick a free port.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_transport(&mut self, transport: Transport) {
        self.transport = transport;
    }

    /// Selects a transport by name: `http`, `https` or the name of a
    /// registered custom transport.
    pub fn set_transport_name(&mut self, name: &str) -> bool {
        let transport = match name.to_lowercase().as_str() {
            "http" => Some(Transport::Http),
            "https" => Some(Transport::Https),
            _ => self
                .custom_transports
                .iter()
                .find(|t| t.name().eq_ignore_ascii_case(name))
                .cloned()
                .map(Transport::Custom),
        };
        match transport {
            Some(transport) => {
                self.transport = transport;
                true
            }
            None => false,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn register_transport(&mut self, transport: Arc<dyn CustomTransport>) {
        self.custom_transports.retain(|t| t.name() != transport.name());
        self.custom_transports.push(transport);
    }

    pub fn set_cors_preflight(&mut self, value: bool) {
        self.cors_preflight = value;
    }

    pub fn cors_preflight(&self) -> bool {
        self.cors_preflight
    }

    pub fn set_log_config(&mut self, log_config: LogConfig) {
        self.log_config = log_config;
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.log_config
    }
}
