use hyper::http;
use std::{io, sync};
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Missing required argument: {0}")]
    MissingArgument(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unsupported pact specification version: {0}")]
    UnsupportedVersion(String),
    #[error("Provider state change failed for '{state}': {message}")]
    StateChange { state: String, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("{0} mismatch(es) found")]
    Mismatch(usize),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("The lock was poisoned")]
    PoisonedLock,
    #[error("The status code is invalid")]
    InvalidStatusCode,
    #[error("Invalid header name")]
    InvalidHeaderName,
    #[error("Invalid header value")]
    InvalidHeaderValue,
    #[error("Invalid body")]
    InvalidBody,
    #[error("Parse URI Error: {0}")]
    ParseUriError(String),
    #[error("TLS error: {0}")]
    TlsError(String),
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    #[error("IoError: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
    #[error("Hyper error: {0}")]
    HyperError(#[from] hyper::Error),
    #[error("Http Error: {0}")]
    HttpError(#[from] http::Error),
}

impl Error {
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Error::Parse(message.into())
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Error::InvalidState(message.into())
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Error::Configuration(message.into())
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Self {
        Error::PoisonedLock
    }
}

impl From<hyper::header::InvalidHeaderName> for Error {
    fn from(_: hyper::header::InvalidHeaderName) -> Self {
        Error::InvalidHeaderName
    }
}

impl From<hyper::header::InvalidHeaderValue> for Error {
    fn from(_: hyper::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeaderValue
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(e: http::uri::InvalidUri) -> Self {
        Error::ParseUriError(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::ParseUriError(e.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::TlsError(e.to_string())
    }
}

impl From<rcgen::Error> for Error {
    fn from(e: rcgen::Error) -> Self {
        Error::TlsError(e.to_string())
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Self {
        Error::TlsError(e.to_string())
    }
}
