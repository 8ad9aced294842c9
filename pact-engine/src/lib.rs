//! Contract testing engine.
//!
//! Consumers describe the interactions they expect in a [`Pact`], run their
//! tests against a [`MockServer`] that plays the provider, and write the pact
//! to a file. Providers replay those pacts with a [`Verifier`].

mod error;
pub mod generators;
pub mod logging;
pub mod matching;
pub mod mock_server;
pub mod models;
pub mod pactfile;
pub mod util;
pub mod verifier;

pub use error::{Error, Result};
pub use logging::{LogConfig, LogSink};
pub use mock_server::{MatchResult, MockServer, MockServerConfiguration, MockServerState, Transport};
pub use models::{
    Interaction, InteractionHandle, InteractionKind, InteractionPart, MatchingRule, MessageHandlingFailure, Pact,
    PactSpecification, ProviderState,
};
pub use verifier::{
    ExitCode, PactSource, ProviderInfo, ProviderTransport, VerificationResult, Verifier, VerifierConfiguration,
};
