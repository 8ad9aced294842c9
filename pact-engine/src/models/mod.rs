//! The contract model: pacts, interactions, bodies, provider states, matching
//! rules and generators.

pub mod body;
pub mod content_type;
pub mod generators;
pub mod http;
pub mod integration_json;
pub mod interaction;
pub mod matchingrules;
pub mod message;
pub mod pact;
pub mod path_exp;
pub mod provider_state;

pub use body::OptionalBody;
pub use content_type::ContentType;
pub use generators::{Generator, GeneratorCategory, Generators};
pub use http::{HttpInteraction, HttpRequest, HttpResponse};
pub use interaction::{Comments, Interaction, InteractionKind};
pub use matchingrules::{MatchingRule, MatchingRuleCategory, MatchingRules, RuleList, RuleLogic};
pub use message::{AsyncMessage, MessageContents, SyncMessage};
pub use pact::{InteractionBuilder, InteractionHandle, InteractionPart, MessageHandlingFailure, Pact};
pub use path_exp::{DocPath, PathToken};
pub use provider_state::ProviderState;

use crate::error::Error;
use std::{fmt::Display, str::FromStr};

/// Versions of the pact specification a pact file can be written in.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PactSpecification {
    V1,
    V1_1,
    V2,
    V3,
    V4,
}

impl PactSpecification {
    pub fn version_str(&self) -> &'static str {
        match self {
            PactSpecification::V1 => "1.0.0",
            PactSpecification::V1_1 => "1.1.0",
            PactSpecification::V2 => "2.0.0",
            PactSpecification::V3 => "3.0.0",
            PactSpecification::V4 => "4.0",
        }
    }

    /// Whether interactions other than HTTP ones can be represented.
    pub fn supports_messages(&self) -> bool {
        *self >= PactSpecification::V3
    }
}

impl Default for PactSpecification {
    fn default() -> Self {
        PactSpecification::V3
    }
}

impl Display for PactSpecification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PactSpecification::V1 => write!(f, "V1"),
            PactSpecification::V1_1 => write!(f, "V1.1"),
            PactSpecification::V2 => write!(f, "V2"),
            PactSpecification::V3 => write!(f, "V3"),
            PactSpecification::V4 => write!(f, "V4"),
        }
    }
}

impl FromStr for PactSpecification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(['v', 'V']);
        let mut parts = trimmed.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| Error::parse(format!("'{}' is not a valid specification version", s)))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| Error::parse(format!("'{}' is not a valid specification version", s)))?,
            None => 0,
        };

        match (major, minor) {
            (1, 0) => Ok(PactSpecification::V1),
            (1, 1) => Ok(PactSpecification::V1_1),
            (2, _) => Ok(PactSpecification::V2),
            (3, _) => Ok(PactSpecification::V3),
            (4, _) => Ok(PactSpecification::V4),
            _ => Err(Error::UnsupportedVersion(s.to_string())),
        }
    }
}
