use crate::{error::Error, matching::Mismatch};
use serde_json::{json, Value};
use std::fmt::Write;

/// Why an interaction failed verification.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationError {
    /// A provider state could not be set up; the provider was not called.
    StateChangeFailed { state: String, message: String },
    /// The provider could not be reached or did not answer in time.
    RequestFailed(String),
    Mismatches(Vec<Mismatch>),
}

impl VerificationError {
    pub fn error_type(&self) -> &'static str {
        match self {
            VerificationError::StateChangeFailed { .. } => "state-change-failed",
            VerificationError::RequestFailed(_) => "request-failed",
            VerificationError::Mismatches(_) => "mismatches",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            VerificationError::StateChangeFailed { state, message } => json!({
                "type": self.error_type(),
                "state": state,
                "message": message,
            }),
            VerificationError::RequestFailed(message) => json!({
                "type": self.error_type(),
                "message": message,
            }),
            VerificationError::Mismatches(mismatches) => json!({
                "type": self.error_type(),
                "mismatches": mismatches.iter().map(Mismatch::to_json).collect::<Vec<_>>(),
            }),
        }
    }

    fn lines(&self) -> Vec<String> {
        match self {
            VerificationError::StateChangeFailed { state, message } => {
                vec![format!("State change for '{}' failed: {}", state, message)]
            }
            VerificationError::RequestFailed(message) => vec![format!("Request failed: {}", message)],
            VerificationError::Mismatches(mismatches) => mismatches.iter().map(Mismatch::description).collect(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InteractionStatus {
    Success,
    Failure,
    /// Failed, but the interaction is pending so the run still passes.
    Pending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionResult {
    pub consumer: String,
    pub provider: String,
    pub description: String,
    pub interaction_id: String,
    pub provider_states: Vec<String>,
    pub pending: bool,
    pub error: Option<VerificationError>,
    pub duration_ms: u128,
}

impl InteractionResult {
    pub fn status(&self) -> InteractionStatus {
        match (&self.error, self.pending) {
            (None, _) => InteractionStatus::Success,
            (Some(_), true) => InteractionStatus::Pending,
            (Some(_), false) => InteractionStatus::Failure,
        }
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        match &self.error {
            Some(VerificationError::Mismatches(mismatches)) => mismatches,
            _ => &[],
        }
    }

    fn error_json(&self) -> Value {
        json!({
            "interaction": self.description,
            "interactionId": self.interaction_id,
            "consumer": self.consumer,
            "mismatch": self.error.as_ref().map(VerificationError::to_json),
        })
    }
}

/// Process exit codes of a verification run.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExitCode {
    Success = 0,
    Failure = 1,
    NullArgument = 2,
    Panic = 3,
    InvalidArguments = 4,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn for_error(error: &Error) -> ExitCode {
        match error {
            Error::MissingArgument(_) => ExitCode::NullArgument,
            Error::Configuration(_) | Error::RegexError(_) | Error::InvalidState(_) => ExitCode::InvalidArguments,
            _ => ExitCode::Failure,
        }
    }
}

/// Everything a verification run found out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationResult {
    pub interactions: Vec<InteractionResult>,
    /// `(source, message)` for sources that could not be loaded and pacts
    /// that could not be verified at all.
    pub errors: Vec<(String, String)>,
    /// Notices that do not affect the outcome, such as publishing failures.
    pub notices: Vec<String>,
}

impl VerificationResult {
    /// No source errors and no failed interaction that is not pending.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
            && self
                .interactions
                .iter()
                .all(|result| result.status() != InteractionStatus::Failure)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.success() {
            ExitCode::Success
        } else {
            ExitCode::Failure
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &InteractionResult> {
        self.interactions
            .iter()
            .filter(|result| result.status() == InteractionStatus::Failure)
    }

    pub fn pending_failures(&self) -> impl Iterator<Item = &InteractionResult> {
        self.interactions
            .iter()
            .filter(|result| result.status() == InteractionStatus::Pending)
    }

    pub fn mismatches(&self) -> Vec<&Mismatch> {
        self.interactions
            .iter()
            .flat_map(|result| result.mismatches().iter())
            .collect()
    }

    pub fn to_json(&self) -> Value {
        let mut errors: Vec<Value> = self.failures().map(InteractionResult::error_json).collect();
        errors.extend(self.errors.iter().map(|(source, message)| {
            json!({
                "interaction": Value::Null,
                "source": source,
                "mismatch": { "type": "error", "message": message },
            })
        }));
        json!({
            "result": self.success(),
            "errors": errors,
            "pendingErrors": self.pending_failures().map(InteractionResult::error_json).collect::<Vec<_>>(),
            "notices": self.notices,
            "output": self.output_lines(),
        })
    }

    /// Human-readable report, one line per entry.
    pub fn output_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_pact: Option<(&str, &str)> = None;
        for result in &self.interactions {
            let pact = (result.consumer.as_str(), result.provider.as_str());
            if current_pact != Some(pact) {
                lines.push(String::new());
                lines.push(format!("Verifying a pact between {} and {}", pact.0, pact.1));
                current_pact = Some(pact);
            }
            let mut line = String::new();
            let _ = write!(line, "  {}", result.description);
            if result.pending {
                line.push_str(" [PENDING]");
            }
            let _ = write!(line, " ({}ms)", result.duration_ms);
            lines.push(line);
            for state in &result.provider_states {
                lines.push(format!("    Given {}", state));
            }
            lines.push(format!(
                "    {}",
                match result.status() {
                    InteractionStatus::Success => "OK",
                    InteractionStatus::Failure => "FAILED",
                    InteractionStatus::Pending => "FAILED (pending)",
                }
            ));
        }

        for (source, message) in &self.errors {
            lines.push(format!("Error loading or verifying {}: {}", source, message));
        }

        let failures: Vec<&InteractionResult> = self.failures().collect();
        if !failures.is_empty() {
            lines.push(String::new());
            lines.push("Failures:".into());
            for (index, failure) in failures.iter().enumerate() {
                lines.push(String::new());
                lines.push(format!(
                    "{}) Verifying a pact between {} and {} - {}",
                    index + 1,
                    failure.consumer,
                    failure.provider,
                    failure.description
                ));
                if let Some(error) = &failure.error {
                    for (sub, message) in error.lines().iter().enumerate() {
                        lines.push(format!("    {}.{}) {}", index + 1, sub + 1, message));
                    }
                }
            }
            lines.push(String::new());
            lines.push(format!("There were {} pact failures", failures.len()));
        }

        let pending = self.pending_failures().count();
        if pending > 0 {
            lines.push(format!("There were {} pending interaction failures, which do not fail the run", pending));
        }
        lines
    }

    pub fn output(&self) -> String {
        self.output_lines().join("\n")
    }
}
