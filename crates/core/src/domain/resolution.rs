use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionFailureReason {
    BackendUnavailable,
    BackendTimeout,
    MalformedResponse,
    UnknownFunction,
    NoMatch,
    EmptyRequest,
}

impl ResolutionFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackendUnavailable => "backend_unavailable",
            Self::BackendTimeout => "backend_timeout",
            Self::MalformedResponse => "malformed_response",
            Self::UnknownFunction => "unknown_function",
            Self::NoMatch => "no_match",
            Self::EmptyRequest => "empty_request",
        }
    }

    /// Short message safe to show the person who sent the request.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BackendUnavailable => {
                "The assistant that interprets requests is unavailable right now. Please try again later."
            }
            Self::BackendTimeout => {
                "The assistant took too long to interpret the request. Please try again later."
            }
            Self::MalformedResponse => {
                "The request could not be interpreted reliably. Please rephrase it and try again."
            }
            Self::UnknownFunction => {
                "The request matched an operation that is not available. Please rephrase it."
            }
            Self::NoMatch => "No available operation matches the request.",
            Self::EmptyRequest => "The request was empty. Please include a question.",
        }
    }
}

impl fmt::Display for ResolutionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub reason: ResolutionFailureReason,
    pub detail: String,
}

/// Outcome of mapping one request onto the catalog. Arguments are raw and
/// untrusted until the registry validates them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResolution {
    pub matched: bool,
    pub function_name: Option<String>,
    pub arguments: Map<String, Value>,
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
    pub failure: Option<ResolutionFailure>,
}

impl IntentResolution {
    pub fn matched(function_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            matched: true,
            function_name: Some(function_name.into()),
            arguments,
            confidence: None,
            rationale: None,
            failure: None,
        }
    }

    pub fn unmatched(reason: ResolutionFailureReason, detail: impl Into<String>) -> Self {
        Self {
            matched: false,
            function_name: None,
            arguments: Map::new(),
            confidence: None,
            rationale: None,
            failure: Some(ResolutionFailure { reason, detail: detail.into() }),
        }
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_rationale(mut self, rationale: Option<String>) -> Self {
        self.rationale = rationale;
        self
    }

    /// Keep the name the backend proposed on an unmatched resolution so the
    /// execution record shows what was rejected.
    pub fn with_proposed_function(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = Some(function_name.into());
        self
    }

    pub fn failure_reason(&self) -> Option<ResolutionFailureReason> {
        self.failure.as_ref().map(|failure| failure.reason)
    }
}
