use thiserror::Error;

use crate::domain::function::ParameterKind;

/// Registration-time failures. These surface to operators at startup and
/// never reach a requester.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("function `{0}` is already registered")]
    DuplicateName(String),
    #[error("function `{name}` belongs to module `{module}` which is not in the allowed module list")]
    ModuleNotAllowed { name: String, module: String },
    #[error("invalid definition for function `{name}`: {reason}")]
    InvalidDefinition { name: String, reason: String },
}

/// Why a resolved argument mapping was rejected before execution.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("function `{0}` is not registered")]
    UnknownFunction(String),
    #[error("missing required parameter `{parameter}`")]
    MissingParameter { parameter: String },
    #[error("parameter `{parameter}` expects a {expected} but got {found}")]
    TypeMismatch { parameter: String, expected: ParameterKind, found: String },
    #[error("unknown parameter `{parameter}`")]
    UnknownParameter { parameter: String },
}

/// Error raised by a registered function body. Only the message is kept.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct FunctionError {
    pub message: String,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn invalid_input(parameter: &str, detail: impl std::fmt::Display) -> Self {
        Self::new(format!("invalid value for `{parameter}`: {detail}"))
    }
}
