//! Core of the natural-language function dispatcher: the function registry,
//! the bounded execution history, and the deadline-enforcing execution
//! engine, plus the configuration they are built from.

pub mod config;
pub mod domain;
pub mod errors;
pub mod execution_engine;
pub mod execution_log;
pub mod registry;

pub use domain::function::{
    Arguments, CatalogEntry, FunctionHandler, FunctionMetadata, ParameterKind, ParameterSpec,
    RegisteredFunction,
};
pub use domain::record::{ExecutionOutcome, ExecutionRecord, ExecutionResult};
pub use domain::resolution::{IntentResolution, ResolutionFailure, ResolutionFailureReason};
pub use errors::{ArgumentError, FunctionError, RegistryError};
pub use execution_engine::{
    EngineConfig, ExecutionEngine, InvalidTransition, Invocation, InvocationState,
};
pub use execution_log::{ExecutionLog, ExecutionLogConfig, ExecutionStats};
pub use registry::{ArgumentMode, FunctionRegistry};
