//! Agent runtime: turns a natural-language request into one registered
//! function call.
//!
//! # Flow
//!
//! 1. **Resolution** (`resolver`) - the LLM backend maps the text onto a
//!    catalog entry and proposes raw arguments.
//! 2. **Execution** (`mailfn_core::ExecutionEngine`) - arguments are validated
//!    by the registry and the function runs under a deadline.
//!
//! The LLM is strictly a translator. It never executes anything itself and
//! every name it proposes is checked against the catalog.

pub mod llm;
pub mod resolver;
pub mod runtime;

pub use llm::{build_client, BackendError, OllamaClient, OpenAiClient, ResolverBackend, ScriptedClient};
pub use resolver::{IntentResolver, ProposedCall};
pub use runtime::AgentRuntime;
