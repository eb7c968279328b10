//! Natural-language command engine for Tasklane.
//!
//! Turns a free-text command into structured task-domain actions, decides
//! whether to run them, suggest them or ask for clarification, and records
//! outcome telemetry.

pub mod confirmation;
pub mod date;
pub mod engine;
pub mod error;
pub mod executor;
pub mod extract;
pub mod policy;
pub mod prompt;
pub mod provider;
pub mod telemetry;
pub mod text;
pub mod types;

pub use confirmation::{ConfirmationGate, PendingSuggestion};
pub use engine::{CommandEngine, ConfirmationResponse};
pub use error::{
    ChainError, EngineError, ExecutionError, FallbackReason, InvalidTransition, ProviderError,
    ValidationError,
};
pub use executor::{ActionExecutor, InMemoryWorkspace};
pub use extract::{parse, ParseOutcome, ResponseParser};
pub use policy::{CommandPhase, Decision, DecisionPolicy, DecisionReason};
pub use provider::{CompletionProvider, HttpProvider, Prompt, ProviderChain, ScriptedProvider};
pub use telemetry::{Telemetry, TelemetrySnapshot};
pub use types::{
    Action, ActionBody, ActionResult, CallerHandle, CommandOutcome, CommandResponse,
    EntityPayload, ExecutionErrorKind, ExecutionOutcome, KnownEntity, ParseQuality, UserContext,
};
