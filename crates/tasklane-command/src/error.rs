//! Error types for the command engine.

use tasklane_core::error::CoreError;
use tasklane_core::{ActionKind, EntityKind};
use uuid::Uuid;

use crate::policy::CommandPhase;
use crate::types::{ExecutionErrorKind, ExecutionOutcome};

/// Why the chain moved from one backend to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    Timeout,
    Auth,
    Protocol,
    Unavailable,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::Timeout => write!(f, "timeout"),
            FallbackReason::Auth => write!(f, "auth"),
            FallbackReason::Protocol => write!(f, "protocol"),
            FallbackReason::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Failure of a single completion backend call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider {provider} timed out after {after_ms} ms")]
    Timeout { provider: String, after_ms: u64 },
    #[error("provider {provider} rejected credentials or quota: {message}")]
    Auth { provider: String, message: String },
    #[error("provider {provider} returned a malformed response: {message}")]
    Protocol { provider: String, message: String },
    #[error("provider {provider} is unavailable: {message}")]
    Unavailable { provider: String, message: String },
    #[error("provider {provider} refused the content: {message}")]
    ContentRejected { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Timeout { provider, .. }
            | ProviderError::Auth { provider, .. }
            | ProviderError::Protocol { provider, .. }
            | ProviderError::Unavailable { provider, .. }
            | ProviderError::ContentRejected { provider, .. } => provider,
        }
    }

    /// Fallback reason for errors the next backend may not repeat.
    ///
    /// Returns `None` for content rejections, which are attributable to the
    /// input itself and must propagate immediately.
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            ProviderError::Timeout { .. } => Some(FallbackReason::Timeout),
            ProviderError::Auth { .. } => Some(FallbackReason::Auth),
            ProviderError::Protocol { .. } => Some(FallbackReason::Protocol),
            ProviderError::Unavailable { .. } => Some(FallbackReason::Unavailable),
            ProviderError::ContentRejected { .. } => None,
        }
    }
}

/// Failure of the whole ordered provider chain.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("no completion providers configured")]
    NoProviders,
    #[error("all {} providers failed; last error: {}", .attempts.len(), last_message(.attempts))]
    AllFailed { attempts: Vec<ProviderError> },
    #[error("command rejected: {0}")]
    Rejected(ProviderError),
}

fn last_message(attempts: &[ProviderError]) -> String {
    attempts
        .last()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Shape mismatch of one extracted action (or bulk item).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("action is not a JSON object")]
    NotAnObject,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("unknown action type: {0}")]
    UnknownActionType(String),
    #[error("{0} actions need a target id or title")]
    MissingTarget(ActionKind),
    #[error("update carries no changes")]
    EmptyUpdate,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("bulk payload has no items")]
    EmptyBulk,
    #[error("none of the {0} bulk items is valid")]
    NoValidBulkItems(usize),
}

/// Failure of one action inside an executor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("{entity} {target} not found")]
    NotFound { entity: EntityKind, target: String },
    #[error("invalid {entity}: {reason}")]
    Validation { entity: EntityKind, reason: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{kind} is not supported for {entity}")]
    Unsupported { kind: ActionKind, entity: EntityKind },
    #[error("internal executor error: {0}")]
    Internal(String),
}

impl ExecutionError {
    pub fn kind(&self) -> ExecutionErrorKind {
        match self {
            ExecutionError::NotFound { .. } => ExecutionErrorKind::NotFound,
            ExecutionError::Validation { .. } => ExecutionErrorKind::Validation,
            ExecutionError::Conflict(_) => ExecutionErrorKind::Conflict,
            ExecutionError::Unsupported { .. } => ExecutionErrorKind::Unsupported,
            ExecutionError::Internal(_) => ExecutionErrorKind::Internal,
        }
    }
}

impl From<ExecutionError> for ExecutionOutcome {
    fn from(err: ExecutionError) -> Self {
        ExecutionOutcome::failed(err.kind(), err.to_string())
    }
}

/// A command tried to move between phases out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid command phase transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: CommandPhase,
    pub to: CommandPhase,
}

/// Command-level failures surfaced to the caller.
///
/// Unparsable replies are not errors: they come back as a `Reject` outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("command cannot be empty")]
    EmptyCommand,
    #[error("command exceeds maximum length of {0} characters")]
    CommandTooLong(usize),
    #[error("completion service unavailable: {0}")]
    ProvidersUnavailable(ChainError),
    #[error("command rejected by provider policy: {0}")]
    CommandRejected(ProviderError),
    #[error("suggestion not found: {0}")]
    SuggestionNotFound(Uuid),
    #[error("suggestion expired: {0}")]
    SuggestionExpired(Uuid),
    #[error("caller disconnected before execution")]
    CallerGone,
    #[error(transparent)]
    Phase(#[from] InvalidTransition),
    #[error("configuration error: {0}")]
    Config(#[from] CoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ChainError> for EngineError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Rejected(inner) => EngineError::CommandRejected(inner),
            other => EngineError::ProvidersUnavailable(other),
        }
    }
}

impl EngineError {
    /// Text suitable for showing to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::EmptyCommand => "Escribe un comando.",
            EngineError::CommandTooLong(_) => "El comando es demasiado largo.",
            EngineError::ProvidersUnavailable(_) => {
                "El servicio no está disponible en este momento. Inténtalo de nuevo más tarde."
            }
            EngineError::CommandRejected(_) => "El comando fue rechazado.",
            EngineError::SuggestionNotFound(_) | EngineError::SuggestionExpired(_) => {
                "La sugerencia ya no está disponible."
            }
            EngineError::CallerGone => "La sesión terminó antes de ejecutar el comando.",
            EngineError::Phase(_) | EngineError::Config(_) | EngineError::Internal(_) => {
                "Error interno."
            }
        }
    }
}
