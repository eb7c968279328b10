//! Seam between the engine and the task domain services.
//!
//! The engine hands over validated actions one by one and only needs a
//! per-action success or failure back. Bulk actions arrive already expanded
//! into one `create` per valid item.

pub mod memory;

use async_trait::async_trait;

use crate::types::{Action, ExecutionOutcome};

pub use memory::{InMemoryWorkspace, WorkspaceEntry};

/// Applies one validated action to the domain.
///
/// Failures are reported in the returned outcome, never raised, so that a
/// failing action cannot block its siblings.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> ExecutionOutcome;
}
