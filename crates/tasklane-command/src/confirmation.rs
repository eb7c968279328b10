//! Confirmation flow for suggested actions.
//!
//! Commands the policy classifies as `Suggest` are parked here until the
//! user approves or dismisses them. Parked suggestions expire after a TTL;
//! when the queue is full the oldest one is evicted.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tasklane_core::config::EngineConfig;
use tracing::debug;
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::Action;

/// An action set awaiting user confirmation.
#[derive(Debug, Clone)]
pub struct PendingSuggestion {
    pub id: Uuid,
    /// The command the actions were derived from.
    pub command: String,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    parked_at: Instant,
}

impl PendingSuggestion {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.parked_at.elapsed() >= ttl
    }
}

/// Gate that holds suggested action sets until confirmed.
pub struct ConfirmationGate {
    ttl: Duration,
    max_pending: usize,
    pending: Mutex<VecDeque<PendingSuggestion>>,
}

impl ConfirmationGate {
    pub fn new(ttl: Duration, max_pending: usize) -> Self {
        Self {
            ttl,
            max_pending: max_pending.max(1),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Duration::from_secs(config.suggestion_ttl_secs),
            config.max_pending_suggestions,
        )
    }

    /// Park an action set and return the id the user confirms it with.
    /// Expired suggestions are dropped first.
    pub fn park(&self, command: &str, actions: Vec<Action>) -> Uuid {
        let id = Uuid::new_v4();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let purged = purge(&mut pending, self.ttl);
        if purged > 0 {
            debug!(purged, "Dropped expired suggestions");
        }
        pending.push_back(PendingSuggestion {
            id,
            command: command.to_string(),
            actions,
            created_at: Utc::now(),
            parked_at: Instant::now(),
        });
        while pending.len() > self.max_pending {
            if let Some(evicted) = pending.pop_front() {
                debug!(suggestion_id = %evicted.id, "Evicted oldest pending suggestion");
            }
        }
        id
    }

    /// Approve a pending suggestion, removing and returning it.
    pub fn approve(&self, id: Uuid) -> Result<PendingSuggestion, EngineError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = pending
            .iter()
            .position(|p| p.id == id)
            .ok_or(EngineError::SuggestionNotFound(id))?;
        match pending.remove(pos) {
            Some(suggestion) if suggestion.is_expired(self.ttl) => {
                Err(EngineError::SuggestionExpired(id))
            }
            Some(suggestion) => Ok(suggestion),
            None => Err(EngineError::SuggestionNotFound(id)),
        }
    }

    /// Dismiss a pending suggestion. Returns `true` if it was found.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.iter().position(|p| p.id == id) {
            Some(pos) => {
                pending.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop expired suggestions, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        purge(&mut pending, self.ttl)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn purge(pending: &mut VecDeque<PendingSuggestion>, ttl: Duration) -> usize {
    let before = pending.len();
    pending.retain(|p| !p.is_expired(ttl));
    before - pending.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionBody, TargetRef};
    use tasklane_core::EntityKind;

    fn delete(title: &str) -> Action {
        Action {
            entity: EntityKind::Task,
            body: ActionBody::Delete {
                target: TargetRef::by_title(title),
            },
            confidence: 0.8,
            explanation: "borrar".to_string(),
        }
    }

    fn gate() -> ConfirmationGate {
        ConfirmationGate::new(Duration::from_secs(300), 10)
    }

    #[test]
    fn test_park_and_approve() {
        let gate = gate();
        let id = gate.park("borra la tarea informe", vec![delete("informe")]);
        assert_eq!(gate.pending_count(), 1);

        let approved = gate.approve(id).unwrap();
        assert_eq!(approved.id, id);
        assert_eq!(approved.command, "borra la tarea informe");
        assert_eq!(approved.actions, vec![delete("informe")]);
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_approve_unknown_id() {
        let gate = gate();
        let id = Uuid::new_v4();
        assert!(matches!(
            gate.approve(id),
            Err(EngineError::SuggestionNotFound(found)) if found == id
        ));
    }

    #[test]
    fn test_double_approve_fails() {
        let gate = gate();
        let id = gate.park("x", vec![delete("a")]);
        assert!(gate.approve(id).is_ok());
        assert!(gate.approve(id).is_err());
    }

    #[test]
    fn test_dismiss() {
        let gate = gate();
        let id = gate.park("x", vec![delete("a")]);
        assert!(gate.dismiss(id));
        assert!(!gate.dismiss(id));
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_expired_suggestion_cannot_be_approved() {
        let gate = ConfirmationGate::new(Duration::ZERO, 10);
        let id = gate.park("x", vec![delete("a")]);
        assert!(matches!(gate.approve(id), Err(EngineError::SuggestionExpired(_))));
        assert_eq!(gate.pending_count(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let gate = ConfirmationGate::new(Duration::ZERO, 10);
        gate.park("a", vec![delete("a")]);
        assert_eq!(gate.purge_expired(), 1);
        assert_eq!(gate.pending_count(), 0);
        assert_eq!(self::gate().purge_expired(), 0);
    }

    #[test]
    fn test_park_drops_expired_suggestions() {
        let gate = ConfirmationGate::new(Duration::ZERO, 10);
        let first = gate.park("a", vec![delete("a")]);
        let second = gate.park("b", vec![delete("b")]);
        assert_eq!(gate.pending_count(), 1);
        assert!(matches!(gate.approve(first), Err(EngineError::SuggestionNotFound(_))));
        assert!(matches!(gate.approve(second), Err(EngineError::SuggestionExpired(_))));
    }

    #[test]
    fn test_oldest_evicted_when_full() {
        let gate = ConfirmationGate::new(Duration::from_secs(300), 2);
        let first = gate.park("1", vec![delete("a")]);
        let second = gate.park("2", vec![delete("b")]);
        let third = gate.park("3", vec![delete("c")]);
        assert_eq!(gate.pending_count(), 2);
        assert!(gate.approve(first).is_err());
        assert!(gate.approve(second).is_ok());
        assert!(gate.approve(third).is_ok());
    }

    #[test]
    fn test_from_config() {
        let gate = ConfirmationGate::from_config(&EngineConfig::default());
        assert_eq!(gate.ttl, Duration::from_secs(300));
        assert_eq!(gate.max_pending, 100);
    }
}
