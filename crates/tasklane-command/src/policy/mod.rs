//! Confidence decision policy.
//!
//! Classifies one parsed command into exactly one terminal outcome. Rules
//! apply in order:
//!
//! 1. `Reject` when the reply was unparsable or no action survived validation.
//! 2. `Clarify` when the minimum confidence is below the clarify threshold,
//!    or the command is ambiguous.
//! 3. `AutoExecute` when the minimum confidence reaches the auto-execute
//!    threshold and no `delete` sits below the delete threshold.
//! 4. `Suggest` otherwise.

pub mod ambiguity;
pub mod state_machine;

use std::fmt;

use serde::Serialize;
use tasklane_core::config::PolicyConfig;

use crate::types::{Action, CommandOutcome, ParseQuality};

pub use ambiguity::{detect as detect_ambiguity, Ambiguity};
pub use state_machine::{validate_transition, CommandPhase};

/// Why the policy chose its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Unparsable,
    NoValidActions,
    LowConfidence,
    Ambiguous,
    Confident,
    BelowAutoThreshold,
    RiskyDelete,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Unparsable => write!(f, "unparsable"),
            DecisionReason::NoValidActions => write!(f, "no_valid_actions"),
            DecisionReason::LowConfidence => write!(f, "low_confidence"),
            DecisionReason::Ambiguous => write!(f, "ambiguous"),
            DecisionReason::Confident => write!(f, "confident"),
            DecisionReason::BelowAutoThreshold => write!(f, "below_auto_threshold"),
            DecisionReason::RiskyDelete => write!(f, "risky_delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub outcome: CommandOutcome,
    /// Minimum confidence across the actions; `None` when there are none.
    pub min_confidence: Option<f64>,
    pub reason: DecisionReason,
}

/// Pure decision function over parsed actions, parameterised by thresholds.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    config: PolicyConfig,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl DecisionPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn decide(&self, quality: ParseQuality, actions: &[Action], ambiguous: bool) -> Decision {
        let min_confidence = actions
            .iter()
            .map(|a| a.confidence)
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |m| m.min(c))));

        let (outcome, reason) = match min_confidence {
            _ if quality == ParseQuality::Unparsable => {
                (CommandOutcome::Reject, DecisionReason::Unparsable)
            }
            None => (CommandOutcome::Reject, DecisionReason::NoValidActions),
            Some(min) if min < self.config.clarify_threshold => {
                (CommandOutcome::Clarify, DecisionReason::LowConfidence)
            }
            Some(_) if ambiguous => (CommandOutcome::Clarify, DecisionReason::Ambiguous),
            Some(min) if min < self.config.auto_execute_threshold => {
                (CommandOutcome::Suggest, DecisionReason::BelowAutoThreshold)
            }
            Some(_) if self.has_risky_delete(actions) => {
                (CommandOutcome::Suggest, DecisionReason::RiskyDelete)
            }
            Some(_) => (CommandOutcome::AutoExecute, DecisionReason::Confident),
        };

        Decision {
            outcome,
            min_confidence,
            reason,
        }
    }

    fn has_risky_delete(&self, actions: &[Action]) -> bool {
        actions
            .iter()
            .any(|a| a.kind().is_destructive() && a.confidence < self.config.delete_threshold)
    }
}

// =============================================================================
// Tests
// =============================================================================
