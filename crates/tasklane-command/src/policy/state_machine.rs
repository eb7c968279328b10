//! Lifecycle of one command through the engine.
//!
//! Received -> Parsed -> AutoExecute | Suggest | Clarify | Reject
//!
//! The four outcomes are terminal.

use std::fmt;

use serde::Serialize;

use crate::error::InvalidTransition;
use crate::types::CommandOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandPhase {
    Received,
    Parsed,
    AutoExecute,
    Suggest,
    Clarify,
    Reject,
}

impl CommandPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandPhase::Received | CommandPhase::Parsed)
    }
}

impl From<CommandOutcome> for CommandPhase {
    fn from(outcome: CommandOutcome) -> Self {
        match outcome {
            CommandOutcome::AutoExecute => CommandPhase::AutoExecute,
            CommandOutcome::Suggest => CommandPhase::Suggest,
            CommandOutcome::Clarify => CommandPhase::Clarify,
            CommandOutcome::Reject => CommandPhase::Reject,
        }
    }
}

impl fmt::Display for CommandPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandPhase::Received => write!(f, "received"),
            CommandPhase::Parsed => write!(f, "parsed"),
            CommandPhase::AutoExecute => write!(f, "auto_execute"),
            CommandPhase::Suggest => write!(f, "suggest"),
            CommandPhase::Clarify => write!(f, "clarify"),
            CommandPhase::Reject => write!(f, "reject"),
        }
    }
}

/// Validate that a phase transition is allowed.
///
/// Valid transitions:
/// - Received -> Parsed
/// - Parsed -> AutoExecute
/// - Parsed -> Suggest
/// - Parsed -> Clarify
/// - Parsed -> Reject
pub fn validate_transition(from: CommandPhase, to: CommandPhase) -> Result<(), InvalidTransition> {
    let valid = matches!(
        (from, to),
        (CommandPhase::Received, CommandPhase::Parsed)
            | (CommandPhase::Parsed, CommandPhase::AutoExecute)
            | (CommandPhase::Parsed, CommandPhase::Suggest)
            | (CommandPhase::Parsed, CommandPhase::Clarify)
            | (CommandPhase::Parsed, CommandPhase::Reject)
    );

    if valid {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CommandPhase; 6] = [
        CommandPhase::Received,
        CommandPhase::Parsed,
        CommandPhase::AutoExecute,
        CommandPhase::Suggest,
        CommandPhase::Clarify,
        CommandPhase::Reject,
    ];

    #[test]
    fn test_received_to_parsed() {
        assert!(validate_transition(CommandPhase::Received, CommandPhase::Parsed).is_ok());
    }

    #[test]
    fn test_parsed_to_every_outcome() {
        for outcome in [
            CommandOutcome::AutoExecute,
            CommandOutcome::Suggest,
            CommandOutcome::Clarify,
            CommandOutcome::Reject,
        ] {
            assert!(validate_transition(CommandPhase::Parsed, outcome.into()).is_ok());
        }
    }

    #[test]
    fn test_received_cannot_skip_parsing() {
        assert!(validate_transition(CommandPhase::Received, CommandPhase::AutoExecute).is_err());
        assert!(validate_transition(CommandPhase::Received, CommandPhase::Reject).is_err());
    }

    #[test]
    fn test_terminal_phases_have_no_exits() {
        for from in ALL.into_iter().filter(CommandPhase::is_terminal) {
            for to in ALL {
                assert!(validate_transition(from, to).is_err(), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_invalid_transition_error_message() {
        let err = validate_transition(CommandPhase::Suggest, CommandPhase::AutoExecute).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("suggest"));
        assert!(msg.contains("auto_execute"));
    }

    #[test]
    fn test_all_valid_transitions_count() {
        let mut valid_count = 0;
        for from in ALL {
            for to in ALL {
                if validate_transition(from, to).is_ok() {
                    valid_count += 1;
                }
            }
        }
        assert_eq!(valid_count, 5);
    }
}
