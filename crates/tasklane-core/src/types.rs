//! Domain vocabulary shared between the command engine and the services
//! that execute its actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// =============================================================================
// Enums
// =============================================================================

/// Kinds of entity a command can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Project,
    Label,
    Section,
    Comment,
    Reminder,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Task,
        EntityKind::Project,
        EntityKind::Label,
        EntityKind::Section,
        EntityKind::Comment,
        EntityKind::Reminder,
    ];
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Task => write!(f, "task"),
            EntityKind::Project => write!(f, "project"),
            EntityKind::Label => write!(f, "label"),
            EntityKind::Section => write!(f, "section"),
            EntityKind::Comment => write!(f, "comment"),
            EntityKind::Reminder => write!(f, "reminder"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "task" | "tarea" => Ok(EntityKind::Task),
            "project" | "proyecto" => Ok(EntityKind::Project),
            "label" | "etiqueta" => Ok(EntityKind::Label),
            "section" | "seccion" => Ok(EntityKind::Section),
            "comment" | "comentario" => Ok(EntityKind::Comment),
            "reminder" | "recordatorio" => Ok(EntityKind::Reminder),
            _ => Err(CoreError::UnknownVariant {
                kind: "entity",
                value: s.to_string(),
            }),
        }
    }
}

/// Kinds of mutation (or read) a parsed action requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Query,
    Complete,
    CreateBulk,
}

impl ActionKind {
    /// Whether the action destroys data and therefore needs extra certainty.
    pub fn is_destructive(&self) -> bool {
        matches!(self, ActionKind::Delete)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Create => write!(f, "create"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Delete => write!(f, "delete"),
            ActionKind::Query => write!(f, "query"),
            ActionKind::Complete => write!(f, "complete"),
            ActionKind::CreateBulk => write!(f, "create_bulk"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "create" => Ok(ActionKind::Create),
            "update" => Ok(ActionKind::Update),
            "delete" => Ok(ActionKind::Delete),
            "query" => Ok(ActionKind::Query),
            "complete" => Ok(ActionKind::Complete),
            "create_bulk" | "bulk_create" | "createbulk" => Ok(ActionKind::CreateBulk),
            _ => Err(CoreError::UnknownVariant {
                kind: "action type",
                value: s.to_string(),
            }),
        }
    }
}

/// Task priority. `High` is the highest level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Map a 1-based numeric level (1 = low) onto a priority.
    ///
    /// Levels above 3 saturate at `High`.
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            l if l >= 3 => Some(Priority::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = CoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "low" | "baja" | "bajo" => Ok(Priority::Low),
            "medium" | "normal" | "media" | "medio" => Ok(Priority::Medium),
            "high" | "alta" | "alto" | "urgent" | "urgente" | "maxima" | "máxima" => {
                Ok(Priority::High)
            }
            other => other
                .trim_start_matches('p')
                .parse::<i64>()
                .ok()
                .and_then(Priority::from_level)
                .ok_or_else(|| CoreError::UnknownVariant {
                    kind: "priority",
                    value: s.to_string(),
                }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::Task.to_string(), "task");
        assert_eq!(EntityKind::Project.to_string(), "project");
        assert_eq!(EntityKind::Label.to_string(), "label");
        assert_eq!(EntityKind::Section.to_string(), "section");
        assert_eq!(EntityKind::Comment.to_string(), "comment");
        assert_eq!(EntityKind::Reminder.to_string(), "reminder");
    }

    #[test]
    fn test_entity_kind_from_str_accepts_spanish() {
        assert_eq!("tarea".parse::<EntityKind>().unwrap(), EntityKind::Task);
        assert_eq!("Proyecto".parse::<EntityKind>().unwrap(), EntityKind::Project);
        assert_eq!("etiqueta".parse::<EntityKind>().unwrap(), EntityKind::Label);
        assert!("board".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_entity_kind_display_parses_back() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.to_string().parse::<EntityKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_action_kind_from_str() {
        assert_eq!("create".parse::<ActionKind>().unwrap(), ActionKind::Create);
        assert_eq!("create_bulk".parse::<ActionKind>().unwrap(), ActionKind::CreateBulk);
        assert_eq!("create-bulk".parse::<ActionKind>().unwrap(), ActionKind::CreateBulk);
        assert_eq!("DELETE".parse::<ActionKind>().unwrap(), ActionKind::Delete);
        assert!("archive".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_action_kind_serde_name() {
        let json = serde_json::to_string(&ActionKind::CreateBulk).unwrap();
        assert_eq!(json, "\"create_bulk\"");
    }

    #[test]
    fn test_only_delete_is_destructive() {
        assert!(ActionKind::Delete.is_destructive());
        assert!(!ActionKind::Complete.is_destructive());
        assert!(!ActionKind::Update.is_destructive());
    }

    #[test]
    fn test_priority_words() {
        assert_eq!("alta".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("Urgente".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("media".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("baja".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
    }

    #[test]
    fn test_priority_numeric_levels() {
        assert_eq!("1".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!("p2".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("4".parse::<Priority>().unwrap(), Priority::High);
        assert!("0".parse::<Priority>().is_err());
        assert!("whenever".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_ordering_high_is_max() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(Priority::default(), Priority::Medium);
    }
}
