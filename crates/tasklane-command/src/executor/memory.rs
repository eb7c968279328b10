//! In-process workspace used by the binary and by tests.
//!
//! Holds every entity in insertion order behind a `RwLock`. References by
//! title resolve case- and accent-insensitively: exact title first, then a
//! unique partial match.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tasklane_core::{ActionKind, EntityKind};
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::executor::ActionExecutor;
use crate::text::fold;
use crate::types::{
    Action, ActionBody, CommentPayload, EntityPayload, ExecutionOutcome, KnownEntity,
    LabelPayload, ProjectPayload, ReminderPayload, SectionPayload, TargetRef, TaskPayload,
};

/// One stored entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceEntry {
    pub id: String,
    pub kind: EntityKind,
    pub title: String,
    pub data: EntityPayload,
    pub completed: bool,
}

#[derive(Debug, Default)]
struct WorkspaceState {
    entries: Vec<WorkspaceEntry>,
    next_id: u64,
}

impl WorkspaceState {
    fn insert(&mut self, kind: EntityKind, title: String, data: EntityPayload) -> String {
        self.next_id += 1;
        let id = format!("{}-{}", kind, self.next_id);
        self.entries.push(WorkspaceEntry {
            id: id.clone(),
            kind,
            title,
            data,
            completed: false,
        });
        id
    }

    /// Position of the entity `reference` names, by id or by title.
    fn find(&self, kind: EntityKind, reference: &str) -> Result<usize, ExecutionError> {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.kind == kind && e.id == reference)
        {
            return Ok(pos);
        }

        let needle = fold(reference);
        let not_found = || ExecutionError::NotFound {
            entity: kind,
            target: format!("\"{}\"", reference),
        };
        if needle.is_empty() {
            return Err(not_found());
        }

        let exact: Vec<usize> = self.positions(kind, |title| title == needle);
        let matches = if exact.is_empty() {
            self.positions(kind, |title| title.contains(&needle))
        } else {
            exact
        };

        match matches.as_slice() {
            [] => Err(not_found()),
            [pos] => Ok(*pos),
            _ => Err(ExecutionError::Conflict(format!(
                "{} {} entities match \"{}\"",
                matches.len(),
                kind,
                reference
            ))),
        }
    }

    fn positions(&self, kind: EntityKind, pred: impl Fn(&str) -> bool) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == kind && pred(&fold(&e.title)))
            .map(|(i, _)| i)
            .collect()
    }

    fn locate(&self, kind: EntityKind, target: &TargetRef) -> Result<usize, ExecutionError> {
        match (&target.id, &target.title) {
            (Some(id), _) => self
                .entries
                .iter()
                .position(|e| e.kind == kind && &e.id == id)
                .ok_or_else(|| ExecutionError::NotFound {
                    entity: kind,
                    target: target.to_string(),
                }),
            (None, Some(title)) => self.find(kind, title),
            (None, None) => Err(ExecutionError::Validation {
                entity: kind,
                reason: "no target".to_string(),
            }),
        }
    }

    /// Fail unless every entity the payload points at exists.
    fn check_references(&self, data: &EntityPayload) -> Result<(), ExecutionError> {
        let refs: Vec<(EntityKind, &String)> = match data {
            EntityPayload::Task(p) => [
                p.project.as_ref().map(|r| (EntityKind::Project, r)),
                p.section.as_ref().map(|r| (EntityKind::Section, r)),
            ]
            .into_iter()
            .flatten()
            .collect(),
            EntityPayload::Project(p) => p.parent.iter().map(|r| (EntityKind::Project, r)).collect(),
            EntityPayload::Section(p) => p.project.iter().map(|r| (EntityKind::Project, r)).collect(),
            EntityPayload::Comment(p) => [
                p.task.as_ref().map(|r| (EntityKind::Task, r)),
                p.project.as_ref().map(|r| (EntityKind::Project, r)),
            ]
            .into_iter()
            .flatten()
            .collect(),
            EntityPayload::Reminder(p) => p.task.iter().map(|r| (EntityKind::Task, r)).collect(),
            EntityPayload::Label(_) => Vec::new(),
        };
        for (kind, reference) in refs {
            self.find(kind, reference)?;
        }
        Ok(())
    }

    fn create(&mut self, entity: EntityKind, data: &EntityPayload) -> Result<String, ExecutionError> {
        if data.entity() != entity {
            return Err(ExecutionError::Validation {
                entity,
                reason: format!("payload describes a {}", data.entity()),
            });
        }
        let title = data
            .display_name()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExecutionError::Validation {
                entity,
                reason: "missing name".to_string(),
            })?
            .to_string();

        self.check_references(data)?;

        if matches!(entity, EntityKind::Project | EntityKind::Label) {
            let folded = fold(&title);
            if self
                .entries
                .iter()
                .any(|e| e.kind == entity && fold(&e.title) == folded)
            {
                return Err(ExecutionError::Conflict(format!(
                    "{} \"{}\" already exists",
                    entity, title
                )));
            }
        }

        Ok(self.insert(entity, title, data.clone()))
    }

    fn update(
        &mut self,
        entity: EntityKind,
        target: &TargetRef,
        changes: &EntityPayload,
    ) -> Result<String, ExecutionError> {
        self.check_references(changes)?;
        let pos = self.locate(entity, target)?;
        let entry = &mut self.entries[pos];
        merge(&mut entry.data, changes).map_err(|reason| ExecutionError::Validation {
            entity,
            reason,
        })?;
        if let Some(title) = entry.data.display_name() {
            entry.title = title.to_string();
        }
        Ok(entry.id.clone())
    }
}

fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

fn merge(current: &mut EntityPayload, changes: &EntityPayload) -> Result<(), String> {
    match (current, changes) {
        (EntityPayload::Task(c), EntityPayload::Task(n)) => {
            set(&mut c.title, &n.title);
            set(&mut c.description, &n.description);
            set(&mut c.priority, &n.priority);
            set(&mut c.due_date, &n.due_date);
            set(&mut c.project, &n.project);
            set(&mut c.section, &n.section);
            if !n.labels.is_empty() {
                c.labels.clone_from(&n.labels);
            }
        }
        (EntityPayload::Project(c), EntityPayload::Project(n)) => {
            set(&mut c.name, &n.name);
            set(&mut c.color, &n.color);
            set(&mut c.parent, &n.parent);
        }
        (EntityPayload::Label(c), EntityPayload::Label(n)) => {
            set(&mut c.name, &n.name);
            set(&mut c.color, &n.color);
        }
        (EntityPayload::Section(c), EntityPayload::Section(n)) => {
            set(&mut c.name, &n.name);
            set(&mut c.project, &n.project);
        }
        (EntityPayload::Comment(c), EntityPayload::Comment(n)) => {
            set(&mut c.content, &n.content);
            set(&mut c.task, &n.task);
            set(&mut c.project, &n.project);
        }
        (EntityPayload::Reminder(c), EntityPayload::Reminder(n)) => {
            set(&mut c.task, &n.task);
            set(&mut c.remind_at, &n.remind_at);
        }
        (c, n) => {
            return Err(format!(
                "cannot apply {} changes to a {}",
                n.entity(),
                c.entity()
            ))
        }
    }
    Ok(())
}

fn named(kind: EntityKind, title: &str) -> EntityPayload {
    let name = Some(title.to_string());
    match kind {
        EntityKind::Task => EntityPayload::Task(TaskPayload {
            title: name,
            ..TaskPayload::default()
        }),
        EntityKind::Project => EntityPayload::Project(ProjectPayload {
            name,
            ..ProjectPayload::default()
        }),
        EntityKind::Label => EntityPayload::Label(LabelPayload {
            name,
            ..LabelPayload::default()
        }),
        EntityKind::Section => EntityPayload::Section(SectionPayload {
            name,
            ..SectionPayload::default()
        }),
        EntityKind::Comment => EntityPayload::Comment(CommentPayload {
            content: name,
            ..CommentPayload::default()
        }),
        EntityKind::Reminder => EntityPayload::Reminder(ReminderPayload {
            task: name,
            ..ReminderPayload::default()
        }),
    }
}

/// Thread-safe in-memory task workspace.
#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    state: RwLock<WorkspaceState>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity directly, bypassing validation. Returns its id.
    pub fn seed(&self, kind: EntityKind, title: &str) -> String {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, title.to_string(), named(kind, title))
    }

    pub fn get(&self, id: &str) -> Option<WorkspaceEntry> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn entries(&self, kind: EntityKind) -> Vec<WorkspaceEntry> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Open entities a caller can refer to by title.
    pub fn known_entities(&self) -> Vec<KnownEntity> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .filter(|e| !e.completed)
            .map(|e| KnownEntity::new(e.kind, e.id.clone(), e.title.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, action: &Action) -> Result<ExecutionOutcome, ExecutionError> {
        let entity = action.entity;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        match &action.body {
            ActionBody::Create { data } => {
                let id = state.create(entity, data)?;
                Ok(ExecutionOutcome::succeeded(Some(id)))
            }
            ActionBody::Update { target, data } => {
                let id = state.update(entity, target, data)?;
                Ok(ExecutionOutcome::succeeded(Some(id)))
            }
            ActionBody::Delete { target } => {
                let pos = state.locate(entity, target)?;
                let removed = state.entries.remove(pos);
                Ok(ExecutionOutcome::succeeded(Some(removed.id)))
            }
            ActionBody::Complete { target } => {
                if entity != EntityKind::Task {
                    return Err(ExecutionError::Unsupported {
                        kind: ActionKind::Complete,
                        entity,
                    });
                }
                let pos = state.locate(entity, target)?;
                let entry = &mut state.entries[pos];
                if entry.completed {
                    return Err(ExecutionError::Conflict(format!(
                        "task \"{}\" is already completed",
                        entry.title
                    )));
                }
                entry.completed = true;
                Ok(ExecutionOutcome::succeeded(Some(entry.id.clone())))
            }
            ActionBody::Query { query } => {
                let titles: Vec<&str> = state
                    .entries
                    .iter()
                    .filter(|e| e.kind == entity && !e.completed)
                    .map(|e| e.title.as_str())
                    .collect();
                debug!(query = %query, hits = titles.len(), "Query answered");
                Ok(ExecutionOutcome::succeeded(None).with_message(format!(
                    "{} resultados: {}",
                    titles.len(),
                    titles.join(", ")
                )))
            }
            // Bulk actions are expanded into single creates before execution.
            ActionBody::CreateBulk { .. } => Err(ExecutionError::Unsupported {
                kind: ActionKind::CreateBulk,
                entity,
            }),
        }
    }
}

#[async_trait]
impl ActionExecutor for InMemoryWorkspace {
    async fn execute(&self, action: &Action) -> ExecutionOutcome {
        match self.apply(action) {
            Ok(outcome) => {
                debug!(
                    action = %action.kind(),
                    entity = %action.entity,
                    id = outcome.entity_id.as_deref().unwrap_or("-"),
                    "Action applied"
                );
                outcome
            }
            Err(e) => {
                warn!(action = %action.kind(), entity = %action.entity, error = %e, "Action failed");
                e.into()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BulkItem, BulkPayload, ExecutionErrorKind};
    use tasklane_core::Priority;

    fn action(entity: EntityKind, body: ActionBody) -> Action {
        Action {
            entity,
            body,
            confidence: 0.9,
            explanation: String::new(),
        }
    }

    fn create_task(title: &str, project: Option<&str>) -> Action {
        action(
            EntityKind::Task,
            ActionBody::Create {
                data: EntityPayload::Task(TaskPayload {
                    title: Some(title.to_string()),
                    project: project.map(str::to_string),
                    ..TaskPayload::default()
                }),
            },
        )
    }

    #[tokio::test]
    async fn test_create_task_assigns_id() {
        let ws = InMemoryWorkspace::new();
        let outcome = ws.execute(&create_task("Comprar pan", None)).await;
        assert!(outcome.ok);
        let id = outcome.entity_id.unwrap();
        assert_eq!(ws.get(&id).unwrap().title, "Comprar pan");
        assert_eq!(ws.len(), 1);
    }

    #[tokio::test]
    async fn test_create_task_in_missing_project_fails() {
        let ws = InMemoryWorkspace::new();
        let outcome = ws.execute(&create_task("Comprar pan", Some("Casa"))).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.error, Some(ExecutionErrorKind::NotFound));
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn test_create_task_in_project_by_accentless_name() {
        let ws = InMemoryWorkspace::new();
        ws.seed(EntityKind::Project, "Jardín");
        let outcome = ws.execute(&create_task("Regar", Some("jardin"))).await;
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn test_duplicate_project_conflicts() {
        let ws = InMemoryWorkspace::new();
        ws.seed(EntityKind::Project, "Casa");
        let outcome = ws
            .execute(&action(
                EntityKind::Project,
                ActionBody::Create {
                    data: EntityPayload::Project(ProjectPayload {
                        name: Some("casa".to_string()),
                        ..ProjectPayload::default()
                    }),
                },
            ))
            .await;
        assert_eq!(outcome.error, Some(ExecutionErrorKind::Conflict));
    }

    #[tokio::test]
    async fn test_update_merges_present_fields() {
        let ws = InMemoryWorkspace::new();
        let id = ws.seed(EntityKind::Task, "Informe mensual");
        let outcome = ws
            .execute(&action(
                EntityKind::Task,
                ActionBody::Update {
                    target: TargetRef::by_title("informe"),
                    data: EntityPayload::Task(TaskPayload {
                        priority: Some(Priority::High),
                        ..TaskPayload::default()
                    }),
                },
            ))
            .await;
        assert!(outcome.ok);
        let entry = ws.get(&id).unwrap();
        assert_eq!(entry.title, "Informe mensual");
        match entry.data {
            EntityPayload::Task(t) => assert_eq!(t.priority, Some(Priority::High)),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_with_mismatched_payload() {
        let ws = InMemoryWorkspace::new();
        let id = ws.seed(EntityKind::Task, "Informe");
        let outcome = ws
            .execute(&action(
                EntityKind::Task,
                ActionBody::Update {
                    target: TargetRef::by_id(id),
                    data: EntityPayload::Label(LabelPayload {
                        color: Some("red".to_string()),
                        ..LabelPayload::default()
                    }),
                },
            ))
            .await;
        assert_eq!(outcome.error, Some(ExecutionErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_several_partial_matches_conflict() {
        let ws = InMemoryWorkspace::new();
        ws.seed(EntityKind::Task, "Informe mensual");
        ws.seed(EntityKind::Task, "Informe anual");
        let outcome = ws
            .execute(&action(
                EntityKind::Task,
                ActionBody::Delete {
                    target: TargetRef::by_title("informe"),
                },
            ))
            .await;
        assert_eq!(outcome.error, Some(ExecutionErrorKind::Conflict));
        assert_eq!(ws.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_id() {
        let ws = InMemoryWorkspace::new();
        let id = ws.seed(EntityKind::Label, "urgente");
        let outcome = ws
            .execute(&action(
                EntityKind::Label,
                ActionBody::Delete {
                    target: TargetRef::by_id(id.clone()),
                },
            ))
            .await;
        assert!(outcome.ok);
        assert!(ws.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_complete_task_once() {
        let ws = InMemoryWorkspace::new();
        let id = ws.seed(EntityKind::Task, "Comprar pan");
        let complete = action(
            EntityKind::Task,
            ActionBody::Complete {
                target: TargetRef::by_title("Comprar pan"),
            },
        );
        assert!(ws.execute(&complete).await.ok);
        assert!(ws.get(&id).unwrap().completed);
        assert!(ws.known_entities().is_empty());

        let again = ws.execute(&complete).await;
        assert_eq!(again.error, Some(ExecutionErrorKind::Conflict));
    }

    #[tokio::test]
    async fn test_complete_project_unsupported() {
        let ws = InMemoryWorkspace::new();
        ws.seed(EntityKind::Project, "Casa");
        let outcome = ws
            .execute(&action(
                EntityKind::Project,
                ActionBody::Complete {
                    target: TargetRef::by_title("Casa"),
                },
            ))
            .await;
        assert_eq!(outcome.error, Some(ExecutionErrorKind::Unsupported));
    }

    #[tokio::test]
    async fn test_query_lists_open_entities() {
        let ws = InMemoryWorkspace::new();
        ws.seed(EntityKind::Task, "Uno");
        ws.seed(EntityKind::Task, "Dos");
        let outcome = ws
            .execute(&action(
                EntityKind::Task,
                ActionBody::Query {
                    query: "tareas pendientes".to_string(),
                },
            ))
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.message.as_deref(), Some("2 resultados: Uno, Dos"));
    }

    #[tokio::test]
    async fn test_unexpanded_bulk_is_rejected_untouched() {
        let ws = InMemoryWorkspace::new();
        let bulk = action(
            EntityKind::Label,
            ActionBody::CreateBulk {
                data: BulkPayload {
                    items: vec![
                        BulkItem::Valid {
                            data: named(EntityKind::Label, "casa"),
                        },
                        BulkItem::Invalid {
                            reason: "missing field: name".to_string(),
                        },
                        BulkItem::Valid {
                            data: named(EntityKind::Label, "trabajo"),
                        },
                    ],
                },
            },
        );
        let outcome = ws.execute(&bulk).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.error, Some(ExecutionErrorKind::Unsupported));
        assert!(ws.entries(EntityKind::Label).is_empty());
    }

    #[test]
    fn test_known_entities_carry_ids() {
        let ws = InMemoryWorkspace::new();
        let id = ws.seed(EntityKind::Project, "Casa");
        assert_eq!(
            ws.known_entities(),
            vec![KnownEntity::new(EntityKind::Project, id, "Casa")]
        );
    }
}
