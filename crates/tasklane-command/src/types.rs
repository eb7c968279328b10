//! Core types and value objects for the command engine.
//!
//! Defines parsed actions and their per-entity payloads, execution results,
//! the caller context and the overall command response.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;
use tasklane_core::{ActionKind, EntityKind, Priority};
use uuid::Uuid;

use crate::error::ValidationError;

// =============================================================================
// Payloads
// =============================================================================

/// Fields of a task. On `create` the title is required; on `update` every
/// present field is a change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReminderPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remind_at: Option<NaiveDateTime>,
}

/// Entity-shaped payload, one variant per entity kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityPayload {
    Task(TaskPayload),
    Project(ProjectPayload),
    Label(LabelPayload),
    Section(SectionPayload),
    Comment(CommentPayload),
    Reminder(ReminderPayload),
}

impl EntityPayload {
    pub fn entity(&self) -> EntityKind {
        match self {
            EntityPayload::Task(_) => EntityKind::Task,
            EntityPayload::Project(_) => EntityKind::Project,
            EntityPayload::Label(_) => EntityKind::Label,
            EntityPayload::Section(_) => EntityKind::Section,
            EntityPayload::Comment(_) => EntityKind::Comment,
            EntityPayload::Reminder(_) => EntityKind::Reminder,
        }
    }

    /// Human-readable name of the entity described by the payload, if any.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            EntityPayload::Task(p) => p.title.as_deref(),
            EntityPayload::Project(p) => p.name.as_deref(),
            EntityPayload::Label(p) => p.name.as_deref(),
            EntityPayload::Section(p) => p.name.as_deref(),
            EntityPayload::Comment(p) => p.content.as_deref(),
            EntityPayload::Reminder(p) => p.task.as_deref(),
        }
    }
}

/// Reference to an existing entity, by id or by title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TargetRef {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: None,
        }
    }

    pub fn by_title(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: Some(title.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.title.is_none()
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.id, &self.title) {
            (_, Some(title)) => write!(f, "\"{}\"", title),
            (Some(id), None) => write!(f, "#{}", id),
            (None, None) => write!(f, "<none>"),
        }
    }
}

/// One item of a `create_bulk` payload, after defaults were merged in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkItem {
    Valid { data: EntityPayload },
    Invalid { reason: String },
}

/// Ordered, homogeneous items of a `create_bulk` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkPayload {
    pub items: Vec<BulkItem>,
}

impl BulkPayload {
    pub fn valid_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i, BulkItem::Valid { .. }))
            .count()
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Per-type shape of an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionBody {
    Create { data: EntityPayload },
    Update { target: TargetRef, data: EntityPayload },
    Delete { target: TargetRef },
    Complete { target: TargetRef },
    Query { query: String },
    CreateBulk { data: BulkPayload },
}

impl ActionBody {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionBody::Create { .. } => ActionKind::Create,
            ActionBody::Update { .. } => ActionKind::Update,
            ActionBody::Delete { .. } => ActionKind::Delete,
            ActionBody::Complete { .. } => ActionKind::Complete,
            ActionBody::Query { .. } => ActionKind::Query,
            ActionBody::CreateBulk { .. } => ActionKind::CreateBulk,
        }
    }

    pub fn target(&self) -> Option<&TargetRef> {
        match self {
            ActionBody::Update { target, .. }
            | ActionBody::Delete { target }
            | ActionBody::Complete { target } => Some(target),
            _ => None,
        }
    }
}

/// A validated, structured mutation or query derived from a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub entity: EntityKind,
    #[serde(flatten)]
    pub body: ActionBody,
    /// Certainty in `[0, 1]` that the action matches the user's intent.
    pub confidence: f64,
    pub explanation: String,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        self.body.kind()
    }

    /// One-line description used in suggestions and logs.
    pub fn describe(&self) -> String {
        match &self.body {
            ActionBody::Create { data } => format!(
                "create {} {}",
                self.entity,
                data.display_name().map(|n| format!("\"{}\"", n)).unwrap_or_default()
            )
            .trim_end()
            .to_string(),
            ActionBody::Update { target, .. } => format!("update {} {}", self.entity, target),
            ActionBody::Delete { target } => format!("delete {} {}", self.entity, target),
            ActionBody::Complete { target } => format!("complete {} {}", self.entity, target),
            ActionBody::Query { query } => format!("query {}: {}", self.entity, query),
            ActionBody::CreateBulk { data } => {
                format!("create {} {} items", data.valid_count(), self.entity)
            }
        }
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Category of a per-action execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    NotFound,
    Validation,
    Conflict,
    Unsupported,
    Internal,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionErrorKind::NotFound => write!(f, "not_found"),
            ExecutionErrorKind::Validation => write!(f, "validation"),
            ExecutionErrorKind::Conflict => write!(f, "conflict"),
            ExecutionErrorKind::Unsupported => write!(f, "unsupported"),
            ExecutionErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// What the executor reports for one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(entity_id: Option<String>) -> Self {
        Self {
            ok: true,
            entity_id,
            error: None,
            message: None,
        }
    }

    pub fn failed(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            entity_id: None,
            error: Some(kind),
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Outcome of one action (or one bulk item) within a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub action_index: usize,
    /// Position inside a `create_bulk` payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub entity: EntityKind,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

// =============================================================================
// Command response
// =============================================================================

/// Terminal outcome chosen by the decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    AutoExecute,
    Suggest,
    Clarify,
    Reject,
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::AutoExecute => write!(f, "auto_execute"),
            CommandOutcome::Suggest => write!(f, "suggest"),
            CommandOutcome::Clarify => write!(f, "clarify"),
            CommandOutcome::Reject => write!(f, "reject"),
        }
    }
}

/// How cleanly the structured block was extracted from the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseQuality {
    Clean,
    Recovered,
    Unparsable,
}

impl fmt::Display for ParseQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseQuality::Clean => write!(f, "clean"),
            ParseQuality::Recovered => write!(f, "recovered"),
            ParseQuality::Unparsable => write!(f, "unparsable"),
        }
    }
}

/// An extracted action that failed shape validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedAction {
    /// Position in the reply's action list.
    pub index: usize,
    pub reason: String,
    #[serde(skip)]
    pub error: ValidationError,
}

impl DroppedAction {
    pub fn new(index: usize, error: ValidationError) -> Self {
        Self {
            index,
            reason: error.to_string(),
            error,
        }
    }
}

/// The engine's reply to one user command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub command: String,
    pub actions: Vec<Action>,
    pub results: Vec<ActionResult>,
    /// True iff the decision policy selected auto-execute.
    pub auto_executed: bool,
    pub outcome: CommandOutcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion_id: Option<Uuid>,
    pub quality: ParseQuality,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Set when execution was skipped because the caller went away.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub execution_skipped: bool,
}

impl CommandResponse {
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.ok).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.outcome.ok).count()
    }
}

// =============================================================================
// Caller context
// =============================================================================

/// Liveness flag of the client that issued a command.
///
/// Cloned into transport code; once `disconnect` is called no further action
/// of that command is executed.
#[derive(Debug, Clone)]
pub struct CallerHandle {
    connected: Arc<AtomicBool>,
}

impl Default for CallerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CallerHandle {
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// An existing entity the caller can refer to by title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownEntity {
    pub kind: EntityKind,
    pub id: String,
    pub title: String,
}

impl KnownEntity {
    pub fn new(kind: EntityKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Per-request context supplied by the caller.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: String,
    /// Wall-clock instant relative dates resolve against.
    pub reference: NaiveDateTime,
    pub known: Vec<KnownEntity>,
    pub caller: CallerHandle,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, reference: NaiveDateTime) -> Self {
        Self {
            user_id: user_id.into(),
            reference,
            known: Vec::new(),
            caller: CallerHandle::new(),
        }
    }

    /// Context whose reference instant is "now" on a clock `offset_minutes`
    /// away from UTC.
    pub fn now_at_offset(user_id: impl Into<String>, offset_minutes: i32) -> Self {
        let reference = Utc::now().naive_utc() + Duration::minutes(i64::from(offset_minutes));
        Self::new(user_id, reference)
    }

    pub fn with_known(mut self, known: Vec<KnownEntity>) -> Self {
        self.known = known;
        self
    }

    pub fn with_caller(mut self, caller: CallerHandle) -> Self {
        self.caller = caller;
        self
    }

    pub fn known_of(&self, kind: EntityKind) -> impl Iterator<Item = &KnownEntity> {
        self.known.iter().filter(move |k| k.kind == kind)
    }
}
