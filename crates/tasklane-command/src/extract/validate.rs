//! Shape validation of extracted actions.
//!
//! Turns one loosely-shaped JSON object into a typed `Action`, accepting the
//! field aliases models commonly produce and rejecting anything that does
//! not fit the entity/type rules.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tasklane_core::{ActionKind, EntityKind, Priority};

use crate::date;
use crate::error::ValidationError;
use crate::types::{
    Action, ActionBody, BulkItem, BulkPayload, CommentPayload, EntityPayload, LabelPayload,
    ProjectPayload, ReminderPayload, SectionPayload, TargetRef, TaskPayload,
};

const TYPE_KEYS: &[&str] = &["type", "action", "kind", "actionType"];
const ENTITY_KEYS: &[&str] = &["entity", "entityType", "entity_type"];
const DATA_KEYS: &[&str] = &["data", "payload"];
const EXPLANATION_KEYS: &[&str] = &["explanation", "reason", "rationale"];
const QUERY_KEYS: &[&str] = &["query", "q", "question"];

const TITLE_KEYS: &[&str] = &["title", "name", "content"];
const NAME_KEYS: &[&str] = &["name", "title"];
const DESCRIPTION_KEYS: &[&str] = &["description", "desc", "notes", "descripcion"];
const PRIORITY_KEYS: &[&str] = &["priority", "prioridad"];
const DUE_KEYS: &[&str] = &["dueDate", "due_date", "due", "dueDateTime", "fecha", "date"];
const PROJECT_KEYS: &[&str] = &["project", "projectName", "project_name", "projectId", "proyecto"];
const SECTION_KEYS: &[&str] = &["section", "sectionName", "section_name", "sectionId", "seccion"];
const LABEL_KEYS: &[&str] = &["labels", "label", "etiquetas", "tags"];
const COLOR_KEYS: &[&str] = &["color", "colour"];
const PARENT_KEYS: &[&str] = &["parent", "parentName", "parentId", "parent_id"];
const CONTENT_KEYS: &[&str] = &["content", "text", "body", "comment"];
const TASK_REF_KEYS: &[&str] = &["task", "taskTitle", "task_title", "taskId", "task_id"];
const REMIND_AT_KEYS: &[&str] = &[
    "remindAt",
    "remind_at",
    "datetime",
    "dueDate",
    "due_date",
    "date",
    "time",
];
const BULK_ITEM_KEYS: &[&str] = &["items", "tasks", "entries", "elements"];

/// Validate one extracted action.
///
/// `default_confidence` applies when the action carries none.
pub(crate) fn action(
    value: &Value,
    reference: NaiveDateTime,
    default_confidence: f64,
) -> Result<Action, ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let type_name = str_field(obj, TYPE_KEYS).ok_or(ValidationError::MissingField("type"))?;
    let kind = ActionKind::from_str(&type_name)
        .map_err(|_| ValidationError::UnknownActionType(type_name.clone()))?;

    let entity_name = str_field(obj, ENTITY_KEYS).ok_or(ValidationError::MissingField("entity"))?;
    let entity = EntityKind::from_str(&entity_name)
        .map_err(|_| ValidationError::UnknownEntity(entity_name.clone()))?;

    let confidence = confidence(obj.get("confidence"))?.unwrap_or(default_confidence);
    let explanation = str_field(obj, EXPLANATION_KEYS).unwrap_or_default();
    let data = first(obj, DATA_KEYS);

    let body = match kind {
        ActionKind::Create => {
            let map = data
                .and_then(Value::as_object)
                .ok_or(ValidationError::MissingField("data"))?;
            let payload = payload(entity, map, reference)?;
            require_complete(&payload)?;
            ActionBody::Create { data: payload }
        }
        ActionKind::Update => {
            let map = data.and_then(Value::as_object);
            let target = target(obj, entity, map, false).ok_or(ValidationError::MissingTarget(kind))?;
            let mut changes = map.cloned().unwrap_or_default();
            for key in id_keys(entity) {
                changes.remove(&key);
            }
            let payload = payload(entity, &changes, reference)?;
            if is_empty(&payload) {
                return Err(ValidationError::EmptyUpdate);
            }
            ActionBody::Update {
                target,
                data: payload,
            }
        }
        ActionKind::Delete | ActionKind::Complete => {
            let map = data.and_then(Value::as_object);
            let target = target(obj, entity, map, true).ok_or(ValidationError::MissingTarget(kind))?;
            if kind == ActionKind::Delete {
                ActionBody::Delete { target }
            } else {
                ActionBody::Complete { target }
            }
        }
        ActionKind::Query => {
            let query = str_field(obj, QUERY_KEYS)
                .or_else(|| {
                    data.and_then(|d| match d {
                        Value::String(s) => non_empty(s),
                        Value::Object(m) => str_field(m, QUERY_KEYS),
                        _ => None,
                    })
                })
                .ok_or(ValidationError::MissingField("query"))?;
            ActionBody::Query { query }
        }
        ActionKind::CreateBulk => {
            let data = data.ok_or(ValidationError::MissingField("data"))?;
            ActionBody::CreateBulk {
                data: bulk(entity, data, reference)?,
            }
        }
    };

    Ok(Action {
        entity,
        body,
        confidence,
        explanation,
    })
}

/// Parse a confidence value. Percentages in `(1, 100]` are scaled down.
pub(crate) fn confidence(value: Option<&Value>) -> Result<Option<f64>, ValidationError> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    let raw = raw.ok_or_else(|| ValidationError::InvalidField {
        field: "confidence",
        reason: "not a number".to_string(),
    })?;

    if (0.0..=1.0).contains(&raw) {
        Ok(Some(raw))
    } else if raw > 1.0 && raw <= 100.0 {
        Ok(Some(raw / 100.0))
    } else {
        Err(ValidationError::ConfidenceOutOfRange(raw))
    }
}

fn payload(
    entity: EntityKind,
    map: &Map<String, Value>,
    reference: NaiveDateTime,
) -> Result<EntityPayload, ValidationError> {
    let payload = match entity {
        EntityKind::Task => EntityPayload::Task(TaskPayload {
            title: str_field(map, TITLE_KEYS),
            description: str_field(map, DESCRIPTION_KEYS),
            priority: priority(first(map, PRIORITY_KEYS))?,
            due_date: datetime(first(map, DUE_KEYS), "dueDate", reference)?,
            project: str_field(map, PROJECT_KEYS),
            section: str_field(map, SECTION_KEYS),
            labels: labels(first(map, LABEL_KEYS)),
        }),
        EntityKind::Project => EntityPayload::Project(ProjectPayload {
            name: str_field(map, NAME_KEYS),
            color: str_field(map, COLOR_KEYS),
            parent: str_field(map, PARENT_KEYS),
        }),
        EntityKind::Label => EntityPayload::Label(LabelPayload {
            name: str_field(map, NAME_KEYS),
            color: str_field(map, COLOR_KEYS),
        }),
        EntityKind::Section => EntityPayload::Section(SectionPayload {
            name: str_field(map, NAME_KEYS),
            project: str_field(map, PROJECT_KEYS),
        }),
        EntityKind::Comment => EntityPayload::Comment(CommentPayload {
            content: str_field(map, CONTENT_KEYS),
            task: str_field(map, TASK_REF_KEYS),
            project: str_field(map, PROJECT_KEYS),
        }),
        EntityKind::Reminder => EntityPayload::Reminder(ReminderPayload {
            task: str_field(map, TASK_REF_KEYS).or_else(|| str_field(map, &["title"])),
            remind_at: datetime(first(map, REMIND_AT_KEYS), "remindAt", reference)?,
        }),
    };
    Ok(payload)
}

/// Fields a payload must carry to be created.
fn require_complete(payload: &EntityPayload) -> Result<(), ValidationError> {
    use ValidationError::MissingField;
    match payload {
        EntityPayload::Task(p) if p.title.is_none() => Err(MissingField("title")),
        EntityPayload::Project(p) if p.name.is_none() => Err(MissingField("name")),
        EntityPayload::Label(p) if p.name.is_none() => Err(MissingField("name")),
        EntityPayload::Section(p) if p.name.is_none() => Err(MissingField("name")),
        EntityPayload::Section(p) if p.project.is_none() => Err(MissingField("project")),
        EntityPayload::Comment(p) if p.content.is_none() => Err(MissingField("content")),
        EntityPayload::Comment(p) if p.task.is_none() && p.project.is_none() => {
            Err(MissingField("task"))
        }
        EntityPayload::Reminder(p) if p.task.is_none() => Err(MissingField("task")),
        EntityPayload::Reminder(p) if p.remind_at.is_none() => Err(MissingField("remindAt")),
        _ => Ok(()),
    }
}

fn is_empty(payload: &EntityPayload) -> bool {
    match payload {
        EntityPayload::Task(p) => *p == TaskPayload::default(),
        EntityPayload::Project(p) => *p == ProjectPayload::default(),
        EntityPayload::Label(p) => *p == LabelPayload::default(),
        EntityPayload::Section(p) => *p == SectionPayload::default(),
        EntityPayload::Comment(p) => *p == CommentPayload::default(),
        EntityPayload::Reminder(p) => *p == ReminderPayload::default(),
    }
}

fn bulk(
    entity: EntityKind,
    data: &Value,
    reference: NaiveDateTime,
) -> Result<BulkPayload, ValidationError> {
    let (defaults, items) = match data {
        Value::Array(items) => (Map::new(), items.as_slice()),
        Value::Object(obj) => {
            let items = first(obj, BULK_ITEM_KEYS)
                .and_then(Value::as_array)
                .ok_or(ValidationError::MissingField("items"))?;
            let mut defaults = obj
                .get("defaults")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            // loose scalars beside the item list are shared defaults too
            for (key, value) in obj {
                if key == "defaults" || BULK_ITEM_KEYS.contains(&key.as_str()) {
                    continue;
                }
                defaults.entry(key.clone()).or_insert_with(|| value.clone());
            }
            (defaults, items.as_slice())
        }
        _ => {
            return Err(ValidationError::InvalidField {
                field: "data",
                reason: "bulk data must be an object or a list".to_string(),
            })
        }
    };

    if items.is_empty() {
        return Err(ValidationError::EmptyBulk);
    }

    let items: Vec<BulkItem> = items
        .iter()
        .map(|item| bulk_item(entity, &defaults, item, reference))
        .collect();

    let total = items.len();
    let payload = BulkPayload { items };
    if payload.valid_count() == 0 {
        return Err(ValidationError::NoValidBulkItems(total));
    }
    Ok(payload)
}

fn bulk_item(
    entity: EntityKind,
    defaults: &Map<String, Value>,
    item: &Value,
    reference: NaiveDateTime,
) -> BulkItem {
    let mut merged = defaults.clone();
    match item {
        Value::Object(fields) => {
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::String(text) => {
            let key = match entity {
                EntityKind::Task => "title",
                EntityKind::Comment => "content",
                EntityKind::Reminder => "task",
                _ => "name",
            };
            merged.insert(key.to_string(), Value::String(text.clone()));
        }
        _ => {
            return BulkItem::Invalid {
                reason: ValidationError::NotAnObject.to_string(),
            }
        }
    }

    match payload(entity, &merged, reference).and_then(|p| require_complete(&p).map(|_| p)) {
        Ok(data) => BulkItem::Valid { data },
        Err(e) => BulkItem::Invalid {
            reason: e.to_string(),
        },
    }
}

fn id_keys(entity: EntityKind) -> Vec<String> {
    vec![
        "id".to_string(),
        format!("{}Id", entity),
        format!("{}_id", entity),
    ]
}

/// Reference to an existing entity.
///
/// Looks at `target` (string, number or object), top-level id/title keys and
/// finally the data object. Titles inside `data` only count when
/// `title_from_data` is set, since for updates they are a rename.
fn target(
    obj: &Map<String, Value>,
    entity: EntityKind,
    data: Option<&Map<String, Value>>,
    title_from_data: bool,
) -> Option<TargetRef> {
    let ids = id_keys(entity);
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();

    match obj.get("target") {
        Some(Value::String(s)) => {
            if let Some(title) = non_empty(s) {
                return Some(TargetRef::by_title(title));
            }
        }
        Some(Value::Number(n)) => return Some(TargetRef::by_id(n.to_string())),
        Some(Value::Object(t)) => {
            let target = TargetRef {
                id: str_field(t, &ids),
                title: str_field(t, TITLE_KEYS),
            };
            if !target.is_empty() {
                return Some(target);
            }
        }
        _ => {}
    }

    let top = TargetRef {
        id: str_field(obj, &ids).or_else(|| str_field(obj, &["targetId"])),
        title: str_field(obj, &["targetTitle", "title"]),
    };
    if !top.is_empty() {
        return Some(top);
    }

    let data = data?;
    let nested = TargetRef {
        id: str_field(data, &ids),
        title: if title_from_data {
            str_field(data, TITLE_KEYS)
        } else {
            None
        },
    };
    (!nested.is_empty()).then_some(nested)
}

fn priority(value: Option<&Value>) -> Result<Option<Priority>, ValidationError> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(Priority::from_level),
        Value::String(s) => Priority::from_str(s).ok(),
        _ => None,
    };
    parsed.map(Some).ok_or_else(|| ValidationError::InvalidField {
        field: "priority",
        reason: format!("unrecognised priority {}", value),
    })
}

fn datetime(
    value: Option<&Value>,
    field: &'static str,
    reference: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, ValidationError> {
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim(),
        Some(other) => {
            return Err(ValidationError::InvalidField {
                field,
                reason: format!("expected a date string, got {}", other),
            })
        }
    };
    parse_datetime(text, reference)
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidField {
            field,
            reason: format!("unrecognised date {:?}", text),
        })
}

/// ISO-8601 timestamps (offsets are dropped, keeping wall-clock time),
/// plain dates, or natural-language phrases.
pub(crate) fn parse_datetime(text: &str, reference: NaiveDateTime) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    date::resolve(text, reference)
}

fn labels(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => non_empty(s),
                Value::Object(m) => str_field(m, NAME_KEYS),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .filter_map(|label| non_empty(label.trim_start().trim_start_matches('#')))
            .collect(),
        _ => Vec::new(),
    }
}

fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

/// First non-empty string (or number, rendered) under any of `keys`.
fn str_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) => non_empty(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
