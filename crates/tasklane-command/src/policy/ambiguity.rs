//! Detection of references that could mean more than one existing entity.
//!
//! A title reference is ambiguous when it matches two or more of the
//! caller's known entities of the referenced kind (case- and
//! accent-insensitive, the reference contained in the title) and no single
//! one matches exactly. Matching follows the workspace's title lookup. A bare pronoun ("esa", "la tarea") is ambiguous when
//! the caller knows several candidates.

use tasklane_core::EntityKind;

use crate::text::fold;
use crate::types::{Action, ActionBody, EntityPayload, KnownEntity};

/// Names listed in a clarification question.
const MAX_LISTED: usize = 5;

const PLACEHOLDERS: &[&str] = &[
    "esa", "ese", "eso", "esta", "este", "esto", "ella", "el", "la", "lo", "la tarea", "esa tarea",
    "esta tarea", "el proyecto", "ese proyecto", "la etiqueta", "it", "that", "this",
];

/// An ambiguous reference and the question to ask about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    pub reference: String,
    pub candidates: Vec<String>,
    pub question: String,
}

/// First ambiguous reference among `actions`, if any.
pub fn detect(actions: &[Action], known: &[KnownEntity]) -> Option<Ambiguity> {
    if known.is_empty() {
        return None;
    }
    actions
        .iter()
        .flat_map(title_references)
        .find_map(|(kind, title)| check(kind, &title, known))
}

/// Title references of one action, with the kind of entity they point at.
fn title_references(action: &Action) -> Vec<(EntityKind, String)> {
    let mut refs = Vec::new();

    if let Some(target) = action.body.target() {
        if target.id.is_none() {
            if let Some(title) = &target.title {
                refs.push((action.entity, title.clone()));
            }
        }
    }

    let payload = match &action.body {
        ActionBody::Create { data } | ActionBody::Update { data, .. } => Some(data),
        _ => None,
    };
    match payload {
        Some(EntityPayload::Comment(c)) => {
            if let Some(task) = &c.task {
                refs.push((EntityKind::Task, task.clone()));
            }
        }
        Some(EntityPayload::Reminder(r)) => {
            if let Some(task) = &r.task {
                refs.push((EntityKind::Task, task.clone()));
            }
        }
        _ => {}
    }

    refs
}

fn check(kind: EntityKind, title: &str, known: &[KnownEntity]) -> Option<Ambiguity> {
    let needle = fold(title);
    if needle.is_empty() {
        return None;
    }
    let pool: Vec<&KnownEntity> = known.iter().filter(|k| k.kind == kind).collect();

    let candidates: Vec<&KnownEntity> = if PLACEHOLDERS.contains(&needle.as_str()) {
        pool
    } else {
        let exact = pool.iter().filter(|k| fold(&k.title) == needle).count();
        if exact == 1 {
            return None;
        }
        pool.into_iter()
            .filter(|k| fold(&k.title).contains(&needle))
            .collect()
    };

    if candidates.len() < 2 {
        return None;
    }

    let names: Vec<String> = candidates.iter().map(|k| k.title.clone()).collect();
    Some(Ambiguity {
        reference: title.to_string(),
        question: question(&names),
        candidates: names,
    })
}

fn question(names: &[String]) -> String {
    let listed: Vec<String> = names
        .iter()
        .take(MAX_LISTED)
        .map(|n| format!("\"{}\"", n))
        .collect();
    let more = names.len().saturating_sub(MAX_LISTED);
    if more > 0 {
        format!("¿A cuál te refieres: {} (y {} más)?", listed.join(", "), more)
    } else {
        format!("¿A cuál te refieres: {}?", listed.join(", "))
    }
}
