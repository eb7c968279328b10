//! Prompt construction for the completion backends.

use std::fmt::Write as _;

use chrono::Datelike;
use tasklane_core::EntityKind;

use crate::date::{weekday_name_es, DateMention};
use crate::provider::Prompt;
use crate::types::UserContext;

/// Upper bound on known entities listed per kind.
const MAX_KNOWN_PER_KIND: usize = 50;

pub const SYSTEM_PROMPT: &str = r#"Eres el intérprete de comandos de una aplicación de gestión de tareas.
Convierte el comando del usuario en acciones estructuradas.

Responde SOLO con un objeto JSON, sin texto adicional:
{"actions": [ ... ], "ambiguous": false, "clarification": null}

Cada acción tiene la forma:
{"type": "create|update|delete|query|complete|create_bulk",
 "entity": "task|project|label|section|comment|reminder",
 "data": { ... },
 "target": {"id": "...", "title": "..."},
 "query": "...",
 "confidence": 0.0-1.0,
 "explanation": "..."}

Campos de "data" por entidad:
- task: title, description, priority (low|medium|high), dueDate (YYYY-MM-DDTHH:MM:SS), project, section, labels (lista)
- project: name, color, parent
- label: name, color
- section: name, project
- comment: content, task o project
- reminder: task, remindAt (YYYY-MM-DDTHH:MM:SS)

Reglas:
- update, delete y complete identifican la entidad con "target" (id o título). update lleva los cambios en "data".
- query lleva la consulta reformulada en "query".
- create_bulk crea varias entidades del mismo tipo: "data": {"defaults": {...}, "items": [{...}, ...]}.
  Los campos de "defaults" se aplican a cada elemento salvo que el elemento los defina.
- Prioridad: "alta"/"urgente" es high, "media"/"normal" es medium, "baja" es low.
- Resuelve las fechas relativas con la fecha actual indicada; usa las fechas ya detectadas cuando existan.
- "confidence" refleja tu certeza de que la acción coincide con la intención del usuario.
- Si el comando puede referirse a varias entidades existentes, marca "ambiguous": true y escribe una pregunta en "clarification".
- Si el comando no pide ninguna acción sobre tareas, devuelve "actions": []."#;

/// Build the prompt for one command.
pub fn build(command: &str, mentions: &[DateMention], ctx: &UserContext) -> Prompt {
    let mut user = String::new();
    let reference = ctx.reference;

    let _ = writeln!(
        user,
        "Fecha y hora actual: {} ({})",
        reference.format("%Y-%m-%dT%H:%M:%S"),
        weekday_name_es(reference.weekday())
    );

    if !mentions.is_empty() {
        let _ = writeln!(user, "Fechas detectadas:");
        for mention in mentions {
            let _ = writeln!(
                user,
                "- \"{}\" = {}",
                mention.text,
                mention.value.format("%Y-%m-%dT%H:%M:%S")
            );
        }
    }

    for (kind, heading) in [
        (EntityKind::Project, "Proyectos existentes"),
        (EntityKind::Label, "Etiquetas existentes"),
        (EntityKind::Task, "Tareas existentes"),
    ] {
        let known: Vec<_> = ctx.known_of(kind).take(MAX_KNOWN_PER_KIND).collect();
        if known.is_empty() {
            continue;
        }
        let _ = writeln!(user, "{}:", heading);
        for entity in known {
            let _ = writeln!(user, "- [{}] {}", entity.id, entity.title);
        }
    }

    let _ = write!(user, "\nComando: {}", command.trim());

    Prompt::new(SYSTEM_PROMPT, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date;
    use crate::types::KnownEntity;
    use chrono::NaiveDate;

    fn ctx() -> UserContext {
        let reference = NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        UserContext::new("u1", reference)
    }

    #[test]
    fn test_prompt_contains_reference_and_command() {
        let prompt = build("  crea una tarea  ", &[], &ctx());
        assert_eq!(prompt.system, SYSTEM_PROMPT);
        assert!(prompt.user.contains("2026-10-16T10:00:00 (viernes)"));
        assert!(prompt.user.ends_with("Comando: crea una tarea"));
        assert!(!prompt.user.contains("Fechas detectadas"));
    }

    #[test]
    fn test_prompt_lists_date_mentions() {
        let ctx = ctx();
        let command = "llamar a Juan mañana a las 3pm";
        let mentions = date::scan(command, ctx.reference);
        let prompt = build(command, &mentions, &ctx);
        assert!(prompt
            .user
            .contains("- \"mañana a las 3pm\" = 2026-10-17T15:00:00"));
    }

    #[test]
    fn test_prompt_lists_known_entities_by_kind() {
        let ctx = ctx().with_known(vec![
            KnownEntity::new(EntityKind::Project, "p1", "Casa"),
            KnownEntity::new(EntityKind::Task, "t1", "Informe mensual"),
            KnownEntity::new(EntityKind::Comment, "c1", "no se lista"),
        ]);
        let prompt = build("hola", &[], &ctx);
        assert!(prompt.user.contains("Proyectos existentes:\n- [p1] Casa"));
        assert!(prompt.user.contains("Tareas existentes:\n- [t1] Informe mensual"));
        assert!(!prompt.user.contains("Etiquetas existentes"));
        assert!(!prompt.user.contains("no se lista"));
    }

    #[test]
    fn test_known_entities_are_capped() {
        let known = (0..80)
            .map(|i| KnownEntity::new(EntityKind::Task, i.to_string(), format!("tarea {}", i)))
            .collect();
        let prompt = build("hola", &[], &ctx().with_known(known));
        assert!(prompt.user.contains("tarea 49"));
        assert!(!prompt.user.contains("tarea 50"));
    }
}
