//! Extraction of structured actions from a model reply.
//!
//! The model is asked for a JSON envelope
//! `{"actions": [...], "ambiguous": bool, "clarification": string?}`.
//! Parsing first tries the reply strictly, then falls back to locating JSON
//! inside surrounding prose. Every action is validated on its own; invalid
//! ones are dropped and reported without failing the rest.

mod json;
mod validate;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::{Action, DroppedAction, ParseQuality};

/// Confidence given to actions that report none, when the envelope does
/// not carry one either.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Result of parsing one reply. Never an error: total failure is
/// `quality == Unparsable` with no actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub actions: Vec<Action>,
    pub quality: ParseQuality,
    pub dropped: Vec<DroppedAction>,
    /// The model itself flagged the command as ambiguous.
    pub ambiguous: bool,
    pub clarification: Option<String>,
}

impl ParseOutcome {
    pub fn unparsable() -> Self {
        Self {
            actions: Vec::new(),
            quality: ParseQuality::Unparsable,
            dropped: Vec::new(),
            ambiguous: false,
            clarification: None,
        }
    }
}

/// The recognised top-level shape of a reply.
struct Envelope {
    items: Vec<Value>,
    ambiguous: bool,
    clarification: Option<String>,
    confidence: Option<f64>,
}

impl Envelope {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::bare(items)),
            Value::Object(obj) if obj.contains_key("actions") => Some(Self::from_object(obj)),
            Value::Object(obj) if ["type", "action", "kind"].iter().any(|k| obj.contains_key(*k)) => {
                Some(Self::bare(vec![Value::Object(obj)]))
            }
            Value::Object(obj) if obj.contains_key("clarification") => Some(Self::from_object(obj)),
            _ => None,
        }
    }

    /// Like `from_value`, but arrays found inside prose only count when they
    /// hold at least one object. Footnotes such as `[1]` are skipped.
    fn from_recovered(value: Value) -> Option<Self> {
        match &value {
            Value::Array(items) if !items.iter().any(Value::is_object) => None,
            _ => Self::from_value(value),
        }
    }

    fn bare(items: Vec<Value>) -> Self {
        Self {
            items,
            ambiguous: false,
            clarification: None,
            confidence: None,
        }
    }

    fn from_object(mut obj: Map<String, Value>) -> Self {
        let items = match obj.remove("actions") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single],
        };
        let ambiguous = match obj.get("ambiguous") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        let clarification = obj
            .get("clarification")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let confidence = validate::confidence(obj.get("confidence")).ok().flatten();
        Self {
            items,
            ambiguous,
            clarification,
            confidence,
        }
    }
}

/// Parses model replies against a fixed reference instant, used to resolve
/// relative dates inside payloads.
#[derive(Debug, Clone, Copy)]
pub struct ResponseParser {
    reference: NaiveDateTime,
}

impl ResponseParser {
    pub fn new(reference: NaiveDateTime) -> Self {
        Self { reference }
    }

    pub fn parse(&self, raw: &str) -> ParseOutcome {
        if let Some(envelope) = json::strict(raw).and_then(Envelope::from_value) {
            return self.finish(envelope, ParseQuality::Clean);
        }

        for candidate in json::recovery_candidates(raw) {
            if let Some(envelope) = Envelope::from_recovered(candidate) {
                debug!("Recovered structured block from surrounding text");
                return self.finish(envelope, ParseQuality::Recovered);
            }
        }

        debug!(bytes = raw.len(), "Reply contains no structured block");
        ParseOutcome::unparsable()
    }

    fn finish(&self, envelope: Envelope, quality: ParseQuality) -> ParseOutcome {
        let default_confidence = envelope.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        let mut actions = Vec::with_capacity(envelope.items.len());
        let mut dropped = Vec::new();

        for (index, item) in envelope.items.iter().enumerate() {
            match validate::action(item, self.reference, default_confidence) {
                Ok(action) => actions.push(action),
                Err(e) => {
                    warn!(index, error = %e, "Dropping invalid action");
                    dropped.push(DroppedAction::new(index, e));
                }
            }
        }

        ParseOutcome {
            actions,
            quality,
            dropped,
            ambiguous: envelope.ambiguous,
            clarification: envelope.clarification,
        }
    }
}

/// Parse `raw` against `reference`.
pub fn parse(raw: &str, reference: NaiveDateTime) -> ParseOutcome {
    ResponseParser::new(reference).parse(raw)
}
