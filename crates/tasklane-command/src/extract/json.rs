//! Locating JSON inside a free-text model reply.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Upper bound on candidate blocks tried during recovery.
const MAX_CANDIDATES: usize = 16;

/// Upper bound on opening brackets examined by the balanced scan.
const MAX_SCAN_STARTS: usize = 256;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap());

/// The reply as-is, or the content of a single fence wrapping the entire
/// reply, parsed as JSON.
pub(crate) fn strict(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let inner = whole_fence(trimmed)?;
    serde_json::from_str(inner.trim()).ok()
}

/// JSON values found anywhere in the reply, best candidates first: fenced
/// blocks, then balanced bracket spans. Each is also retried with trailing
/// commas removed.
pub(crate) fn recovery_candidates(raw: &str) -> Vec<Value> {
    let mut values = Vec::new();

    for caps in FENCE_RE.captures_iter(raw) {
        if values.len() >= MAX_CANDIDATES {
            return values;
        }
        if let Some(body) = caps.get(1) {
            if let Some(value) = lenient_parse(body.as_str()) {
                values.push(value);
            }
        }
    }

    let bytes = raw.as_bytes();
    let mut pos = 0;
    let mut starts = 0;
    while pos < bytes.len() && values.len() < MAX_CANDIDATES && starts < MAX_SCAN_STARTS {
        if bytes[pos] != b'{' && bytes[pos] != b'[' {
            pos += 1;
            continue;
        }
        starts += 1;
        match balanced_end(bytes, pos) {
            Some(end) => match lenient_parse(&raw[pos..=end]) {
                Some(value) => {
                    values.push(value);
                    pos = end + 1;
                }
                None => pos += 1,
            },
            None => pos += 1,
        }
    }

    values
}

fn whole_fence(text: &str) -> Option<&str> {
    if !text.starts_with("```") || !text.ends_with("```") || text.len() < 6 {
        return None;
    }
    let inner = &text[3..text.len() - 3];
    if inner.contains("```") {
        return None;
    }
    // drop the language tag line
    let body = match inner.find('\n') {
        Some(newline) if !inner[..newline].trim_start().starts_with(['{', '[']) => {
            &inner[newline + 1..]
        }
        _ => inner,
    };
    Some(body)
}

fn lenient_parse(text: &str) -> Option<Value> {
    let text = text.trim();
    serde_json::from_str(text)
        .ok()
        .or_else(|| serde_json::from_str(&strip_trailing_commas(text)).ok())
}

/// Index of the bracket closing the one at `start`, honouring JSON strings.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove commas directly preceding a closing bracket, outside strings.
pub(crate) fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
