//! Pull a JSON object out of free-form model text.
//!
//! Models wrap their answer in prose or Markdown fences, and sometimes emit a
//! stray object before the real one. Candidates are found by matching braces
//! while respecting string literals and escapes, so a `}` inside a quoted
//! value does not end the object early. The first candidate that parses wins;
//! if it does not parse, scanning resumes after its closing brace, so objects
//! nested inside a rejected candidate are never returned on their own.

use serde_json::Value;
use tripforge_core::trip::TripPlan;

/// First well-formed JSON object in `raw`, if any.
pub fn extract(raw: &str) -> Option<Value> {
    candidates(raw).find_map(|candidate| match serde_json::from_str(candidate) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    })
}

/// First object in `raw` that deserializes as a [`TripPlan`].
///
/// The plan is not validated here.
pub fn extract_plan(raw: &str) -> Option<TripPlan> {
    candidates(raw).find_map(|candidate| serde_json::from_str(candidate).ok())
}

/// Top-level balanced `{...}` spans, left to right.
///
/// An opening brace that never balances ends the scan: every later brace
/// sits inside it.
fn candidates(raw: &str) -> impl Iterator<Item = &str> {
    let mut from = 0;
    std::iter::from_fn(move || {
        let start = from + raw.get(from..)?.find('{')?;
        let len = balanced_len(&raw[start..])?;
        from = start + len;
        Some(&raw[start..from])
    })
}

/// Byte length of the object starting at `text[0] == '{'`, or `None` when the
/// braces never balance.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
