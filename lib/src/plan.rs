//! Plan steps and the conversion of free-form plan text into them.
//!
//! The generation backend is asked for strict JSON of the shape
//! `{"steps": [{"order": 1, "text": "..."}]}`. Responses that fail to parse
//! as JSON fall back to line-based heuristics, and a response yielding no
//! usable steps at all collapses into a single step carrying the plan text.
//! Whatever the path, orders are renumbered to a contiguous 1..N afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ordered, atomic unit of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Position within the plan, 1-based and contiguous after normalization
    pub order: u32,
    /// What this step does
    pub text: String,
}

impl Step {
    /// Create a step
    pub fn new(order: u32, text: impl Into<String>) -> Self {
        Self {
            order,
            text: text.into(),
        }
    }
}

/// Enumerator separators tried against each line in the heuristic path,
/// in priority order.
const SEPARATORS: &[&str] = &[". ", ") ", ".", ")", " - ", " -", "- ", "-"];

/// Convert a raw steps response into a normalized step list.
///
/// `raw` is the backend's response to the steps prompt; `plan_text` is the
/// plan it was derived from, used for the last-resort fallback step. The
/// result is never empty.
pub fn parse_steps(raw: &str, plan_text: &str) -> Vec<Step> {
    let text = strip_code_fences(raw);

    let mut steps = match parse_structured(&text) {
        Ok(steps) => steps,
        Err(_) => {
            tracing::debug!("failed to parse JSON steps; falling back to heuristic parse");
            parse_lines(&text)
        }
    };

    if steps.is_empty() {
        tracing::info!("model returned no steps; creating a single fallback step from plan text");
        let text = plan_text.trim();
        let text = if text.is_empty() { "Plan" } else { text };
        steps.push((1, text.to_string()));
    }

    normalize(steps)
}

/// Render steps as `"{order}. {text}"` lines joined by newlines
pub fn render_plan(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|s| format!("{}. {}", s.order, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strict path: parse the response as JSON and pull usable items out of its
/// `steps` array. A payload that parses but carries no usable items is an
/// empty `Ok`, not an error; only a JSON parse failure selects the heuristic
/// path.
fn parse_structured(text: &str) -> Result<Vec<(i64, String)>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let items = value
        .get("steps")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut steps = Vec::new();
    for item in items {
        let Some(order) = coerce_order(item.get("order")) else {
            continue;
        };
        let Some(text) = coerce_text(item.get("text")) else {
            continue;
        };
        steps.push((order, text));
    }
    Ok(steps)
}

fn coerce_order(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Heuristic path: one step per non-blank line, stripping a leading numeric
/// enumerator when one of the known separators follows it.
fn parse_lines(text: &str) -> Vec<(i64, String)> {
    let mut steps: Vec<(i64, String)> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parsed = None;
        for sep in SEPARATORS {
            if let Some((left, right)) = line.split_once(sep) {
                let left = left.trim();
                if !left.is_empty() && left.chars().all(|c| c.is_ascii_digit()) {
                    if let Ok(order) = left.parse::<i64>() {
                        parsed = Some((order, right.trim().to_string()));
                        break;
                    }
                }
            }
        }

        match parsed {
            Some(step) => steps.push(step),
            None => steps.push((steps.len() as i64 + 1, line.to_string())),
        }
    }
    steps
}

/// Sort by model-returned order, then renumber contiguously from 1. The sort
/// is stable, so ties keep their response order.
fn normalize(mut raw: Vec<(i64, String)>) -> Vec<Step> {
    raw.sort_by_key(|(order, _)| *order);
    raw.into_iter()
        .enumerate()
        .map(|(idx, (_, text))| Step::new(idx as u32 + 1, text))
        .collect()
}

fn strip_code_fences(raw: &str) -> String {
    let s = raw.trim();
    if s.starts_with("```") && s.ends_with("```") {
        let s = s.trim_matches('`');
        let s = match s.split_once('\n') {
            Some((_, rest)) => rest,
            None => s,
        };
        s.trim().to_string()
    } else {
        s.to_string()
    }
}
