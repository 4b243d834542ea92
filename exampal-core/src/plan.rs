//! Study-plan extraction from free-form model output.
//!
//! A parse failure is never an error: the plan degrades to the raw text as
//! its overview with no milestones.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::StudyPlan;

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

/// Select the text most likely to hold the plan JSON.
///
/// Prefers the body of the first ```` ```json ```` block, then the first
/// fenced block of any kind (minus its language tag), then the whole text.
pub fn extract_json_block(text: &str) -> &str {
    if let Some((_, after)) = text.split_once(JSON_FENCE) {
        let body = after.split_once(FENCE).map_or(after, |(body, _)| body);
        return body.trim();
    }
    if let Some(segment) = text.split(FENCE).nth(1) {
        return strip_language_tag(segment).trim();
    }
    text.trim()
}

/// Drop a leading `lang` line from a fenced block body.
fn strip_language_tag(segment: &str) -> &str {
    match segment.split_once('\n') {
        Some((first, rest))
            if !first.trim().is_empty()
                && first
                    .trim()
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')) =>
        {
            rest
        }
        _ => segment,
    }
}

/// Parse model output into a study plan, degrading to raw text.
pub fn parse_study_plan(text: &str) -> StudyPlan {
    let candidate = extract_json_block(text);
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => match StudyPlan::deserialize(value) {
            Ok(plan) => {
                debug!(milestones = plan.milestones.len(), "Parsed study plan");
                plan
            }
            Err(e) => {
                warn!(error = %e, "Plan JSON has an unexpected shape, returning raw text");
                StudyPlan::from_raw_text(text)
            }
        },
        Ok(_) => {
            warn!("Plan JSON is not an object, returning raw text");
            StudyPlan::from_raw_text(text)
        }
        Err(e) => {
            warn!(error = %e, "Could not parse JSON from model response, returning raw text");
            StudyPlan::from_raw_text(text)
        }
    }
}
