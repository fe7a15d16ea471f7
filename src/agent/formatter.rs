//! Turns a loop result into the text returned to the user.

use super::{LoopResult, LoopStatus};

/// Internal marker for a run that was cut short.
pub const STOP_MARKER: &str = "Agent stopped";

pub const FALLBACK_MESSAGE: &str =
    "It seems the request took longer than expected. Please try rephrasing your question.";

pub fn format_response(result: &LoopResult) -> String {
    match result.status {
        LoopStatus::Completed if !result.final_text.contains(STOP_MARKER) => {
            result.final_text.clone()
        }
        _ => FALLBACK_MESSAGE.to_string(),
    }
}
