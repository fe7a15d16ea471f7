//! Per-run history of reasoning steps.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::tools::{Observation, ToolCall};

#[derive(Debug, Clone)]
pub struct Step {
    pub thought: String,
    /// Always a registered tool; rejected turns carry `None`.
    pub action: Option<ToolCall>,
    pub observation: Option<Observation>,
    pub at: DateTime<Utc>,
}

impl Step {
    pub fn action(thought: String, call: ToolCall, observation: Observation) -> Self {
        Self {
            thought,
            action: Some(call),
            observation: Some(observation),
            at: Utc::now(),
        }
    }

    /// A turn that could not be parsed, answered with a corrective observation.
    pub fn correction(thought: String, observation: Observation) -> Self {
        Self {
            thought,
            action: None,
            observation: Some(observation),
            at: Utc::now(),
        }
    }

    pub fn finish(thought: String) -> Self {
        Self {
            thought,
            action: None,
            observation: None,
            at: Utc::now(),
        }
    }

    fn render(&self, out: &mut String) {
        if !self.thought.is_empty() {
            out.push_str(&self.thought);
            out.push('\n');
        }
        if let Some(call) = &self.action {
            out.push_str(&format!(
                "Action: {}\nAction Input: {}\n",
                call.tool, call.argument
            ));
        }
        if let Some(observation) = &self.observation {
            out.push_str(&format!("Observation: {}\nThought: ", observation));
        }
    }
}

/// Append-only list of steps owned by a single loop run.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    steps: Vec<Step>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Tool calls made so far.
    pub fn actions(&self) -> impl Iterator<Item = &ToolCall> {
        self.steps.iter().filter_map(|s| s.action.as_ref())
    }

    /// The scratchpad the model continues from.
    pub fn scratchpad(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            step.render(&mut out);
        }
        out
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "[{}] {}", i + 1, step.at.to_rfc3339())?;
            if !step.thought.is_empty() {
                writeln!(f, "  thought: {}", step.thought)?;
            }
            if let Some(call) = &step.action {
                writeln!(f, "  action: {}({})", call.tool, call.argument)?;
            }
            if let Some(observation) = &step.observation {
                writeln!(f, "  observation: {}", observation)?;
            }
        }
        Ok(())
    }
}
