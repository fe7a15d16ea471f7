//! Parses one model turn in the Thought / Action / Action Input / Final Answer format.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::tools::{ToolCall, ToolKind};

static FINAL_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Final Answer\s*:\s*(.*)").unwrap());
static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:\s*(.*?)\s*Action\s*\d*\s*Input\s*\d*\s*:[ \t]*(.*)").unwrap()
});
static BARE_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Action\s*\d*\s*:").unwrap());
static OBSERVATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*Observation\s*:").unwrap());
static THOUGHT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Thought\s*:\s*").unwrap());

/// A well-formed model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    Act { thought: String, call: ToolCall },
    Finish { thought: String, answer: String },
}

/// A turn the loop cannot act on. Display is the corrective observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("Invalid Format: Missing 'Action Input:' after 'Action:'")]
    MissingActionInput,

    #[error("{name} is not a valid tool, try one of [{tools}].", tools = ToolKind::names())]
    UnknownTool { name: String },

    #[error("Invalid Format: the response contained both a final answer and an action. Respond with exactly one of them.")]
    Ambiguous,

    #[error("Invalid Format: Respond with either 'Action:' and 'Action Input:' lines, or a 'Final Answer:' line.")]
    Malformed,
}

impl ParseFailure {
    pub fn corrective_observation(&self) -> String {
        self.to_string()
    }
}

/// Everything the model wrote before it started inventing observations.
pub fn strip_observations(raw: &str) -> &str {
    match OBSERVATION.find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    }
}

pub fn parse_step(raw: &str) -> Result<AgentStep, ParseFailure> {
    let text = strip_observations(raw);
    let final_answer = FINAL_ANSWER.captures(text);
    let action = ACTION.captures(text);

    match (final_answer, action) {
        (Some(_), Some(_)) => Err(ParseFailure::Ambiguous),
        (Some(caps), None) => {
            let start = caps.get(0).map_or(0, |m| m.start());
            if BARE_ACTION.is_match(&text[..start]) {
                return Err(ParseFailure::Ambiguous);
            }
            Ok(AgentStep::Finish {
                thought: thought(&text[..start]),
                answer: caps[1].trim().to_string(),
            })
        }
        (None, Some(caps)) => {
            let start = caps.get(0).map_or(0, |m| m.start());
            let name = caps[1].lines().next().unwrap_or_default().trim();
            let tool = ToolKind::from_name(name).ok_or_else(|| ParseFailure::UnknownTool {
                name: name.to_string(),
            })?;
            Ok(AgentStep::Act {
                thought: thought(&text[..start]),
                call: ToolCall {
                    tool,
                    argument: caps[2].trim().to_string(),
                },
            })
        }
        (None, None) if BARE_ACTION.is_match(text) => Err(ParseFailure::MissingActionInput),
        (None, None) => Err(ParseFailure::Malformed),
    }
}

fn thought(prefix: &str) -> String {
    THOUGHT_LABEL.replace(prefix, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_action_with_a_thought() {
        let step = parse_step(
            "I should look at the customer table.\nAction: execute_query\nAction Input: SELECT name FROM customer LIMIT 5;",
        )
        .unwrap();
        assert_eq!(
            step,
            AgentStep::Act {
                thought: "I should look at the customer table.".into(),
                call: ToolCall {
                    tool: ToolKind::ExecuteQuery,
                    argument: "SELECT name FROM customer LIMIT 5;".into(),
                },
            }
        );
    }

    #[test]
    fn keeps_multiline_sql_arguments() {
        let step = parse_step(
            "Thought: join them\nAction: check_query\nAction Input: SELECT c.name\nFROM customer c\nJOIN invoice i ON i.customer_id = c.customer_id",
        )
        .unwrap();
        match step {
            AgentStep::Act { thought, call } => {
                assert_eq!(thought, "join them");
                assert_eq!(call.tool, ToolKind::CheckQuery);
                assert!(call.argument.ends_with("i.customer_id = c.customer_id"));
                assert_eq!(call.argument.lines().count(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_action_input_is_allowed() {
        let step = parse_step("Action: list_tables\nAction Input: ").unwrap();
        assert_eq!(
            step,
            AgentStep::Act {
                thought: String::new(),
                call: ToolCall {
                    tool: ToolKind::ListTables,
                    argument: String::new(),
                },
            }
        );
    }

    #[test]
    fn parses_a_final_answer() {
        let step = parse_step("Thought: I now know the final answer\nFinal Answer: There are 3 customers.").unwrap();
        assert_eq!(
            step,
            AgentStep::Finish {
                thought: "I now know the final answer".into(),
                answer: "There are 3 customers.".into(),
            }
        );
    }

    #[test]
    fn ignores_hallucinated_observations() {
        let step = parse_step(
            "Action: list_tables\nAction Input: \nObservation: customer\nThought: done\nFinal Answer: customer",
        )
        .unwrap();
        assert!(matches!(step, AgentStep::Act { .. }));
    }

    #[test]
    fn unknown_tools_are_parse_failures() {
        let failure = parse_step("Action: drop_everything\nAction Input: now").unwrap_err();
        assert_eq!(
            failure,
            ParseFailure::UnknownTool {
                name: "drop_everything".into()
            }
        );
        assert_eq!(
            failure.corrective_observation(),
            "drop_everything is not a valid tool, try one of [list_tables, describe_table, check_query, execute_query]."
        );
    }

    #[test]
    fn both_markers_are_ambiguous() {
        assert_eq!(
            parse_step("Action: execute_query\nAction Input: SELECT 1\nFinal Answer: 1"),
            Err(ParseFailure::Ambiguous)
        );
        assert_eq!(
            parse_step("Action: execute_query\nFinal Answer: 1"),
            Err(ParseFailure::Ambiguous)
        );
    }

    #[test]
    fn reports_missing_input_and_malformed_text() {
        assert_eq!(
            parse_step("Action: execute_query"),
            Err(ParseFailure::MissingActionInput)
        );
        assert_eq!(
            parse_step("Sure! Here is a poem about databases."),
            Err(ParseFailure::Malformed)
        );
        assert_eq!(parse_step(""), Err(ParseFailure::Malformed));
    }
}
