//! Agent module - the ReAct loop that answers questions through SQL tools.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build a guarded prompt with safety rules and few-shot examples
//! 2. Ask the LLM for its next step in the Thought / Action / Final Answer format
//! 3. If the step names a tool, run it against the request's connection and feed
//!    the observation back; malformed steps get a corrective observation instead
//! 4. Repeat until a final answer, the step ceiling, the parse-retry budget or
//!    the deadline is reached

mod agent_loop;
mod examples;
mod formatter;
mod parser;
mod prompt;
mod transcript;

pub use agent_loop::{AbortReason, Agent, LoopBudget, LoopResult, LoopStatus};
pub use examples::{ExampleCategory, FewShotCatalogue, FewShotExample};
pub use formatter::{format_response, FALLBACK_MESSAGE, STOP_MARKER};
pub use parser::{parse_step, AgentStep, ParseFailure};
pub use prompt::{GuardedPromptBuilder, PromptSpec, REFUSAL};
pub use transcript::{Step, Transcript};
