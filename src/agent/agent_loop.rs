//! Core agent loop implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AgentConfig, LlmConfig};
use crate::db::SqlDatabase;
use crate::llm::{ChatMessage, CompletionOptions, LlmClient};
use crate::tools::{Observation, ToolLimits, ToolRegistry};

use super::parser::{parse_step, strip_observations, AgentStep};
use super::prompt::{PromptSpec, INITIAL_THOUGHT};
use super::transcript::{Step, Transcript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    Completed,
    Aborted,
}

/// Why a run ended without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    StepLimit,
    ParseRetriesExhausted,
    Deadline,
    LlmUnavailable,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StepLimit => "iteration limit reached",
            Self::ParseRetriesExhausted => "too many unparsable responses",
            Self::Deadline => "time limit reached",
            Self::LlmUnavailable => "LLM unavailable",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoopResult {
    pub status: LoopStatus,
    /// Empty unless the run completed.
    pub final_text: String,
    pub abort_reason: Option<AbortReason>,
    pub transcript: Transcript,
}

impl LoopResult {
    fn completed(answer: String, transcript: Transcript) -> Self {
        Self {
            status: LoopStatus::Completed,
            final_text: answer,
            abort_reason: None,
            transcript,
        }
    }

    fn aborted(reason: AbortReason, transcript: Transcript) -> Self {
        Self {
            status: LoopStatus::Aborted,
            final_text: String::new(),
            abort_reason: Some(reason),
            transcript,
        }
    }
}

/// Bounds on a single run.
#[derive(Debug, Clone)]
pub struct LoopBudget {
    pub max_reasoning_steps: usize,
    pub max_parse_retries: usize,
    pub deadline: Duration,
    pub llm_timeout: Duration,
    pub llm_attempts: usize,
}

impl LoopBudget {
    pub fn new(agent: &AgentConfig, llm: &LlmConfig) -> Self {
        Self {
            max_reasoning_steps: agent.max_reasoning_steps,
            max_parse_retries: agent.max_parse_retries,
            deadline: agent.loop_deadline,
            llm_timeout: llm.timeout,
            llm_attempts: llm.max_attempts,
        }
    }
}

/// The ReAct agent. Shared across requests; each `run` owns its own transcript.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    model: String,
    options: CompletionOptions,
    tools: ToolRegistry,
    budget: LoopBudget,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, llm_config: &LlmConfig, agent_config: &AgentConfig) -> Self {
        Self {
            llm,
            model: llm_config.model.clone(),
            options: CompletionOptions {
                temperature: Some(llm_config.temperature),
                stop: vec!["\nObservation:".to_string()],
                max_tokens: None,
            },
            tools: ToolRegistry::new(ToolLimits::from(agent_config)),
            budget: LoopBudget::new(agent_config, llm_config),
        }
    }

    /// Run until a final answer or a stop condition. Never fails.
    pub async fn run(&self, question: &str, prompt: &PromptSpec, db: &dyn SqlDatabase) -> LoopResult {
        let mut transcript = Transcript::new();
        let outcome = tokio::time::timeout(
            self.budget.deadline,
            self.drive(question, prompt, db, &mut transcript),
        )
        .await
        .unwrap_or(Err(AbortReason::Deadline));

        match outcome {
            Ok(answer) => {
                tracing::debug!("Agent finished after {} steps", transcript.len());
                LoopResult::completed(answer, transcript)
            }
            Err(reason) => {
                tracing::warn!(
                    "Agent aborted ({}) after {} steps. Transcript:\n{}",
                    reason,
                    transcript.len(),
                    transcript
                );
                LoopResult::aborted(reason, transcript)
            }
        }
    }

    async fn drive(
        &self,
        question: &str,
        prompt: &PromptSpec,
        db: &dyn SqlDatabase,
        transcript: &mut Transcript,
    ) -> Result<String, AbortReason> {
        let directive = prompt.system_directive();
        let max_observation = self.tools.limits().max_observation_chars;
        let mut steps = 0usize;
        let mut parse_failures = 0usize;

        loop {
            if steps >= self.budget.max_reasoning_steps {
                return Err(AbortReason::StepLimit);
            }
            tracing::debug!("Agent iteration {}", steps + 1);

            let messages = vec![
                ChatMessage::system(directive.as_str()),
                ChatMessage::user(user_turn(question, transcript)),
            ];
            let raw = self.complete(&messages).await?;

            match parse_step(&raw) {
                Ok(AgentStep::Finish { thought, answer }) => {
                    transcript.push(Step::finish(thought));
                    return Ok(answer);
                }
                Ok(AgentStep::Act { thought, call }) => {
                    let observation = self.tools.invoke(&call, db).await;
                    transcript.push(Step::action(thought, call, observation));
                    steps += 1;
                }
                Err(failure) => {
                    parse_failures += 1;
                    tracing::warn!(
                        "Unparsable agent step ({}/{}): {}",
                        parse_failures,
                        self.budget.max_parse_retries,
                        failure
                    );
                    if parse_failures > self.budget.max_parse_retries {
                        return Err(AbortReason::ParseRetriesExhausted);
                    }
                    transcript.push(Step::correction(
                        strip_observations(&raw).trim().to_string(),
                        Observation::bounded(failure.corrective_observation(), max_observation),
                    ));
                }
            }
        }
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AbortReason> {
        let attempts = self.budget.llm_attempts.max(1);
        for attempt in 1..=attempts {
            let call = self.llm.chat_completion(&self.model, messages, &self.options);
            match tokio::time::timeout(self.budget.llm_timeout, call).await {
                Ok(Ok(response)) => return Ok(response.content),
                Ok(Err(e)) => {
                    tracing::warn!("LLM call failed (attempt {}/{}): {}", attempt, attempts, e)
                }
                Err(_) => tracing::warn!(
                    "LLM call timed out after {:?} (attempt {}/{})",
                    self.budget.llm_timeout,
                    attempt,
                    attempts
                ),
            }
        }
        Err(AbortReason::LlmUnavailable)
    }
}

fn user_turn(question: &str, transcript: &Transcript) -> String {
    format!(
        "Question: {}\nThought: {}\n{}",
        question,
        INITIAL_THOUGHT,
        transcript.scratchpad()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{format_response, FewShotCatalogue, GuardedPromptBuilder, FALLBACK_MESSAGE};
    use crate::config::Config;
    use crate::db::{Dialect, Driver};
    use crate::llm::LlmError;
    use crate::testing::{customer_count, open_sqlite, seeded_sqlite, RecordingDatabase, ScriptedLlm};
    use crate::tools::ToolKind;

    fn config() -> Config {
        Config::new("test-key".into(), "test-model".into(), Driver::Sqlite)
    }

    fn agent(llm: Arc<ScriptedLlm>, config: &Config) -> Agent {
        Agent::new(llm, &config.llm, &config.agent)
    }

    fn prompt() -> PromptSpec {
        GuardedPromptBuilder::new(Arc::new(FewShotCatalogue::builtin().unwrap()))
            .build(Dialect::Sqlite, 5)
    }

    #[tokio::test]
    async fn lists_customers_and_finishes() {
        let file = seeded_sqlite();
        let db = RecordingDatabase::new(open_sqlite(&file));
        let llm = Arc::new(ScriptedLlm::new([
            "Action: execute_query\nAction Input: SELECT * FROM customer;",
            "Thought: I now know the final answer\nFinal Answer: There are 3 customers: John Doe, Jane Smith and Alice Johnson.",
        ]));
        let config = config();

        let result = agent(llm.clone(), &config).run("List all customers.", &prompt(), &db).await;

        assert_eq!(result.status, LoopStatus::Completed);
        assert!(result.final_text.contains("3 customers"));
        assert_eq!(db.statements(), vec!["SELECT * FROM customer;"]);
        let observation = result.transcript.steps()[0].observation.as_ref().unwrap();
        assert!(observation.as_str().contains("John Doe"));
        assert!(observation.as_str().contains("Alice Johnson"));
        assert_eq!(llm.calls(), 2);
        assert!(llm.prompts()[1].contains("Observation: [(1, 'John Doe'"));
    }

    #[tokio::test]
    async fn delete_is_rejected_before_reaching_the_database() {
        let file = seeded_sqlite();
        let db = RecordingDatabase::new(open_sqlite(&file));
        let llm = Arc::new(ScriptedLlm::new([
            "Action: execute_query\nAction Input: DELETE FROM customer;",
            "Thought: I am not allowed to change data.\nFinal Answer: I can only read data, so I cannot delete customers.",
        ]));
        let config = config();

        let result = agent(llm, &config).run("Delete all customers.", &prompt(), &db).await;

        assert_eq!(result.status, LoopStatus::Completed);
        assert!(result.final_text.contains("cannot delete"));
        let observation = result.transcript.steps()[0].observation.as_ref().unwrap();
        assert!(observation.is_error());
        assert!(observation.as_str().contains("DELETE"));
        assert!(db.statements().is_empty());
        assert_eq!(customer_count(&file), 3);
    }

    #[tokio::test]
    async fn unparsable_output_aborts_after_the_retry_budget() {
        let file = seeded_sqlite();
        let db = open_sqlite(&file);
        let llm = Arc::new(ScriptedLlm::repeating("I'd love to help with that!"));
        let config = config();
        let agent = agent(llm.clone(), &config);

        let result = agent.run("How many customers?", &prompt(), &db).await;

        assert_eq!(result.status, LoopStatus::Aborted);
        assert_eq!(result.abort_reason, Some(AbortReason::ParseRetriesExhausted));
        assert!(result.final_text.is_empty());
        assert_eq!(llm.calls(), config.agent.max_parse_retries + 1);
        assert_eq!(result.transcript.len(), config.agent.max_parse_retries);
        assert_eq!(format_response(&result), FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn unknown_tool_gets_a_corrective_observation() {
        let file = seeded_sqlite();
        let db = open_sqlite(&file);
        let llm = Arc::new(ScriptedLlm::new([
            "Action: sql_db_query\nAction Input: SELECT 1",
            "Action: list_tables\nAction Input: ",
            "Final Answer: The database has customer and invoice tables.",
        ]));
        let config = config();

        let result = agent(llm.clone(), &config).run("What tables exist?", &prompt(), &db).await;

        assert_eq!(result.status, LoopStatus::Completed);
        let steps = result.transcript.steps();
        assert!(steps[0].action.is_none());
        assert!(steps[0]
            .observation
            .as_ref()
            .unwrap()
            .as_str()
            .contains("sql_db_query is not a valid tool"));
        assert_eq!(steps[1].action.as_ref().unwrap().tool, ToolKind::ListTables);
        assert_eq!(steps[1].observation.as_ref().unwrap().as_str(), "customer, invoice");
        assert!(result
            .transcript
            .actions()
            .all(|call| ToolKind::ALL.contains(&call.tool)));
        assert!(llm.prompts()[1].contains("is not a valid tool, try one of"));
    }

    #[tokio::test]
    async fn never_answering_stops_at_the_step_ceiling() {
        let file = seeded_sqlite();
        let db = open_sqlite(&file);
        let llm = Arc::new(ScriptedLlm::repeating("Action: list_tables\nAction Input: "));
        let mut config = config();
        config.agent.max_reasoning_steps = 4;

        let result = agent(llm.clone(), &config).run("Keep going", &prompt(), &db).await;

        assert_eq!(result.status, LoopStatus::Aborted);
        assert_eq!(result.abort_reason, Some(AbortReason::StepLimit));
        assert_eq!(result.transcript.actions().count(), 4);
        assert_eq!(llm.calls(), 4);
    }

    #[tokio::test]
    async fn llm_failures_abort_after_the_configured_attempts() {
        let file = seeded_sqlite();
        let db = open_sqlite(&file);
        let llm = Arc::new(
            ScriptedLlm::failing().push_error(LlmError::Transport("connection reset".into())),
        );
        let mut config = config();
        config.llm.max_attempts = 2;

        let result = agent(llm.clone(), &config).run("How many customers?", &prompt(), &db).await;

        assert_eq!(result.status, LoopStatus::Aborted);
        assert_eq!(result.abort_reason, Some(AbortReason::LlmUnavailable));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn deadline_aborts_the_run() {
        struct SlowLlm;

        #[async_trait::async_trait]
        impl LlmClient for SlowLlm {
            async fn chat_completion(
                &self,
                _model: &str,
                _messages: &[ChatMessage],
                _options: &CompletionOptions,
            ) -> Result<crate::llm::ChatResponse, LlmError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(LlmError::Empty)
            }
        }

        let file = seeded_sqlite();
        let db = open_sqlite(&file);
        let mut config = config();
        config.agent.loop_deadline = Duration::from_millis(50);
        let agent = Agent::new(Arc::new(SlowLlm), &config.llm, &config.agent);

        let result = agent.run("How many customers?", &prompt(), &db).await;

        assert_eq!(result.abort_reason, Some(AbortReason::Deadline));
    }

    #[tokio::test]
    async fn system_directive_and_question_reach_the_model() {
        let file = seeded_sqlite();
        let db = open_sqlite(&file);
        let llm = Arc::new(ScriptedLlm::new(["Final Answer: I can only answer questions related to SQL database."]));
        let config = config();

        let result = agent(llm.clone(), &config).run("Write me a poem", &prompt(), &db).await;

        assert_eq!(result.status, LoopStatus::Completed);
        let prompts = llm.prompts();
        assert!(prompts[0].starts_with("Question: Write me a poem\nThought: "));
    }
}
