//! Request pipeline: validate, connect, run the agent, format the answer.

use std::sync::Arc;

use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::agent::{format_response, Agent, FewShotCatalogue, GuardedPromptBuilder, LoopStatus};
use crate::config::Config;
use crate::db::{self, ConfigError, ConnectionError, ConnectionFactory, ConnectionParams, Connector};
use crate::llm::{LlmClient, LlmError, OpenRouterClient};

/// A validated question plus the credentials to answer it with.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub connection: ConnectionParams,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid request body: {0}")]
    Body(String),
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not connect to the database: {0}")]
    Connection(ConnectionError),

    #[error("Internal server error")]
    Internal,
}

impl From<ConnectionError> for AnswerError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::Config(config) => AnswerError::Config(config),
            other => AnswerError::Connection(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid few-shot catalogue: {0}")]
    Catalogue(#[from] serde_yaml::Error),

    #[error("Could not create LLM client: {0}")]
    Llm(#[from] LlmError),
}

/// Shared, read-only state for answering questions. One per process.
pub struct AnswerService {
    config: Arc<Config>,
    factory: ConnectionFactory,
    prompts: GuardedPromptBuilder,
    agent: Agent,
}

impl AnswerService {
    pub fn new(
        config: Config,
        llm: Arc<dyn LlmClient>,
        connector: Arc<dyn Connector>,
        catalogue: FewShotCatalogue,
    ) -> Self {
        let factory = ConnectionFactory::new(config.database.driver, connector);
        let prompts = GuardedPromptBuilder::new(Arc::new(catalogue));
        let agent = Agent::new(llm, &config.llm, &config.agent);
        Self {
            config: Arc::new(config),
            factory,
            prompts,
            agent,
        }
    }

    /// Wire up the production LLM client, connector and built-in catalogue.
    pub fn from_config(config: Config) -> Result<Self, SetupError> {
        let llm = Arc::new(OpenRouterClient::new(&config.llm)?);
        let connector = db::connector_for(&config.database);
        let catalogue = FewShotCatalogue::builtin()?;
        tracing::info!(
            "Loaded few-shot catalogue v{} ({} examples)",
            catalogue.version,
            catalogue.examples.len()
        );
        Ok(Self::new(config, llm, connector, catalogue))
    }

    /// Answer one question. The connection lives only for this call.
    pub async fn answer(&self, request: AnswerRequest) -> Result<String, AnswerError> {
        let span = tracing::info_span!("answer", request_id = %Uuid::new_v4());
        self.answer_inner(request).instrument(span).await
    }

    async fn answer_inner(&self, request: AnswerRequest) -> Result<String, AnswerError> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(ValidationError::MissingField("question").into());
        }

        let db = self.factory.open(&request.connection).await?;
        let prompt = self
            .prompts
            .build(db.dialect(), self.config.agent.result_row_limit);

        tracing::info!(
            "Answering question ({} chars) with few-shot catalogue v{}",
            question.len(),
            self.prompts.catalogue_version()
        );
        let result = self.agent.run(question, &prompt, db.as_ref()).await;
        drop(db);

        if result.status == LoopStatus::Completed {
            tracing::info!("Answer ready after {} steps", result.transcript.len());
        }
        Ok(format_response(&result))
    }

    /// Connection check for the HTTP surface; never fails.
    pub async fn test_connection(&self, params: &ConnectionParams) -> String {
        self.factory.validation_status(params).await
    }
}
