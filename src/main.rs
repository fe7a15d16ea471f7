//! `sql-answer` binary: configuration comes from the environment, answers
//! are served over HTTP.

use std::sync::Arc;

use sql_answer::{answer::AnswerService, api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sql_answer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);
    info!(
        "Loaded configuration: model={} driver={} max_steps={}",
        config.llm.model, config.database.driver, config.agent.max_reasoning_steps
    );

    // A broken few-shot catalogue or LLM client fails here, before binding.
    let service = Arc::new(AnswerService::from_config(config)?);

    api::serve(&addr, service).await
}
