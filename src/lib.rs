//! # SQL Answer
//!
//! Answers natural-language questions against a relational database.
//!
//! This library provides:
//! - An HTTP API that accepts a question plus database credentials
//! - A guarded ReAct-style agent loop that drives an LLM through SQL tools
//! - Read-only enforcement of every statement the model proposes
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Open a connection from the request credentials
//! 2. Build a guarded prompt with safety rules and few-shot examples
//! 3. Call the LLM, parse its step, run the named tool against the database
//! 4. Feed the observation back, repeat until a final answer or a stop condition
//!
//! ## Example
//!
//! ```rust,ignore
//! use sql_answer::{answer::AnswerService, config::Config};
//!
//! let config = Config::from_env()?;
//! let service = AnswerService::from_config(config)?;
//! let text = service.answer(request).await?;
//! ```

pub mod agent;
pub mod answer;
pub mod api;
pub mod config;
pub mod db;
pub mod llm;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
