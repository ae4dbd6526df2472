//! daibai: natural-language to SQL for MySQL, backed by pluggable LLM providers

pub mod ai_sql;
pub mod cli;
pub mod config;
pub mod database;
pub mod database_mysql;
pub mod format;
pub mod highlighter;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod repl;

pub use ai_sql::{Agent, AiError, AiResult, GenerationMode};
pub use config::Config;
pub use database::{ConnectionPool, DatabaseDescriptor, DatabaseError, QueryResult, SqlExecutor};
pub use llm::{LlmProvider, ProviderRegistry};
