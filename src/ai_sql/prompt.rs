//! Prompt construction for SQL generation

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub const SYSTEM_PROMPT: &str = "You are an expert SQL developer. Generate clean, efficient SQL.";

/// Kind of statement the model is asked for
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GenerationMode {
    /// SELECT queries only
    #[default]
    Sql,
    /// CREATE / ALTER / DROP and views
    Ddl,
    /// INSERT / UPDATE / DELETE
    Crud,
}

impl GenerationMode {
    pub fn instruction(&self) -> &'static str {
        match self {
            GenerationMode::Sql => "Generate ONLY a SELECT query for this request.",
            GenerationMode::Ddl => {
                "Generate ONLY DDL (CREATE VIEW, CREATE TABLE, ALTER, DROP) for this request. \
                 Use CREATE OR REPLACE VIEW when creating views."
            }
            GenerationMode::Crud => {
                "Generate ONLY an INSERT, UPDATE, or DELETE statement for this request. \
                 CRITICAL: Always include appropriate WHERE clauses."
            }
        }
    }
}

/// Prompt generator for SQL requests
pub struct PromptGenerator;

impl PromptGenerator {
    /// Instruction, target database, request, and the fenced-reply framing
    pub fn sql_prompt(request: &str, mode: GenerationMode, database: Option<&str>) -> String {
        format!(
            "{}\nDatabase: {}\n\nRequest: {}\n\nReturn the SQL in a ```sql code block. Do not execute it.",
            mode.instruction(),
            database.unwrap_or("unknown"),
            request
        )
    }
}
