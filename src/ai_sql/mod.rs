//! Natural-language to SQL agent
//!
//! The [`Agent`] ties together the pieces a session needs:
//!
//! - a [`ConnectionPool`] with one executor per configured database
//! - a [`ProviderPool`] with one LLM client per configured provider
//! - a [`SchemaTrainer`] that keeps schema text fresh through the on-disk cache
//!
//! ```rust,no_run
//! use daibai::ai_sql::{Agent, GenerationMode};
//! use daibai::config::Config;
//! use daibai::llm::ProviderRegistry;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let agent = Agent::open(&config, ProviderRegistry::builtin()).await;
//! let sql = agent.generate_sql("top 10 customers by revenue", GenerationMode::Sql).await?;
//! let rows = agent.run_sql(&sql, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod extract;
pub mod prompt;
pub mod schema;

pub use cache::{SchemaCache, SchemaRecord};
pub use error::{AiError, AiResult};
pub use extract::{extract_sql, is_destructive};
pub use prompt::{GenerationMode, PromptGenerator, SYSTEM_PROMPT};
pub use schema::{SchemaTrainer, TrainingStats, TrainingStatus};

use crate::config::Config;
use crate::database::{ConnectionPool, Connector, DatabaseError, QueryResult};
use crate::llm::{GenerationContext, LlmProvider, LlmResponse, ProviderPool, ProviderRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One assistant session: current selections plus the pooled resources
pub struct Agent {
    connections: ConnectionPool,
    providers: ProviderPool,
    trainer: SchemaTrainer,
    auto_train: bool,
    current_database: Option<String>,
    current_provider: Option<String>,
}

impl Agent {
    /// Agent backed by MySQL connections. Nothing is connected yet.
    pub fn new(config: &Config, registry: ProviderRegistry) -> Self {
        Self::from_parts(config, registry, ConnectionPool::mysql(config.databases.clone()))
    }

    /// Agent whose executors come from `connector`
    pub fn with_connector(config: &Config, registry: ProviderRegistry, connector: Connector) -> Self {
        Self::from_parts(
            config,
            registry,
            ConnectionPool::new(config.databases.clone(), connector),
        )
    }

    fn from_parts(config: &Config, registry: ProviderRegistry, connections: ConnectionPool) -> Self {
        let current_database = config
            .default_database
            .clone()
            .filter(|name| connections.contains(name));
        let current_provider = config
            .default_llm
            .clone()
            .filter(|name| config.llm_providers.contains_key(name));

        debug!(
            "[Agent::new] {} databases, {} providers, starting on {:?} / {:?}",
            config.databases.len(),
            config.llm_providers.len(),
            current_database,
            current_provider
        );

        Self {
            connections,
            providers: ProviderPool::new(config.llm_providers.clone(), registry),
            trainer: SchemaTrainer::new(
                SchemaCache::new(&config.memory_dir),
                config.schema_cache.max_age_hours,
            ),
            auto_train: config.agent.auto_train,
            current_database,
            current_provider,
        }
    }

    /// [`Agent::new`], then train the startup database when `agent.auto_train` is set.
    /// A training failure is logged and leaves the agent usable.
    pub async fn open(config: &Config, registry: ProviderRegistry) -> Self {
        let agent = Self::new(config, registry);
        agent.auto_train_current().await;
        agent
    }

    pub async fn auto_train_current(&self) {
        if !self.auto_train {
            return;
        }
        let Some(db) = self.current_database.as_deref() else {
            return;
        };
        if let Err(e) = self.trainer.ensure_trained(&self.connections, db).await {
            warn!("Could not train schema for '{}': {}", db, e);
        }
    }

    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    pub fn current_provider(&self) -> Option<&str> {
        self.current_provider.as_deref()
    }

    pub fn databases(&self) -> Vec<String> {
        self.connections.names()
    }

    pub fn providers(&self) -> Vec<String> {
        self.providers.names()
    }

    /// Select another database. Training happens on first use.
    pub fn switch_database(&mut self, name: &str) -> AiResult<()> {
        if !self.connections.contains(name) {
            return Err(AiError::UnknownDatabase {
                name: name.to_string(),
                available: self.databases(),
            });
        }
        info!("Switched to database '{}'", name);
        self.current_database = Some(name.to_string());
        Ok(())
    }

    pub fn switch_provider(&mut self, name: &str) -> AiResult<()> {
        if !self.providers.contains(name) {
            return Err(AiError::UnknownProvider {
                name: name.to_string(),
                available: self.providers(),
            });
        }
        info!("Switched to LLM provider '{}'", name);
        self.current_provider = Some(name.to_string());
        Ok(())
    }

    fn resolve_database(&self, db_name: Option<&str>) -> AiResult<String> {
        match db_name {
            Some(name) if self.connections.contains(name) => Ok(name.to_string()),
            Some(name) => Err(AiError::UnknownDatabase {
                name: name.to_string(),
                available: self.databases(),
            }),
            None => self
                .current_database
                .clone()
                .ok_or(AiError::NoDatabaseSelected),
        }
    }

    fn provider(&self) -> AiResult<Arc<dyn LlmProvider>> {
        let name = self
            .current_provider
            .as_deref()
            .ok_or(AiError::NoProviderSelected)?;
        Ok(self.providers.get_or_create(name)?)
    }

    /// Send `prompt` to the current provider with the current database's
    /// schema attached to `context`.
    pub async fn generate(&self, prompt: &str, mut context: GenerationContext) -> AiResult<LlmResponse> {
        let provider = self.provider()?;

        if context.schema.is_none() {
            if let Some(db) = self.current_database.as_deref() {
                match self.trainer.ensure_trained(&self.connections, db).await {
                    Ok(()) => context.schema = self.trainer.schema(db),
                    Err(e) => warn!("Generating without schema for '{}': {}", db, e),
                }
            }
        }

        debug!(
            "[Agent::generate] {} / {} with {} chars of schema",
            provider.provider_name(),
            provider.model_name(),
            context.schema.as_ref().map(|s| s.len()).unwrap_or(0)
        );
        Ok(provider.generate(prompt, &context).await?)
    }

    /// Ask the current provider for one statement of the given kind and
    /// return just the SQL.
    pub async fn generate_sql(&self, request: &str, mode: GenerationMode) -> AiResult<String> {
        let prompt = PromptGenerator::sql_prompt(request, mode, self.current_database.as_deref());
        let context = GenerationContext::default().with_system_prompt(SYSTEM_PROMPT);
        let response = self.generate(&prompt, context).await?;

        Ok(match response.sql {
            Some(sql) => sql,
            None => extract_sql(&response.text),
        })
    }

    /// Run `sql` on `db_name`, or the current database
    pub async fn run_sql(&self, sql: &str, db_name: Option<&str>) -> AiResult<QueryResult> {
        let db = self.resolve_database(db_name)?;
        let runner = self
            .connections
            .runner(&db)
            .ok_or(AiError::NoDatabaseSelected)?;
        debug!("[Agent::run_sql] '{}': {}", db, sql);
        Ok(runner.run_sql(sql).await?)
    }

    /// [`Agent::run_sql`] on its own task; await the handle for the result
    pub fn spawn_sql(
        &self,
        sql: &str,
        db_name: Option<&str>,
    ) -> AiResult<JoinHandle<Result<QueryResult, DatabaseError>>> {
        let db = self.resolve_database(db_name)?;
        self.connections
            .spawn_sql(&db, sql.to_string())
            .ok_or(AiError::NoDatabaseSelected)
    }

    pub async fn list_tables(&self, db_name: Option<&str>) -> AiResult<Vec<String>> {
        let db = self.resolve_database(db_name)?;
        let runner = self
            .connections
            .runner(&db)
            .ok_or(AiError::NoDatabaseSelected)?;
        Ok(schema::list_tables(runner.as_ref()).await?)
    }

    /// Schema text for `db_name` (or the current database), training first
    /// when needed. Empty when no database is selected.
    pub async fn get_schema(&self, db_name: Option<&str>, refresh: bool) -> AiResult<String> {
        let db = match self.resolve_database(db_name) {
            Ok(db) => db,
            Err(AiError::NoDatabaseSelected) => return Ok(String::new()),
            Err(e) => return Err(e),
        };
        if refresh {
            self.trainer.refresh_schema(&self.connections, &db).await?;
        }
        self.trainer.ensure_trained(&self.connections, &db).await?;
        Ok(self.trainer.schema(&db).unwrap_or_default())
    }

    pub async fn train_schema(&self, db_name: Option<&str>) -> AiResult<TrainingStats> {
        let db = self.resolve_database(db_name)?;
        self.trainer.train_schema(&self.connections, &db).await
    }

    pub async fn refresh_schema(&self, db_name: Option<&str>) -> AiResult<TrainingStats> {
        let db = self.resolve_database(db_name)?;
        self.trainer.refresh_schema(&self.connections, &db).await
    }

    /// False when no database is selected
    pub fn is_trained(&self, db_name: Option<&str>) -> bool {
        self.resolve_database(db_name)
            .map(|db| self.trainer.is_trained(&db))
            .unwrap_or(false)
    }

    /// Training state of every configured database
    pub fn training_status(&self) -> BTreeMap<String, TrainingStatus> {
        self.trainer.training_status(&self.databases())
    }

    pub fn is_destructive(&self, sql: &str) -> bool {
        is_destructive(sql)
    }

    /// Close every open connection. Calling it again is harmless.
    pub async fn close(&self) {
        self.connections.close_all().await;
    }
}
