//! Schema training: deciding when a database's DDL must be fetched, and fetching it
//!
//! Training pulls `SHOW TABLES` and one `SHOW CREATE TABLE` per table, joins
//! the DDL into a single text blob and stores it in the [`SchemaCache`]. An
//! in-memory copy plus a "trained" set keep repeat lookups off the database.

use crate::ai_sql::cache::SchemaCache;
use crate::ai_sql::error::{AiError, AiResult};
use crate::database::{ConnectionPool, DatabaseError, SqlExecutor};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Tables beyond this many are left out of the schema text
pub const MAX_SCHEMA_TABLES: usize = 50;

/// Outcome of one DDL fetch; failures are kept so callers can see what was skipped
pub type TableDdl = (String, Result<String, DatabaseError>);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingStats {
    pub database: String,
    /// Tables whose DDL made it into the schema text
    pub tables: usize,
    /// Length of the schema text in characters
    pub schema_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingStatus {
    pub trained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_memory: Option<bool>,
}

impl TrainingStatus {
    pub fn untrained() -> Self {
        Self {
            trained: false,
            tables: None,
            cached_at: None,
            in_memory: None,
        }
    }
}

/// Backtick-quote a MySQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Join successful DDL fetches under `-- Table:` markers; failed tables are left out.
pub fn render_schema(collected: &[TableDdl]) -> (String, usize) {
    let mut parts = Vec::new();
    let mut included = 0;
    for (table, ddl) in collected {
        if let Ok(ddl) = ddl {
            parts.push(format!("\n-- Table: {table}"));
            parts.push(ddl.clone());
            included += 1;
        }
    }
    (parts.join("\n"), included)
}

/// Table names from `SHOW TABLES`
pub async fn list_tables(runner: &dyn SqlExecutor) -> Result<Vec<String>, DatabaseError> {
    let result = runner.run_sql("SHOW TABLES").await?;
    Ok(result.column_values(0))
}

/// `SHOW CREATE TABLE` for each table, collecting per-table failures
pub async fn fetch_table_ddl(runner: &dyn SqlExecutor, tables: &[String]) -> Vec<TableDdl> {
    let mut collected = Vec::with_capacity(tables.len());
    for table in tables {
        let sql = format!("SHOW CREATE TABLE {}", quote_identifier(table));
        let ddl = match runner.run_sql(&sql).await {
            Ok(result) => result.value(0, 1).map(str::to_string).ok_or_else(|| {
                DatabaseError::QueryError(format!("No CREATE statement returned for '{table}'"))
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = &ddl {
            warn!("Skipping table '{}' in schema: {}", table, e);
        }
        collected.push((table.clone(), ddl));
    }
    collected
}

#[derive(Default)]
struct TrainerState {
    trained: HashSet<String>,
    schemas: HashMap<String, String>,
}

pub struct SchemaTrainer {
    cache: SchemaCache,
    max_age_hours: u64,
    state: Mutex<TrainerState>,
}

impl SchemaTrainer {
    pub fn new(cache: SchemaCache, max_age_hours: u64) -> Self {
        Self {
            cache,
            max_age_hours,
            state: Mutex::new(TrainerState::default()),
        }
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    fn state(&self) -> MutexGuard<'_, TrainerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn runner(pool: &ConnectionPool, db_name: &str) -> AiResult<Arc<dyn SqlExecutor>> {
        pool.runner(db_name).ok_or_else(|| AiError::UnknownDatabase {
            name: db_name.to_string(),
            available: pool.names(),
        })
    }

    /// In-memory schema text, if this database was trained in this process
    pub fn schema(&self, db_name: &str) -> Option<String> {
        self.state().schemas.get(db_name).cloned()
    }

    /// No-op when already trained; loads a fresh cache record without
    /// touching the database; otherwise trains.
    pub async fn ensure_trained(&self, pool: &ConnectionPool, db_name: &str) -> AiResult<()> {
        if self.state().trained.contains(db_name) {
            return Ok(());
        }

        if !self.cache.is_stale(db_name, None, self.max_age_hours) {
            if let Some(record) = self.cache.get(db_name) {
                debug!(
                    "[SchemaTrainer::ensure_trained] Using cached schema for '{}' from {}",
                    db_name, record.cached_at
                );
                let mut state = self.state();
                state.schemas.insert(db_name.to_string(), record.schema);
                state.trained.insert(db_name.to_string());
                return Ok(());
            }
        }

        self.train_schema(pool, db_name).await.map(|_| ())
    }

    /// Fetch DDL for up to [`MAX_SCHEMA_TABLES`] tables and store it
    pub async fn train_schema(&self, pool: &ConnectionPool, db_name: &str) -> AiResult<TrainingStats> {
        let runner = Self::runner(pool, db_name)?;
        info!("Training schema for '{}'", db_name);

        let mut tables = list_tables(runner.as_ref()).await?;
        if tables.len() > MAX_SCHEMA_TABLES {
            debug!(
                "[SchemaTrainer::train_schema] '{}' has {} tables, keeping the first {}",
                db_name,
                tables.len(),
                MAX_SCHEMA_TABLES
            );
            tables.truncate(MAX_SCHEMA_TABLES);
        }

        let collected = fetch_table_ddl(runner.as_ref(), &tables).await;
        let (schema, table_count) = render_schema(&collected);

        self.cache.save(db_name, &schema, table_count)?;
        let stats = TrainingStats {
            database: db_name.to_string(),
            tables: table_count,
            schema_size: schema.chars().count(),
        };
        {
            let mut state = self.state();
            state.schemas.insert(db_name.to_string(), schema);
            state.trained.insert(db_name.to_string());
        }

        info!(
            "Trained '{}': {} tables, {} chars",
            db_name, stats.tables, stats.schema_size
        );
        Ok(stats)
    }

    /// Forget the trained flag and cache record, then train again
    pub async fn refresh_schema(&self, pool: &ConnectionPool, db_name: &str) -> AiResult<TrainingStats> {
        Self::runner(pool, db_name)?;
        self.state().trained.remove(db_name);
        self.cache.clear(db_name)?;
        self.train_schema(pool, db_name).await
    }

    /// Trained in this process, or any cache record on disk regardless of age
    pub fn is_trained(&self, db_name: &str) -> bool {
        self.state().trained.contains(db_name) || self.cache.get(db_name).is_some()
    }

    pub fn training_status(&self, db_names: &[String]) -> BTreeMap<String, TrainingStatus> {
        let trained = self.state().trained.clone();
        db_names
            .iter()
            .map(|name| {
                let status = match self.cache.get(name) {
                    Some(record) => TrainingStatus {
                        trained: true,
                        tables: Some(record.table_count),
                        cached_at: Some(record.cached_at),
                        in_memory: Some(trained.contains(name)),
                    },
                    None => TrainingStatus::untrained(),
                };
                (name.clone(), status)
            })
            .collect()
    }
}
