use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

/// Connection settings for one named MySQL database.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl: bool,
}

impl DatabaseDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: name.to_string(),
            user: "root".to_string(),
            password: String::new(),
            ssl: false,
        }
    }

    /// Connection URL without the password, safe for logs and banners
    pub fn display_url(&self) -> String {
        let ssl = if self.ssl { "?ssl=true" } else { "" };
        format!(
            "mysql://{}@{}:{}/{}{}",
            self.user, self.host, self.port, self.database, ssl
        )
    }
}

impl fmt::Debug for DatabaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// Error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Background execution failed: {0}")]
    TaskError(String),
}

/// Whether a statement produced a result set or only touched rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    #[default]
    Rows,
    Affected,
}

/// Tabular outcome of one statement.
///
/// Statements without a result set come back as `ResultKind::Affected` with
/// a single `affected_rows` column holding the row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub kind: ResultKind,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

pub const AFFECTED_ROWS_COLUMN: &str = "affected_rows";

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            kind: ResultKind::Rows,
            columns,
            rows,
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            kind: ResultKind::Affected,
            columns: vec![AFFECTED_ROWS_COLUMN.to_string()],
            rows: vec![vec![Some(count.to_string())]],
        }
    }

    /// Row count for a mutation result, `None` for result sets
    pub fn affected_rows(&self) -> Option<u64> {
        match self.kind {
            ResultKind::Affected => self.value(0, 0).and_then(|v| v.parse().ok()),
            ResultKind::Rows => None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    /// Non-null values of one column, in row order
    pub fn column_values(&self, column: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).cloned().flatten())
            .collect()
    }

    /// Header row followed by data rows, NULL rendered as an empty cell
    pub fn to_table_data(&self) -> Vec<Vec<String>> {
        let mut data = Vec::with_capacity(self.rows.len() + 1);
        data.push(self.columns.clone());
        for row in &self.rows {
            data.push(
                row.iter()
                    .map(|cell| cell.clone().unwrap_or_default())
                    .collect(),
            );
        }
        data
    }

    /// One JSON object per row keyed by column name
    pub fn to_json_records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, cell)| {
                        let value = match cell {
                            Some(text) => serde_json::Value::String(text.clone()),
                            None => serde_json::Value::Null,
                        };
                        (column.clone(), value)
                    })
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

/// Executes opaque SQL text against one database.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a single statement. Result sets are fetched whole; anything else
    /// is committed and reported as an affected-row count.
    async fn run_sql(&self, sql: &str) -> Result<QueryResult, DatabaseError>;

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&self);
}

/// Builds the executor for a descriptor the first time its name is used.
pub type Connector = Arc<dyn Fn(&DatabaseDescriptor) -> Arc<dyn SqlExecutor> + Send + Sync>;

/// Memoizing map from database name to its single live executor.
pub struct ConnectionPool {
    descriptors: BTreeMap<String, DatabaseDescriptor>,
    connector: Connector,
    runners: Mutex<HashMap<String, Arc<dyn SqlExecutor>>>,
}

impl ConnectionPool {
    pub fn new(descriptors: BTreeMap<String, DatabaseDescriptor>, connector: Connector) -> Self {
        Self {
            descriptors,
            connector,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Pool backed by lazily connecting MySQL runners
    pub fn mysql(descriptors: BTreeMap<String, DatabaseDescriptor>) -> Self {
        Self::new(
            descriptors,
            Arc::new(|descriptor: &DatabaseDescriptor| {
                Arc::new(crate::database_mysql::MySqlRunner::new(descriptor.clone()))
                    as Arc<dyn SqlExecutor>
            }),
        )
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Executor for `name`, created on first request. `None` when the name
    /// is not configured.
    pub fn runner(&self, name: &str) -> Option<Arc<dyn SqlExecutor>> {
        let descriptor = self.descriptors.get(name)?;
        let mut runners = self
            .runners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let runner = runners.entry(name.to_string()).or_insert_with(|| {
            debug!(
                "[ConnectionPool::runner] Creating runner for '{}' ({})",
                name,
                descriptor.display_url()
            );
            (self.connector)(descriptor)
        });
        Some(Arc::clone(runner))
    }

    /// Run `sql` on a spawned task so the caller's task is free meanwhile
    pub fn spawn_sql(
        &self,
        name: &str,
        sql: String,
    ) -> Option<JoinHandle<Result<QueryResult, DatabaseError>>> {
        let runner = self.runner(name)?;
        Some(tokio::spawn(async move { runner.run_sql(&sql).await }))
    }

    /// Number of executors created so far
    pub fn live_count(&self) -> usize {
        self.runners
            .lock()
            .map(|runners| runners.len())
            .unwrap_or_default()
    }

    pub async fn close_all(&self) {
        let runners: Vec<(String, Arc<dyn SqlExecutor>)> = {
            let mut guard = self
                .runners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain().collect()
        };
        for (name, runner) in runners {
            debug!("[ConnectionPool::close_all] Closing '{}'", name);
            runner.close().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory executor serving canned MySQL catalog answers.
    #[derive(Default)]
    pub struct FakeExecutor {
        pub tables: Vec<String>,
        pub failing_tables: Vec<String>,
        pub calls: AtomicUsize,
        pub closed: AtomicUsize,
        pub statements: Mutex<Vec<String>>,
    }

    impl FakeExecutor {
        pub fn with_tables(tables: &[&str]) -> Self {
            Self {
                tables: tables.iter().map(|t| t.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn failing(mut self, table: &str) -> Self {
            self.failing_tables.push(table.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn ddl_for(table: &str) -> String {
            format!("CREATE TABLE `{table}` (\n  `id` int NOT NULL,\n  PRIMARY KEY (`id`)\n)")
        }
    }

    #[async_trait]
    impl SqlExecutor for FakeExecutor {
        async fn run_sql(&self, sql: &str) -> Result<QueryResult, DatabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.statements
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(sql.to_string());

            if sql == "SHOW TABLES" {
                return Ok(QueryResult::new(
                    vec!["Tables_in_fake".to_string()],
                    self.tables.iter().map(|t| vec![Some(t.clone())]).collect(),
                ));
            }
            if let Some(rest) = sql.strip_prefix("SHOW CREATE TABLE ") {
                let table = rest.trim_matches('`').replace("``", "`");
                if self.failing_tables.contains(&table) {
                    return Err(DatabaseError::QueryError(format!(
                        "Table 'fake.{table}' doesn't exist"
                    )));
                }
                return Ok(QueryResult::new(
                    vec!["Table".to_string(), "Create Table".to_string()],
                    vec![vec![Some(table.clone()), Some(Self::ddl_for(&table))]],
                ));
            }
            if sql.trim_start().to_uppercase().starts_with("SELECT") {
                return Ok(QueryResult::new(
                    vec!["1".to_string()],
                    vec![vec![Some("1".to_string())]],
                ));
            }
            Ok(QueryResult::affected(1))
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeExecutor;
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptors(names: &[&str]) -> BTreeMap<String, DatabaseDescriptor> {
        names
            .iter()
            .map(|n| (n.to_string(), DatabaseDescriptor::new(n)))
            .collect()
    }

    fn counting_pool(names: &[&str]) -> (ConnectionPool, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = ConnectionPool::new(
            descriptors(names),
            Arc::new(move |_: &DatabaseDescriptor| {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(FakeExecutor::with_tables(&["users"])) as Arc<dyn SqlExecutor>
            }),
        );
        (pool, created)
    }

    #[rstest]
    fn test_affected_result_shape() {
        let result = QueryResult::affected(3);
        assert_eq!(result.kind, ResultKind::Affected);
        assert_eq!(result.columns, vec!["affected_rows"]);
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.affected_rows(), Some(3));
    }

    #[rstest]
    fn test_select_of_affected_rows_column_is_a_result_set() {
        let result = QueryResult::new(
            vec!["affected_rows".to_string()],
            vec![vec![Some("12".to_string())]],
        );
        assert_eq!(result.kind, ResultKind::Rows);
        assert_eq!(result.affected_rows(), None);
    }

    #[rstest]
    fn test_result_set_has_no_affected_rows() {
        let result = QueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![Some("1".to_string()), None]],
        );
        assert_eq!(result.affected_rows(), None);
        assert_eq!(result.value(0, 0), Some("1"));
        assert_eq!(result.value(0, 1), None);
        assert_eq!(
            result.to_table_data(),
            vec![vec!["id", "name"], vec!["1", ""]]
        );
    }

    #[rstest]
    fn test_json_records_keep_nulls() {
        let result = QueryResult::new(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![Some("x".to_string()), None]],
        );
        let records = result.to_json_records();
        assert_eq!(records[0]["a"], "x");
        assert!(records[0]["b"].is_null());
    }

    #[rstest]
    fn test_display_url_hides_password() {
        let mut descriptor = DatabaseDescriptor::new("shop");
        descriptor.password = "hunter2".to_string();
        assert_eq!(descriptor.display_url(), "mysql://root@localhost:3306/shop");
        assert!(!format!("{descriptor:?}").contains("hunter2"));
    }

    #[rstest]
    fn test_runner_is_memoized_per_name() {
        let (pool, created) = counting_pool(&["a", "b"]);

        let first = pool.runner("a").unwrap();
        let second = pool.runner("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);

        pool.runner("b").unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.live_count(), 2);
    }

    #[rstest]
    fn test_unknown_name_creates_nothing() {
        let (pool, created) = counting_pool(&["a"]);
        assert!(pool.runner("missing").is_none());
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spawned_sql_runs_on_runner() {
        let (pool, _) = counting_pool(&["a"]);
        let handle = pool.spawn_sql("a", "SELECT 1".to_string()).unwrap();
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.value(0, 0), Some("1"));
    }

    #[tokio::test]
    async fn test_close_all_empties_pool() {
        let executor = Arc::new(FakeExecutor::default());
        let shared = Arc::clone(&executor);
        let pool = ConnectionPool::new(
            descriptors(&["a"]),
            Arc::new(move |_: &DatabaseDescriptor| Arc::clone(&shared) as Arc<dyn SqlExecutor>),
        );
        pool.runner("a").unwrap();

        pool.close_all().await;
        pool.close_all().await;

        assert_eq!(pool.live_count(), 0);
        assert_eq!(executor.closed.load(Ordering::SeqCst), 1);
    }
}
