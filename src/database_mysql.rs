//! MySQL-backed `SqlExecutor`
use crate::database::{DatabaseDescriptor, DatabaseError, QueryResult, SqlExecutor};
use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::types::Decimal;
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One lazily opened MySQL connection for one configured database.
///
/// Each statement runs in its own transaction: committed on success,
/// rolled back on failure. The connection survives failed statements.
pub struct MySqlRunner {
    descriptor: DatabaseDescriptor,
    connection: Mutex<Option<MySqlConnection>>,
}

impl MySqlRunner {
    pub fn new(descriptor: DatabaseDescriptor) -> Self {
        Self {
            descriptor,
            connection: Mutex::new(None),
        }
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let ssl_mode = if self.descriptor.ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        };

        let mut options = MySqlConnectOptions::new()
            .host(&self.descriptor.host)
            .port(self.descriptor.port)
            .username(&self.descriptor.user)
            .database(&self.descriptor.database)
            .ssl_mode(ssl_mode);
        if !self.descriptor.password.is_empty() {
            options = options.password(&self.descriptor.password);
        }
        options
    }

    async fn connect(&self) -> Result<MySqlConnection, DatabaseError> {
        debug!(
            "[MySqlRunner::connect] Connecting to {}",
            self.descriptor.display_url()
        );
        let connection = self.connect_options().connect().await.map_err(|e| {
            DatabaseError::ConnectionError(format!(
                "Failed to connect to '{}': {}",
                self.descriptor.name, e
            ))
        })?;
        info!("Connected to database '{}'", self.descriptor.name);
        Ok(connection)
    }

    async fn execute_in(
        tx: &mut Transaction<'_, MySql>,
        sql: &str,
    ) -> Result<QueryResult, DatabaseError> {
        let statement = (&mut **tx)
            .prepare(sql)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        if statement.columns().is_empty() {
            let done = statement
                .query()
                .execute(&mut **tx)
                .await
                .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
            return Ok(QueryResult::affected(done.rows_affected()));
        }

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();
        let rows = statement
            .query()
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        let rows = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|index| format_mysql_value(row, index))
                    .collect()
            })
            .collect();
        Ok(QueryResult::new(columns, rows))
    }
}

#[async_trait]
impl SqlExecutor for MySqlRunner {
    async fn run_sql(&self, sql: &str) -> Result<QueryResult, DatabaseError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(DatabaseError::ConnectionError(format!(
                "No connection available for '{}'",
                self.descriptor.name
            )));
        };

        debug!("[MySqlRunner::run_sql] {}: {}", self.descriptor.name, sql);
        let mut tx = connection.begin().await?;
        match Self::execute_in(&mut tx, sql).await {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(
                        "Rollback on '{}' failed: {}",
                        self.descriptor.name, rollback_error
                    );
                }
                Err(e)
            }
        }
    }

    async fn close(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            debug!("[MySqlRunner::close] Closing '{}'", self.descriptor.name);
            if let Err(e) = connection.close().await {
                warn!("Closing '{}' failed: {}", self.descriptor.name, e);
            }
        }
    }
}

/// Render one MySQL cell as text, `None` for SQL NULL
fn format_mysql_value(row: &MySqlRow, column_index: usize) -> Option<String> {
    use sqlx::TypeInfo;
    use sqlx::ValueRef;

    if let Ok(value_ref) = row.try_get_raw(column_index) {
        if value_ref.is_null() {
            return None;
        }
    }

    if let Ok(val) = row.try_get::<i64, _>(column_index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<u64, _>(column_index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<f64, _>(column_index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<f32, _>(column_index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<Decimal, _>(column_index) {
        return Some(val.to_string());
    }
    if let Ok(val) = row.try_get::<String, _>(column_index) {
        return Some(val);
    }
    if let Ok(val) = row.try_get::<bool, _>(column_index) {
        return Some(if val { "1" } else { "0" }.to_string());
    }
    if let Ok(val) = row.try_get::<chrono::NaiveDateTime, _>(column_index) {
        return Some(val.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(val) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(column_index) {
        return Some(val.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(val) = row.try_get::<chrono::NaiveDate, _>(column_index) {
        return Some(val.format("%Y-%m-%d").to_string());
    }
    if let Ok(val) = row.try_get::<chrono::NaiveTime, _>(column_index) {
        return Some(val.format("%H:%M:%S").to_string());
    }
    if let Ok(val) = row.try_get::<serde_json::Value, _>(column_index) {
        return Some(val.to_string());
    }
    // SHOW statements hand back VARBINARY for text on some servers
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>(column_index) {
        return Some(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => format!("\\x{}", hex::encode(e.into_bytes())),
        });
    }

    let type_name = row.column(column_index).type_info().name().to_string();
    Some(format!("[MySQL {type_name} value]"))
}
