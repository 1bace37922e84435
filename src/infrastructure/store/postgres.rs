//! PostgreSQL chain store with connection pooling

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use super::migrations::PostgresMigrator;
use crate::domain::chain::{ChainConfiguration, ChainId};
use crate::domain::{ChainStore, DomainError, ExecutionHistory, ExecutionId};

/// PostgreSQL connection configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/chain_controller".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

/// PostgreSQL implementation of ChainStore
#[derive(Debug, Clone)]
pub struct PostgresChainStore {
    pool: PgPool,
}

impl PostgresChainStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then apply pending migrations
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        PostgresMigrator::new(pool.clone()).run_all().await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value)
        .map_err(|e| DomainError::internal(format!("Failed to serialize column: {}", e)))
}

fn from_json<T: DeserializeOwned>(value: Value, column: &str) -> Result<T, DomainError> {
    serde_json::from_value(value)
        .map_err(|e| DomainError::storage(format!("Corrupt '{}' column: {}", column, e)))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DomainError::storage(format!("Failed to read column '{}': {}", name, e)))
}

fn row_to_chain(row: &PgRow) -> Result<ChainConfiguration, DomainError> {
    let id = ChainId::new(column::<String>(row, "id")?)
        .map_err(|e| DomainError::storage(format!("Invalid stored chain id: {}", e)))?;

    let mut chain = ChainConfiguration::new(id, column::<String>(row, "user_id")?, column::<String>(row, "name")?)
        .with_steps(from_json(column(row, "steps")?, "steps")?);

    if let Some(description) = column::<Option<String>>(row, "description")? {
        chain = chain.with_description(description);
    }

    if let Some(template) = column::<Option<Value>>(row, "output_template")? {
        chain = chain.with_output_template(template);
    }

    if let Some(pipeline) = column::<Option<Value>>(row, "pipeline")? {
        chain = chain.with_pipeline(from_json(pipeline, "pipeline")?);
    }

    Ok(chain.with_timestamps(column(row, "created_at")?, column(row, "updated_at")?))
}

fn row_to_history(row: &PgRow) -> Result<ExecutionHistory, DomainError> {
    Ok(ExecutionHistory {
        id: ExecutionId::from_uuid(column(row, "id")?),
        user_id: column(row, "user_id")?,
        chain_id: column(row, "chain_id")?,
        chain_name: column(row, "chain_name")?,
        input: column(row, "input")?,
        steps: from_json(column(row, "steps")?, "steps")?,
        success: column(row, "success")?,
        error: column(row, "error")?,
        total_duration_ms: column::<i64>(row, "total_duration_ms")?.max(0) as u64,
        started_at: column(row, "started_at")?,
        completed_at: column(row, "completed_at")?,
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    let msg = e.to_string();
    msg.contains("duplicate key") || msg.contains("unique constraint")
}

const CHAIN_COLUMNS: &str =
    "id, user_id, name, description, steps, output_template, pipeline, created_at, updated_at";

const HISTORY_COLUMNS: &str = "id, user_id, chain_id, chain_name, input, steps, success, error, \
                               total_duration_ms, started_at, completed_at";

#[async_trait]
impl ChainStore for PostgresChainStore {
    async fn create_chain(&self, chain: ChainConfiguration) -> Result<ChainConfiguration, DomainError> {
        let pipeline = chain.pipeline().map(to_json).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO chain_configurations
                (id, user_id, name, description, steps, output_template, pipeline, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(chain.id().as_str())
        .bind(chain.user_id())
        .bind(chain.name())
        .bind(chain.description())
        .bind(to_json(chain.steps())?)
        .bind(chain.output_template())
        .bind(pipeline)
        .bind(chain.created_at())
        .bind(chain.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict(format!("Chain '{}' already exists", chain.id()))
            } else {
                DomainError::storage(format!("Failed to create chain: {}", e))
            }
        })?;

        Ok(chain)
    }

    async fn get_chain(
        &self,
        id: &ChainId,
        user_id: &str,
    ) -> Result<Option<ChainConfiguration>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chain_configurations WHERE id = $1 AND user_id = $2",
            CHAIN_COLUMNS
        ))
        .bind(id.as_str())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get chain: {}", e)))?;

        row.as_ref().map(row_to_chain).transpose()
    }

    async fn list_chains(&self, user_id: &str) -> Result<Vec<ChainConfiguration>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chain_configurations WHERE user_id = $1 ORDER BY updated_at DESC",
            CHAIN_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list chains: {}", e)))?;

        rows.iter().map(row_to_chain).collect()
    }

    async fn update_chain(&self, chain: ChainConfiguration) -> Result<ChainConfiguration, DomainError> {
        let pipeline = chain.pipeline().map(to_json).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE chain_configurations
            SET name = $3, description = $4, steps = $5, output_template = $6,
                pipeline = $7, updated_at = $8
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(chain.id().as_str())
        .bind(chain.user_id())
        .bind(chain.name())
        .bind(chain.description())
        .bind(to_json(chain.steps())?)
        .bind(chain.output_template())
        .bind(pipeline)
        .bind(chain.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update chain: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "Chain '{}' not found",
                chain.id()
            )));
        }

        Ok(chain)
    }

    async fn delete_chain(&self, id: &ChainId, user_id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM chain_configurations WHERE id = $1 AND user_id = $2")
            .bind(id.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete chain: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_history(&self, history: ExecutionHistory) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO execution_history
                (id, user_id, chain_id, chain_name, input, steps, success, error,
                 total_duration_ms, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(history.id.as_uuid())
        .bind(&history.user_id)
        .bind(&history.chain_id)
        .bind(&history.chain_name)
        .bind(&history.input)
        .bind(to_json(&history.steps)?)
        .bind(history.success)
        .bind(&history.error)
        .bind(i64::try_from(history.total_duration_ms).unwrap_or(i64::MAX))
        .bind(history.started_at)
        .bind(history.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict(format!("Execution '{}' already recorded", history.id))
            } else {
                DomainError::storage(format!("Failed to write execution history: {}", e))
            }
        })?;

        Ok(())
    }

    async fn get_history(&self, id: &ExecutionId) -> Result<Option<ExecutionHistory>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM execution_history WHERE id = $1",
            HISTORY_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get execution: {}", e)))?;

        row.as_ref().map(row_to_history).transpose()
    }

    async fn list_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionHistory>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM execution_history WHERE user_id = $1 ORDER BY started_at DESC LIMIT $2",
            HISTORY_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list executions: {}", e)))?;

        rows.iter().map(row_to_history).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = PostgresConfig::new("postgres://db/chains")
            .with_max_connections(4)
            .with_connect_timeout(5);

        assert_eq!(config.url, "postgres://db/chains");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_timeout_secs, 5);
    }

    #[test]
    fn test_selected_columns_cover_table() {
        for name in ["steps", "output_template", "pipeline", "updated_at"] {
            assert!(CHAIN_COLUMNS.contains(name));
        }
        for name in ["chain_id", "total_duration_ms", "completed_at"] {
            assert!(HISTORY_COLUMNS.contains(name));
        }
    }

    #[test]
    fn test_corrupt_json_is_storage_error() {
        let err = from_json::<Vec<String>>(serde_json::json!({"not": "a list"}), "steps").unwrap_err();
        assert!(matches!(err, DomainError::Storage { .. }));
    }
}
