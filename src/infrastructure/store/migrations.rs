//! Embedded database migrations

use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// A versioned schema change
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

/// All migrations, in ascending version order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create chain_configurations table",
        up: r#"
            CREATE TABLE IF NOT EXISTS chain_configurations (
                id VARCHAR(64) PRIMARY KEY,
                user_id VARCHAR(255) NOT NULL,
                name VARCHAR(255) NOT NULL,
                description TEXT,
                steps JSONB NOT NULL,
                output_template JSONB,
                pipeline JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_chain_configurations_user_id
                ON chain_configurations(user_id);
        "#,
        down: "DROP TABLE IF EXISTS chain_configurations;",
    },
    Migration {
        version: 2,
        description: "Create execution_history table",
        up: r#"
            CREATE TABLE IF NOT EXISTS execution_history (
                id UUID PRIMARY KEY,
                user_id VARCHAR(255) NOT NULL,
                chain_id VARCHAR(64),
                chain_name VARCHAR(255) NOT NULL,
                input JSONB NOT NULL,
                steps JSONB NOT NULL,
                success BOOLEAN NOT NULL,
                error TEXT,
                total_duration_ms BIGINT NOT NULL,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_execution_history_user_started
                ON execution_history(user_id, started_at DESC);
        "#,
        down: "DROP TABLE IF EXISTS execution_history;",
    },
];

/// Applies and reverts migrations, tracking them in `_migrations`
#[derive(Debug, Clone)]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    async fn is_applied(&self, version: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))
    }

    /// Apply one migration inside a transaction, unless already applied
    pub async fn apply(&self, migration: &Migration) -> Result<bool, DomainError> {
        self.ensure_migrations_table().await?;

        if self.is_applied(migration.version).await? {
            return Ok(false);
        }

        let storage_error = |e: sqlx::Error| {
            DomainError::storage(format!("Failed to apply migration {}: {}", migration.version, e))
        };

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        info!(version = migration.version, description = migration.description, "Applied migration");
        Ok(true)
    }

    /// Revert one migration, if applied
    pub async fn revert(&self, migration: &Migration) -> Result<bool, DomainError> {
        self.ensure_migrations_table().await?;

        if !self.is_applied(migration.version).await? {
            return Ok(false);
        }

        let storage_error = |e: sqlx::Error| {
            DomainError::storage(format!("Failed to revert migration {}: {}", migration.version, e))
        };

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::raw_sql(migration.down)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        sqlx::query("DELETE FROM _migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        info!(version = migration.version, "Reverted migration");
        Ok(true)
    }

    /// Apply every pending migration
    pub async fn run_all(&self) -> Result<usize, DomainError> {
        let mut applied = 0;

        for migration in MIGRATIONS {
            if self.apply(migration).await? {
                applied += 1;
            }
        }

        Ok(applied)
    }

    /// Latest applied version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_ascending() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[1].version > pair[0].version);
        }
    }

    #[test]
    fn test_migrations_content() {
        for migration in MIGRATIONS {
            assert!(!migration.description.is_empty());
            assert!(migration.up.contains("CREATE TABLE"));
            assert!(migration.down.contains("DROP TABLE"));
        }
    }

    #[test]
    fn test_tables_match_persisted_shape() {
        let all: String = MIGRATIONS.iter().map(|m| m.up).collect();

        for column in [
            "chain_configurations",
            "output_template",
            "execution_history",
            "chain_id VARCHAR(64),",
            "total_duration_ms",
            "completed_at",
        ] {
            assert!(all.contains(column), "missing {}", column);
        }
    }
}
