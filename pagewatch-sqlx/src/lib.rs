//! Postgres backed implementation of pagewatch's [`CheckpointStore`].
//!
//! Checkpoints are tiny (a workflow identifier and an opaque cursor), so the
//! store is a single upserted row per workflow. A present row doubles as the
//! marker that a prior run did not finish cleanly; the engine deletes the
//! row on normal completion.

use async_trait::async_trait;
use pagewatch::backend::{BackendError, CheckpointStore};
use pagewatch::job::Checkpoint;
use pagewatch::workflow::WorkflowId;
use sqlx::{PgPool, Row};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pagewatch_checkpoints (
    workflow_id TEXT PRIMARY KEY,
    batch_cursor TEXT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// A [`CheckpointStore`] over a Postgres connection pool.
#[derive(Clone, Debug)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl std::ops::Deref for PgCheckpointStore {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl From<PgPool> for PgCheckpointStore {
    fn from(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl From<&PgPool> for PgCheckpointStore {
    fn from(pool: &PgPool) -> Self {
        Self {
            pool: pool.to_owned(),
        }
    }
}

impl PgCheckpointStore {
    /// Creates the store, bootstrapping its table if it does not exist yet.
    pub async fn new(pool: PgPool) -> Result<Self, BackendError> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(map_err)?;
        tracing::debug!("pagewatch checkpoint table ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn persist(
        &self,
        workflow_id: &WorkflowId,
        checkpoint: &Checkpoint,
    ) -> Result<(), BackendError> {
        sqlx::query(
            r#"INSERT INTO pagewatch_checkpoints (workflow_id, batch_cursor)
            VALUES ($1, $2)
            ON CONFLICT (workflow_id) DO UPDATE
            SET batch_cursor = EXCLUDED.batch_cursor, updated_at = now()"#,
        )
        .bind(workflow_id.storage_key())
        .bind(checkpoint.batch_cursor.as_deref())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<Checkpoint>, BackendError> {
        let row = sqlx::query(
            "SELECT batch_cursor FROM pagewatch_checkpoints WHERE workflow_id = $1",
        )
        .bind(workflow_id.storage_key())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(row.map(|row| Checkpoint {
            batch_cursor: row.get("batch_cursor"),
        }))
    }

    async fn clear(&self, workflow_id: &WorkflowId) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM pagewatch_checkpoints WHERE workflow_id = $1")
            .bind(workflow_id.storage_key())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

fn map_err(error: sqlx::Error) -> BackendError {
    BackendError::Unavailable(error.to_string())
}
