//! Durable trace storage.
//!
//! Sealed traces are written as their full JSON record plus a few indexed
//! columns for querying. The stored form is exactly the serialized `Trace`,
//! so downstream systems can parse it without this crate's types, and the
//! metric extractor can replay history from here.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::domain::Trace;
use crate::error::{AegisError, AegisResult};
use crate::gateway::TraceSink;

/// Repository for sealed traces.
#[derive(Clone)]
pub struct TraceStore {
    pool: SqlitePool,
}

impl TraceStore {
    /// Create a store with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema.
    pub async fn init_schema(&self) -> AegisResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traces (
                request_id TEXT PRIMARY KEY,
                policy_id TEXT NOT NULL,
                policy_version INTEGER NOT NULL,
                input_action TEXT NOT NULL,
                output_action TEXT,
                record TEXT NOT NULL,
                started_at TEXT NOT NULL,
                sealed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_traces_sealed_at ON traces(sealed_at);
            CREATE INDEX IF NOT EXISTS idx_traces_policy_id ON traces(policy_id);
            CREATE INDEX IF NOT EXISTS idx_traces_input_action ON traces(input_action);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a sealed trace.
    pub async fn save_trace(&self, trace: &Trace) -> AegisResult<()> {
        let record = serde_json::to_string(trace)?;
        let output_action = trace
            .output_decision
            .as_ref()
            .map(|d| d.final_action.to_string());

        sqlx::query(
            r#"
            INSERT INTO traces
                (request_id, policy_id, policy_version, input_action,
                 output_action, record, started_at, sealed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trace.request_id)
        .bind(&trace.policy_id)
        .bind(trace.policy_version)
        .bind(trace.input_decision.final_action.to_string())
        .bind(output_action)
        .bind(record)
        .bind(trace.started_at.to_rfc3339())
        .bind(trace.sealed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch one trace by request id.
    pub async fn get_trace(&self, request_id: &str) -> AegisResult<Trace> {
        let row = sqlx::query("SELECT record FROM traces WHERE request_id = ?")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AegisError::NotFound(format!("trace '{}'", request_id)))?;

        let record: String = row.get("record");
        Ok(serde_json::from_str(&record)?)
    }

    /// Most recently sealed traces, newest first.
    pub async fn list_recent(&self, limit: i64) -> AegisResult<Vec<Trace>> {
        let rows = sqlx::query("SELECT record FROM traces ORDER BY sealed_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let record: String = row.get("record");
                serde_json::from_str(&record).map_err(AegisError::from)
            })
            .collect()
    }

    /// Total number of stored traces.
    pub async fn count(&self) -> AegisResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM traces")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait::async_trait]
impl TraceSink for TraceStore {
    async fn persist(&self, trace: &Trace) -> AegisResult<()> {
        self.save_trace(trace).await
    }
}
