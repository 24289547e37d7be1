//! Local run job persistence
//!
//! Run jobs and their lifecycle events are kept in a small SQLite
//! database so interrupted runs stay inspectable and event history
//! survives the process.

use std::path::Path;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::domain::{JobEvent, RunJob, RunJobStatus};

pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !Path::new(db_path).exists() {
            std::fs::File::create(db_path)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        let create_run_jobs_sql = r#"
            CREATE TABLE IF NOT EXISTS run_jobs (
                id TEXT PRIMARY KEY,
                tenant TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'IN_PROGRESS',
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
        "#;

        let create_job_events_sql = r#"
            CREATE TABLE IF NOT EXISTS job_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                import_job_id TEXT,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                FOREIGN KEY (job_id) REFERENCES run_jobs (id) ON DELETE CASCADE
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_job_events_job_id ON job_events (job_id);
            CREATE INDEX IF NOT EXISTS idx_run_jobs_status ON run_jobs (status);
        "#;

        sqlx::query(create_run_jobs_sql).execute(&self.pool).await?;
        sqlx::query(create_job_events_sql)
            .execute(&self.pool)
            .await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }

    pub async fn insert_job(&self, job: &RunJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_jobs (id, tenant, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.tenant)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_status(&self, job_id: &str, status: RunJobStatus) -> Result<()> {
        sqlx::query("UPDATE run_jobs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_job(&self, job_id: &str) -> Result<Option<RunJob>> {
        let row = sqlx::query(
            "SELECT id, tenant, status, created_at, updated_at FROM run_jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(RunJob {
                id: row.get("id"),
                tenant: row.get("tenant"),
                status: parse_status(&row.get::<String, _>("status"))?,
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
        })
        .transpose()
    }

    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<RunJob>> {
        let rows = sqlx::query(
            "SELECT id, tenant, status, created_at, updated_at FROM run_jobs ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RunJob {
                    id: row.get("id"),
                    tenant: row.get("tenant"),
                    status: parse_status(&row.get::<String, _>("status"))?,
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    /// Appends one event row and returns its rowid.
    pub async fn record_event(&self, event: &JobEvent) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO job_events (job_id, import_job_id, event_type, payload, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&event.job_id)
        .bind(&event.import_job_id)
        .bind(&event.event_type)
        .bind(serde_json::to_string(&event.payload)?)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn events_for(&self, job_id: &str) -> Result<Vec<JobEvent>> {
        let rows = sqlx::query(
            "SELECT id, job_id, import_job_id, event_type, payload, created_at FROM job_events WHERE job_id = ? ORDER BY id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload: String = row.get("payload");
                Ok(JobEvent {
                    id: Some(row.get("id")),
                    job_id: row.get("job_id"),
                    import_job_id: row.get("import_job_id"),
                    event_type: row.get("event_type"),
                    payload: serde_json::from_str(&payload)?,
                    created_at: row.get::<DateTime<Utc>, _>("created_at"),
                })
            })
            .collect()
    }
}

fn parse_status(raw: &str) -> Result<RunJobStatus> {
    match raw {
        "IN_PROGRESS" => Ok(RunJobStatus::InProgress),
        "COMPLETED" => Ok(RunJobStatus::Completed),
        "FAILED" => Ok(RunJobStatus::Failed),
        other => bail!("unknown run job status '{other}'"),
    }
}
