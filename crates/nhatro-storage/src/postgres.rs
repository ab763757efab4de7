//! Postgres-backed [`UpsertSession`].

use std::time::Duration;

use async_trait::async_trait;
use nhatro_core::StructuredRecord;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info};

use crate::import::{DbError, UpsertOutcome, UpsertSession};
use crate::retry::RetryDisposition;

pub const LISTING_TABLE: &str = "listing_posts";

/// SQLSTATE for `lock_not_available`, raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const DEADLOCK_DETECTED: &str = "40P01";

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS listing_posts (
    id              CHAR(64) PRIMARY KEY,
    posted_at       TIMESTAMPTZ NOT NULL,
    content         TEXT NOT NULL,
    district        VARCHAR(255),
    ward            VARCHAR(255),
    street_address  TEXT,
    price           BIGINT NOT NULL DEFAULT 0,
    area            DOUBLE PRECISION,
    amenities       JSONB NOT NULL DEFAULT '[]'::jsonb,
    contact         VARCHAR(32),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO listing_posts
    (id, posted_at, content, district, ward, street_address, price, area, amenities, contact)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (id) DO UPDATE
   SET posted_at = EXCLUDED.posted_at,
       content = EXCLUDED.content,
       district = EXCLUDED.district,
       ward = EXCLUDED.ward,
       street_address = EXCLUDED.street_address,
       price = EXCLUDED.price,
       area = EXCLUDED.area,
       amenities = EXCLUDED.amenities,
       contact = EXCLUDED.contact,
       updated_at = now()
RETURNING (xmax = 0) AS inserted
"#;

pub fn classify_sqlx_error(err: &sqlx::Error) -> RetryDisposition {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(LOCK_NOT_AVAILABLE | DEADLOCK_DETECTED) => RetryDisposition::Retryable,
            _ => RetryDisposition::NonRetryable,
        },
        _ => RetryDisposition::NonRetryable,
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match classify_sqlx_error(&err) {
            RetryDisposition::Retryable => DbError::TransientLock(err.to_string()),
            RetryDisposition::NonRetryable => DbError::Fatal(err.to_string()),
        }
    }
}

/// A single-connection session. Each transaction runs with a bounded lock
/// wait, and each row is written under a savepoint so a failed attempt can be
/// undone without losing the rest of the batch.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    lock_timeout: Duration,
}

impl PgSession {
    pub async fn connect(database_url: &str, lock_timeout: Duration) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!(lock_timeout_ms = lock_timeout.as_millis() as u64, "database session opened");
        Ok(Self {
            pool,
            tx: None,
            lock_timeout,
        })
    }

    fn open_tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, DbError> {
        self.tx
            .as_mut()
            .ok_or_else(|| DbError::Fatal("no open transaction".to_string()))
    }
}

#[async_trait]
impl UpsertSession for PgSession {
    async fn ensure_schema(&mut self) -> Result<(), DbError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        let statement = format!("SET LOCAL lock_timeout = {}", self.lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;
        self.tx = Some(tx);
        Ok(())
    }

    async fn upsert(&mut self, record: &StructuredRecord) -> Result<UpsertOutcome, DbError> {
        let tx = self.open_tx()?;
        sqlx::query("SAVEPOINT record_upsert")
            .execute(&mut **tx)
            .await?;

        let amenities: Vec<&str> = record.amenities.iter().map(String::as_str).collect();
        let result = sqlx::query(UPSERT_SQL)
            .bind(&record.id)
            .bind(record.timestamp)
            .bind(&record.content)
            .bind(record.district.as_deref())
            .bind(record.ward.as_deref())
            .bind(record.address.as_deref())
            .bind(record.price)
            .bind(record.area)
            .bind(Json(amenities))
            .bind(record.contact.as_deref())
            .fetch_one(&mut **tx)
            .await;

        match result {
            Ok(row) => {
                sqlx::query("RELEASE SAVEPOINT record_upsert")
                    .execute(&mut **tx)
                    .await?;
                let inserted: bool = row.try_get("inserted")?;
                Ok(if inserted {
                    UpsertOutcome::Inserted
                } else {
                    UpsertOutcome::Updated
                })
            }
            Err(err) => {
                sqlx::query("ROLLBACK TO SAVEPOINT record_upsert")
                    .execute(&mut **tx)
                    .await?;
                debug!(id = %record.id, error = %err, "row attempt rolled back to savepoint");
                Err(err.into())
            }
        }
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::Fatal("commit without an open transaction".to_string()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.rollback().await;
        }
        self.pool.close().await;
        info!("database session closed");
    }
}
