//! SQLite record repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyway_core::types::{LocalRecord, NewLocalRecord};
use keyway_core::{Error, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::traits::{dn_key, LocalRecordStore};

type RecordRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
);

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let store = Self { pool };
        store.init().await?;

        info!("Local record store ready");
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        // dn_key is the lowercased DN; LDAP compares DNs case-insensitively
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_records (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                directory_dn TEXT NOT NULL,
                dn_key TEXT NOT NULL,
                attributes TEXT NOT NULL,
                password_hash TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT,
                UNIQUE (domain, dn_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(())
    }

    fn row_to_record(row: RecordRow) -> Result<LocalRecord> {
        let (id, domain, directory_dn, attributes, password_hash, created_at, updated_at, deleted_at) =
            row;

        let attributes: BTreeMap<String, String> = serde_json::from_str(&attributes)
            .map_err(|e| Error::DatabaseError(format!("Corrupt attributes for {}: {}", id, e)))?;

        Ok(LocalRecord {
            id: Uuid::parse_str(&id)
                .map_err(|e| Error::DatabaseError(format!("Corrupt record id {}: {}", id, e)))?,
            domain,
            directory_dn,
            attributes,
            password_hash,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DatabaseError(format!("Corrupt timestamp {}: {}", value, e)))
}

fn encode_attributes(attributes: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(attributes).map_err(|e| Error::DatabaseError(e.to_string()))
}

#[async_trait]
impl LocalRecordStore for SqliteRecordStore {
    async fn find_by_directory_identity(
        &self,
        domain: &str,
        dn: &str,
    ) -> Result<Option<LocalRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT id, domain, directory_dn, attributes, password_hash,
                   created_at, updated_at, deleted_at
            FROM local_records WHERE domain = ? AND dn_key = ?
            "#,
        )
        .bind(domain)
        .bind(dn_key(dn))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        row.map(Self::row_to_record).transpose()
    }

    async fn create(&self, record: NewLocalRecord) -> Result<LocalRecord> {
        let record = LocalRecord::from_new(record);

        sqlx::query(
            r#"
            INSERT INTO local_records
                (id, domain, directory_dn, dn_key, attributes, password_hash,
                 created_at, updated_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.domain)
        .bind(&record.directory_dn)
        .bind(dn_key(&record.directory_dn))
        .bind(encode_attributes(&record.attributes)?)
        .bind(&record.password_hash)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .bind(record.deleted_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        debug!("Created local record {} for {}", record.id, record.directory_dn);
        Ok(record)
    }

    async fn save(&self, record: &LocalRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE local_records
            SET directory_dn = ?, dn_key = ?, attributes = ?, password_hash = ?,
                updated_at = ?, deleted_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.directory_dn)
        .bind(dn_key(&record.directory_dn))
        .bind(encode_attributes(&record.attributes)?)
        .bind(&record.password_hash)
        .bind(record.updated_at.to_rfc3339())
        .bind(record.deleted_at.map(|dt| dt.to_rfc3339()))
        .bind(record.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::DatabaseError(format!(
                "No local record with id {}",
                record.id
            )));
        }

        debug!("Saved local record {}", record.id);
        Ok(())
    }
}
