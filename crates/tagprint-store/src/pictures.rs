// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Picture store backed by SQLite.
//
// Every picture announced by the tag feed is recorded once.  Inserting a batch
// reports which pictures were not known before, which is what decides whether
// a print task gets queued.  Print outcomes are written back onto the row.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

use tagprint_core::error::{Result, TagprintError};
use tagprint_core::types::{ImageDescriptor, PictureRecord, PictureStatus};

use crate::db_err;

/// SQLite schema for the pictures table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS pictures (
        id            TEXT PRIMARY KEY,
        created_time  TEXT NOT NULL,
        image_url     TEXT NOT NULL,
        width         INTEGER,
        height        INTEGER,
        tags          TEXT NOT NULL DEFAULT '[]',
        status        TEXT NOT NULL,
        cloud_job_id  TEXT,
        error_message TEXT,
        inserted_at   TEXT NOT NULL,
        updated_at    TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS pictures_cloud_job ON pictures (cloud_job_id);
"#;

const SELECT_COLUMNS: &str = "id, created_time, image_url, width, height, tags, status,
                              cloud_job_id, error_message, inserted_at, updated_at";

/// Persistent picture store.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively.  In an async context, wrap calls in `tokio::task::spawn_blocking`.
pub struct PictureStore {
    conn: Connection,
}

impl PictureStore {
    /// Open (or create) the picture database at the given path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        info!("picture store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory picture store opened");
        Ok(Self { conn })
    }

    /// Record a batch of pictures and return the ones that were new.
    ///
    /// Pictures already present are left untouched, so a picture is handed
    /// out for printing at most once no matter how often the feed repeats it.
    #[instrument(skip_all, fields(batch = images.len()))]
    pub fn insert_new(&mut self, images: &[ImageDescriptor]) -> Result<Vec<ImageDescriptor>> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().map_err(db_err)?;
        let mut fresh = Vec::new();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO pictures
                         (id, created_time, image_url, width, height, tags, status,
                          inserted_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                )
                .map_err(db_err)?;

            for image in images {
                let tags = serde_json::to_string(&image.tags)?;
                let inserted = stmt
                    .execute(params![
                        image.id,
                        image.created_time,
                        image.image_url,
                        image.width,
                        image.height,
                        tags,
                        PictureStatus::Pending.as_str(),
                        now,
                    ])
                    .map_err(db_err)?;
                if inserted == 1 {
                    fresh.push(image.clone());
                }
            }
        }
        tx.commit().map_err(db_err)?;

        debug!(new = fresh.len(), "pictures recorded");
        Ok(fresh)
    }

    /// Mark a picture as accepted by the print service.
    #[instrument(skip(self))]
    pub fn mark_submitted(&self, image_id: &str, cloud_job_id: Option<&str>) -> Result<()> {
        self.set_status(image_id, PictureStatus::Submitted, cloud_job_id, None)
    }

    /// Mark a picture as failed, keeping the error for later inspection.
    #[instrument(skip(self))]
    pub fn mark_failed(&self, image_id: &str, error_message: &str) -> Result<()> {
        self.set_status(image_id, PictureStatus::Failed, None, Some(error_message))
    }

    /// Put a picture back to pending, clearing its last error.
    #[instrument(skip(self))]
    pub fn mark_pending(&self, image_id: &str) -> Result<()> {
        self.set_status(image_id, PictureStatus::Pending, None, None)
    }

    fn set_status(
        &self,
        image_id: &str,
        status: PictureStatus,
        cloud_job_id: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE pictures
                 SET status = ?1, cloud_job_id = COALESCE(?2, cloud_job_id),
                     error_message = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    cloud_job_id,
                    error_message,
                    Utc::now().to_rfc3339(),
                    image_id
                ],
            )
            .map_err(db_err)?;

        if rows == 0 {
            return Err(TagprintError::Database(format!(
                "picture {image_id} not found"
            )));
        }

        debug!(image_id, status = status.as_str(), "picture status updated");
        Ok(())
    }

    /// Retrieve a single picture by id.
    pub fn get(&self, image_id: &str) -> Result<Option<PictureRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM pictures WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let mut rows = stmt
            .query_map(params![image_id], row_to_record)
            .map_err(db_err)?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(db_err(e)),
            None => Ok(None),
        }
    }

    /// Most recently recorded pictures first.
    pub fn recent(&self, limit: usize) -> Result<Vec<PictureRecord>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM pictures
             ORDER BY inserted_at DESC, rowid DESC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let records = stmt
            .query_map(params![limit as i64], row_to_record)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(records)
    }

    /// Pictures whose print job is one of `cloud_job_ids`.
    ///
    /// Used to join the print service's job listing back to our pictures.
    pub fn for_cloud_jobs(&self, cloud_job_ids: &[String]) -> Result<Vec<PictureRecord>> {
        if cloud_job_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=cloud_job_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM pictures
             WHERE cloud_job_id IN ({placeholders})
             ORDER BY inserted_at DESC, rowid DESC"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(cloud_job_ids.iter()), row_to_record)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a SQLite row to a `PictureRecord`.
///
/// Column indices must match `SELECT_COLUMNS`.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PictureRecord> {
    let tags_json: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let inserted_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status = PictureStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown status {status_str:?}").into(),
        )
    })?;

    Ok(PictureRecord {
        image: ImageDescriptor {
            id: row.get(0)?,
            created_time: row.get(1)?,
            image_url: row.get(2)?,
            width: row.get(3)?,
            height: row.get(4)?,
            tags,
        },
        status,
        cloud_job_id: row.get(7)?,
        error_message: row.get(8)?,
        inserted_at: parse_timestamp(&inserted_at_str, 9)?,
        updated_at: parse_timestamp(&updated_at_str, 10)?,
    })
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}
