// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite-backed credential store.
//
// Schema:
//   credentials(
//     account       TEXT PRIMARY KEY,
//     access_token  TEXT NOT NULL,
//     refresh_token TEXT NOT NULL,
//     expiry_date   TEXT,              -- RFC 3339
//     token_type    TEXT,
//     updated_at    TEXT NOT NULL      -- RFC 3339
//   )

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use tagprint_core::error::{Result, TagprintError};
use tagprint_core::store::CredentialStore;
use tagprint_core::types::Credential;

use crate::db_err;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS credentials (
        account       TEXT PRIMARY KEY,
        access_token  TEXT NOT NULL,
        refresh_token TEXT NOT NULL,
        expiry_date   TEXT,
        token_type    TEXT,
        updated_at    TEXT NOT NULL
    )
"#;

/// Credential store holding one row per account.
///
/// `rusqlite` is synchronous, so every query runs on Tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    conn: Arc<Mutex<Connection>>,
    account: String,
}

impl SqliteCredentialStore {
    /// Open (or create) the credential database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), %account))]
    pub fn open(path: impl AsRef<Path>, account: &str) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        info!("credential store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            account: account.to_string(),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory(account: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory credential store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            account: account.into(),
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&*guard, account.as_str())
        })
        .await
        .map_err(|e| TagprintError::Database(format!("blocking task failed: {e}")))?
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        self.with_conn(|conn, account| {
            let row = conn
                .query_row(
                    "SELECT access_token, refresh_token, expiry_date, token_type
                     FROM credentials WHERE account = ?1",
                    params![account],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(db_err)?;

            let Some((access_token, refresh_token, expiry, token_type)) = row else {
                debug!(%account, "no stored credential");
                return Ok(None);
            };

            // An unreadable expiry only loses information; the remote API
            // still decides whether the token is valid.
            let expiry_date = expiry
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            Ok(Some(Credential {
                access_token,
                refresh_token,
                expiry_date,
                token_type,
            }))
        })
        .await
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let credential = credential.clone();
        self.with_conn(move |conn, account| {
            conn.execute(
                "INSERT INTO credentials
                     (account, access_token, refresh_token, expiry_date, token_type, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(account) DO UPDATE SET
                     access_token  = excluded.access_token,
                     refresh_token = excluded.refresh_token,
                     expiry_date   = excluded.expiry_date,
                     token_type    = excluded.token_type,
                     updated_at    = excluded.updated_at",
                params![
                    account,
                    credential.access_token,
                    credential.refresh_token,
                    credential.expiry_date.map(|d| d.to_rfc3339()),
                    credential.token_type,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err)?;

            info!(%account, "credential saved");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_loads_nothing() {
        let store = SqliteCredentialStore::open_in_memory("me").expect("open");
        assert!(store.load().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn save_overwrites_in_place() {
        let store = SqliteCredentialStore::open_in_memory("me").expect("open");
        store
            .save(&Credential::new("access-1", "refresh-1"))
            .await
            .expect("first save");

        let mut updated = Credential::new("access-2", "refresh-1");
        updated.expiry_date = Some(Utc::now());
        updated.token_type = Some("Bearer".into());
        store.save(&updated).await.expect("second save");

        let loaded = store.load().await.expect("load").expect("present");
        assert_eq!(loaded.access_token, "access-2");
        assert_eq!(loaded.refresh_token, "refresh-1");
        assert_eq!(loaded.token_type.as_deref(), Some("Bearer"));
        assert_eq!(
            loaded.expiry_date.map(|d| d.timestamp()),
            updated.expiry_date.map(|d| d.timestamp())
        );
    }

    #[tokio::test]
    async fn accounts_are_isolated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("credentials.db");

        let alice = SqliteCredentialStore::open(&path, "alice").expect("open alice");
        let bob = SqliteCredentialStore::open(&path, "bob").expect("open bob");

        alice.save(&Credential::new("a", "ra")).await.expect("save");
        assert!(bob.load().await.expect("load").is_none());
        assert_eq!(
            alice.load().await.expect("load").expect("present").access_token,
            "a"
        );
    }
}
