// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Credential persistence seam.
//
// The print client reads the credential once at start-up and writes it back
// after every successful refresh.  Any row- or key-based store will do; the
// SQLite implementation lives in `tagprint-store`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Credential;

/// Where credentials live between process runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential, if any.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Persist `credential`, replacing whatever was stored before.
    async fn save(&self, credential: &Credential) -> Result<()>;
}

/// Process-local store, for tests and for running without a database.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
