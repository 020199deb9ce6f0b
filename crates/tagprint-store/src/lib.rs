// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tagprint Store: SQLite persistence for OAuth credentials and for the
// pictures seen on the tag feed.

pub mod credentials;
pub mod pictures;

pub use credentials::SqliteCredentialStore;
pub use pictures::PictureStore;

use tagprint_core::error::TagprintError;

/// Convert a `rusqlite::Error` into a `TagprintError::Database`.
pub(crate) fn db_err(e: rusqlite::Error) -> TagprintError {
    TagprintError::Database(e.to_string())
}
