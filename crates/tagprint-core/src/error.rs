// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for tagprint.

use thiserror::Error;

/// Top-level error type for all tagprint operations.
#[derive(Debug, Error)]
pub enum TagprintError {
    // -- Remote calls --
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("access token refresh failed: {0}")]
    AuthRefreshFailed(String),

    #[error("remote service rejected the request with status {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("print service refused the job: {0}")]
    PrintRejected(String),

    #[error("image download failed: {0}")]
    Download(String),

    #[error("no picture with id {0}")]
    PictureNotFound(String),

    #[error("no credential available for account {0}")]
    MissingCredential(String),

    #[error("operation timed out: {0}")]
    TimedOut(String),

    // -- Configuration --
    #[error("configuration error: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TagprintError {
    /// Status code an HTTP front end should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthRefreshFailed(_) | Self::MissingCredential(_) => 401,
            Self::Transport(_)
            | Self::RemoteRejected { .. }
            | Self::PrintRejected(_)
            | Self::Download(_) => 502,
            Self::PictureNotFound(_) => 404,
            Self::TimedOut(_) => 504,
            Self::Config(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Serialization(_) => 500,
        }
    }

    /// Authentication failures are terminal: the credential could not be
    /// renewed.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthRefreshFailed(_) | Self::MissingCredential(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TagprintError>;
