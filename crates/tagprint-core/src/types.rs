// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for tagprint.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// OAuth2 access/refresh token pair used against the print API.
///
/// Expiry is informational; the remote API is the authority on whether a
/// token is still valid.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expiry_date: None,
            token_type: None,
        }
    }

    /// Overwrite this credential with a refresh response.
    ///
    /// Token endpoints usually omit the refresh token on refresh; the current
    /// one is kept in that case.  A lifetime too large to represent leaves the
    /// expiry unknown.
    pub fn apply_grant(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.access_token = grant.access_token;
        if let Some(refresh) = grant.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = refresh;
        }
        self.expiry_date = match (grant.expiry_date, grant.expires_in) {
            (Some(ms), _) => Utc.timestamp_millis_opt(ms).single(),
            (None, Some(secs)) => {
                Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
            }
            (None, None) => None,
        };
        if grant.token_type.is_some() {
            self.token_type = grant.token_type;
        }
    }
}

// Tokens never show up in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expiry_date", &self.expiry_date)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Body of a successful token-endpoint refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, as sent by RFC 6749 endpoints.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Absolute expiry in epoch milliseconds, as stored by Google client
    /// libraries.
    #[serde(default)]
    pub expiry_date: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Pictures and jobs
// ---------------------------------------------------------------------------

/// A picture announced by the tag feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub id: String,
    pub created_time: String,
    /// Standard-resolution image URL.
    pub image_url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Print status of a stored picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PictureStatus {
    /// Seen, print task queued or about to be.
    Pending,
    /// Accepted by the print service.
    Submitted,
    /// Submission failed, see the record's error field.
    Failed,
}

impl PictureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "submitted" => Some(Self::Submitted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A stored picture together with its print bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureRecord {
    pub image: ImageDescriptor,
    pub status: PictureStatus,
    pub cloud_job_id: Option<String>,
    pub error_message: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One print submission for one picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub image_id: String,
    pub title: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl PrintJob {
    /// Feed pictures are always standard-resolution JPEGs.
    pub fn for_image(image: &ImageDescriptor) -> Self {
        Self {
            id: JobId::new(),
            image_id: image.id.clone(),
            title: format!("{}.jpg", image.id),
            content_type: "image/jpeg".into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cloud Print payloads
// ---------------------------------------------------------------------------

/// Job metadata as reported by the print service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudJob {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "printerid")]
    pub printer_id: Option<String>,
    #[serde(default, rename = "createTime")]
    pub create_time: Option<String>,
}

/// A printer registered with the print service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudPrinter {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, rename = "connectionStatus")]
    pub connection_status: Option<String>,
}
