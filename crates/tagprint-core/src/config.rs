// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration, read from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TagprintError};

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// OAuth2 client id of the Google project.
    pub google_client_id: String,
    /// OAuth2 client secret of the Google project.
    pub google_client_secret: String,
    /// Redirect URI registered for the client, sent as `redirect_uri` with
    /// each token refresh.
    pub google_redirect: Option<String>,
    /// OAuth2 token endpoint used for refreshes.
    pub token_endpoint: String,
    /// Access token used until the first refresh, when no stored credential
    /// exists yet.
    pub initial_access_token: Option<String>,
    /// Refresh token paired with `initial_access_token`.
    pub initial_refresh_token: Option<String>,
    /// Base URL of the Cloud Print API (without trailing slash).
    pub cloudprint_url: String,
    /// Target printer.
    pub printer_id: String,
    /// Tag attached to every submitted job so our jobs can be listed back.
    pub print_tag: String,
    /// Instagram API client id.
    pub instagram_client_id: String,
    /// Hashtag to watch. Empty disables polling.
    pub instagram_tag: String,
    /// Base URL of the Instagram API (without trailing slash).
    pub instagram_api_url: String,
    /// Seconds between two polls of the tag feed.
    pub poll_interval_secs: u64,
    /// Upper bound for one queued print task. 0 disables the bound.
    pub task_timeout_secs: u64,
    /// Timeout for individual HTTP requests.
    pub request_timeout_secs: u64,
    /// Key under which the credential is stored.
    pub account: String,
    /// Override for the data directory (databases, spool files).
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_redirect: None,
            token_endpoint: "https://oauth2.googleapis.com/token".into(),
            initial_access_token: None,
            initial_refresh_token: None,
            cloudprint_url: "https://www.google.com/cloudprint".into(),
            printer_id: String::new(),
            print_tag: "instagramprintjob".into(),
            instagram_client_id: String::new(),
            instagram_tag: String::new(),
            instagram_api_url: "https://api.instagram.com/v1".into(),
            poll_interval_secs: 60,
            task_timeout_secs: 300,
            request_timeout_secs: 30,
            account: "default".into(),
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| TagprintError::Config(format!("{key} must be set")))
        };
        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(raw) => raw.trim().parse().map_err(|e| {
                    TagprintError::Config(format!("{key}={raw:?} is not a number: {e}"))
                }),
                None => Ok(default),
            }
        };

        let defaults = Self::default();
        let config = Self {
            google_client_id: required("GOOGLE_CLIENT")?,
            google_client_secret: required("GOOGLE_SECRET")?,
            google_redirect: get("GOOGLE_REDIRECT"),
            token_endpoint: get("GOOGLE_TOKEN_URL").unwrap_or(defaults.token_endpoint),
            initial_access_token: get("GOOGLE_ACCESS_TOKEN"),
            initial_refresh_token: get("GOOGLE_REFRESH_TOKEN"),
            cloudprint_url: get("CLOUDPRINT_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.cloudprint_url),
            printer_id: required("PRINTER_ID")?,
            print_tag: get("PRINT_TAG").unwrap_or(defaults.print_tag),
            instagram_client_id: get("INSTAGRAM_CLIENT").unwrap_or_default(),
            instagram_tag: get("INSTAGRAM_TAG").unwrap_or_default(),
            instagram_api_url: get("INSTAGRAM_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.instagram_api_url),
            poll_interval_secs: number("POLL_INTERVAL_SECS", defaults.poll_interval_secs)?,
            task_timeout_secs: number("TASK_TIMEOUT_SECS", defaults.task_timeout_secs)?,
            request_timeout_secs: number("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            account: get("TAGPRINT_ACCOUNT").unwrap_or(defaults.account),
            data_dir: get("TAGPRINT_DATA_DIR").map(PathBuf::from),
        };

        if config.poll_interval_secs == 0 {
            return Err(TagprintError::Config(
                "POLL_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// `None` when tasks may run unbounded.
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_secs > 0).then(|| Duration::from_secs(self.task_timeout_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
