// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OAuth2 refresh-token grant (RFC 6749 §6) against the Google token endpoint.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use tagprint_core::error::{Result, TagprintError};
use tagprint_core::types::TokenGrant;

/// Exchanges a refresh token for a new access token.
///
/// Every failure, whether network, HTTP status or body, is reported as
/// `TagprintError::AuthRefreshFailed`.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Refresher for Google's OAuth2 token endpoint.
pub struct GoogleTokenRefresher {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
}

impl GoogleTokenRefresher {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
        }
    }

    /// Send the registered redirect URI along with each refresh.
    pub fn with_redirect_uri(mut self, redirect_uri: Option<String>) -> Self {
        self.redirect_uri = redirect_uri.filter(|uri| !uri.is_empty());
        self
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        if refresh_token.is_empty() {
            return Err(TagprintError::AuthRefreshFailed(
                "no refresh token stored".into(),
            ));
        }

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(uri) = &self.redirect_uri {
            form.push(("redirect_uri", uri.as_str()));
        }

        let response = self
            .http
            .post(self.endpoint.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| TagprintError::AuthRefreshFailed(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TagprintError::AuthRefreshFailed(format!("read token response: {e}")))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "token endpoint refused refresh");
            return Err(TagprintError::AuthRefreshFailed(format!(
                "token endpoint returned {}: {body}",
                status.as_u16()
            )));
        }

        let grant: TokenGrant = serde_json::from_str(&body).map_err(|e| {
            TagprintError::AuthRefreshFailed(format!("malformed token response: {e}"))
        })?;

        info!(expires_in = ?grant.expires_in, "access token granted");
        Ok(grant)
    }
}
