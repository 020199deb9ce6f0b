// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP transport for authenticated print API calls.
//
// A `RequestSpec` is a plain, replayable description of one request.  The
// authenticated client may have to send the same request twice (once with the
// stale token, once after a refresh), and multipart bodies cannot be reused,
// so the transport rebuilds the wire request on every send.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument};

use tagprint_core::error::{Result, TagprintError};

/// HTTP method of a print API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A file uploaded as one multipart field.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Replayable description of a print API request.
///
/// GET requests send `form` as query parameters.  POST requests send it as a
/// url-encoded body, or as multipart text fields when a file is attached.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub form: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            form: Vec::new(),
            file: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.file = Some(part);
        self
    }

    /// Value of the first form field called `name`.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// How a reply should be handled by the authenticated client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 200–399: the body is the result.
    Success,
    /// 401/403: the access token is no longer accepted.
    AuthExpired,
    /// Anything else: surfaced to the caller as a rejection.
    Rejected,
}

/// Status and body of an HTTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn class(&self) -> ReplyClass {
        match self.status {
            401 | 403 => ReplyClass::AuthExpired,
            200..=399 => ReplyClass::Success,
            _ => ReplyClass::Rejected,
        }
    }
}

/// Sends one request with a bearer token attached.
///
/// Implementations report network-level failures as
/// `TagprintError::Transport`; every HTTP status, including errors, comes back
/// as an `HttpReply`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RequestSpec, access_token: &str) -> Result<HttpReply>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Build the shared HTTP client with a per-request timeout.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tagprint/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TagprintError::Transport(format!("build HTTP client: {e}")))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    #[instrument(skip_all, fields(method = ?request.method, url = %request.url))]
    async fn send(&self, request: &RequestSpec, access_token: &str) -> Result<HttpReply> {
        let builder = match (request.method, &request.file) {
            (Method::Get, _) => self.client.get(request.url.as_str()).query(&request.form),
            (Method::Post, None) => self.client.post(request.url.as_str()).form(&request.form),
            (Method::Post, Some(file)) => {
                let mut form = Form::new();
                for (name, value) in &request.form {
                    form = form.text(name.clone(), value.clone());
                }
                let part = Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.content_type)
                    .map_err(|e| {
                        TagprintError::Transport(format!(
                            "invalid content type {:?}: {e}",
                            file.content_type
                        ))
                    })?;
                self.client
                    .post(request.url.as_str())
                    .multipart(form.part(file.field.clone(), part))
            }
        };

        let response = builder
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| request_error(&request.url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(&request.url, e))?;

        debug!(status, bytes = body.len(), "reply received");
        Ok(HttpReply { status, body })
    }
}

/// A request that ran out of time is `TimedOut`; anything else is `Transport`.
pub fn request_error(url: &str, e: reqwest::Error) -> TagprintError {
    if e.is_timeout() {
        TagprintError::TimedOut(format!("{url}: {e}"))
    } else {
        TagprintError::Transport(format!("{url}: {e}"))
    }
}
