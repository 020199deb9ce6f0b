// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tagprint Print: serial job queue, OAuth-authenticated HTTP client with
// single-flight token refresh, Google Cloud Print API and the spooler that
// feeds it.  Domain types live in `tagprint-core`.

pub mod client;
pub mod cloudprint;
pub mod oauth;
pub mod queue;
pub mod spool;
pub mod transport;

pub use client::AuthenticatedPrintClient;
pub use cloudprint::CloudPrintApi;
pub use oauth::{GoogleTokenRefresher, TokenRefresher};
pub use queue::{QueueStats, SerialJobQueue};
pub use spool::PrintSpooler;
pub use transport::{
    HttpReply, HttpTransport, ReqwestTransport, RequestSpec, build_http_client,
    request_error,
};
