// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Google Cloud Print endpoints used by tagprint:
//   - submit  (upload one document to a printer)
//   - search  (printers visible to the account)
//   - jobs    (jobs on our printer carrying our tag)

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use tagprint_core::error::{Result, TagprintError};
use tagprint_core::types::{CloudJob, CloudPrinter, PrintJob};

use crate::client::AuthenticatedPrintClient;
use crate::transport::{FilePart, RequestSpec};

/// Print ticket accepted by every printer: all defaults.
const DEFAULT_TICKET: &str = r#"{ "version": "1.0", "print": {} }"#;

/// Envelope shared by every Cloud Print reply.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    payload: T,
}

impl<T> Envelope<T> {
    fn into_payload(self) -> Result<T> {
        if self.success {
            Ok(self.payload)
        } else {
            Err(TagprintError::PrintRejected(
                self.message.unwrap_or_else(|| "no reason given".into()),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitPayload {
    #[serde(default)]
    job: Option<CloudJob>,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    printers: Vec<CloudPrinter>,
}

#[derive(Debug, Deserialize)]
struct JobsPayload {
    #[serde(default)]
    jobs: Vec<CloudJob>,
}

/// Cloud Print API bound to one printer and one job tag.
#[derive(Clone)]
pub struct CloudPrintApi {
    client: Arc<AuthenticatedPrintClient>,
    base_url: String,
    printer_id: String,
    tag: String,
}

impl CloudPrintApi {
    pub fn new(
        client: Arc<AuthenticatedPrintClient>,
        base_url: impl Into<String>,
        printer_id: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            printer_id: printer_id.into(),
            tag: tag.into(),
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{name}", self.base_url)
    }

    /// Build the submit request for `job`.
    pub fn submit_request(&self, job: &PrintJob, content: Vec<u8>) -> RequestSpec {
        RequestSpec::post(self.endpoint("submit"))
            .field("printerid", self.printer_id.as_str())
            .field("ticket", DEFAULT_TICKET)
            .field("contentType", job.content_type.as_str())
            .field("title", job.title.as_str())
            .field("tag", self.tag.as_str())
            .file(FilePart {
                field: "content".into(),
                file_name: job.title.clone(),
                content_type: job.content_type.clone(),
                bytes: content,
            })
    }

    /// Upload `content` as a new print job.
    ///
    /// Returns the job as registered by the print service, when it reports
    /// one.
    #[instrument(skip(self, content), fields(job_id = %job.id, title = %job.title, bytes = content.len()))]
    pub async fn submit(&self, job: &PrintJob, content: Vec<u8>) -> Result<Option<CloudJob>> {
        let request = self.submit_request(job, content);
        let envelope: Envelope<SubmitPayload> = self.client.call(&request).await?;
        let cloud_job = envelope.into_payload()?.job;

        info!(
            cloud_job_id = cloud_job.as_ref().map(|j| j.id.as_str()).unwrap_or("-"),
            "print job accepted"
        );
        Ok(cloud_job)
    }

    /// Printers visible to the authenticated account.
    #[instrument(skip(self))]
    pub async fn search_printers(&self) -> Result<Vec<CloudPrinter>> {
        let request = RequestSpec::get(self.endpoint("search"));
        let envelope: Envelope<SearchPayload> = self.client.call(&request).await?;
        Ok(envelope.into_payload()?.printers)
    }

    /// Our jobs on the configured printer, newest first.
    #[instrument(skip(self))]
    pub async fn list_jobs(&self, limit: u32, offset: u32) -> Result<Vec<CloudJob>> {
        let request = RequestSpec::post(self.endpoint("jobs"))
            .field("q", self.tag.as_str())
            .field("printerid", self.printer_id.as_str())
            .field("sortorder", "CREATE_TIME_DESC")
            .field("limit", limit.to_string())
            .field("offset", offset.to_string());
        let envelope: Envelope<JobsPayload> = self.client.call(&request).await?;
        Ok(envelope.into_payload()?.jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use tagprint_core::types::{Credential, ImageDescriptor, TokenGrant};

    use crate::oauth::TokenRefresher;
    use crate::transport::{HttpReply, HttpTransport, Method};

    struct CannedTransport {
        body: &'static str,
        seen: Mutex<Vec<RequestSpec>>,
    }

    #[async_trait]
    impl HttpTransport for CannedTransport {
        async fn send(&self, request: &RequestSpec, _token: &str) -> Result<HttpReply> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(HttpReply::new(200, self.body))
        }
    }

    struct NoRefresh;

    #[async_trait]
    impl TokenRefresher for NoRefresh {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
            Err(TagprintError::AuthRefreshFailed("not expected".into()))
        }
    }

    fn api(body: &'static str) -> (CloudPrintApi, Arc<CannedTransport>) {
        let transport = Arc::new(CannedTransport {
            body,
            seen: Mutex::new(Vec::new()),
        });
        let client = AuthenticatedPrintClient::new(
            transport.clone(),
            Arc::new(NoRefresh),
            Credential::new("token", "refresh"),
        );
        (
            CloudPrintApi::new(Arc::new(client), "https://print.test/cloudprint/", "printer-1", "tagjob"),
            transport,
        )
    }

    fn job() -> PrintJob {
        PrintJob::for_image(&ImageDescriptor {
            id: "42".into(),
            created_time: "0".into(),
            image_url: "https://cdn.test/42.jpg".into(),
            width: None,
            height: None,
            tags: vec![],
        })
    }

    #[test]
    fn submit_request_carries_ticket_tag_and_file() {
        let (api, _) = api("{}");
        let request = api.submit_request(&job(), vec![0xFF, 0xD8]);

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://print.test/cloudprint/submit");
        assert_eq!(request.field_value("printerid"), Some("printer-1"));
        assert_eq!(request.field_value("tag"), Some("tagjob"));
        assert_eq!(request.field_value("contentType"), Some("image/jpeg"));
        assert_eq!(request.field_value("title"), Some("42.jpg"));
        assert_eq!(request.field_value("ticket"), Some(DEFAULT_TICKET));

        let file = request.file.expect("file part");
        assert_eq!(file.field, "content");
        assert_eq!(file.bytes, vec![0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn submit_returns_registered_job() {
        let (api, _) = api(
            r#"{"success":true,"message":"Print job added.","job":{"id":"job-7","title":"42.jpg","status":"QUEUED"}}"#,
        );
        let cloud_job = api.submit(&job(), vec![1]).await.expect("submit").expect("job");
        assert_eq!(cloud_job.id, "job-7");
        assert_eq!(cloud_job.status.as_deref(), Some("QUEUED"));
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_print_rejection() {
        let (api, _) = api(r#"{"success":false,"message":"Printer is offline."}"#);
        match api.submit(&job(), vec![1]).await {
            Err(TagprintError::PrintRejected(message)) => {
                assert_eq!(message, "Printer is offline.");
            }
            other => panic!("expected print rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_decodes_printers() {
        let (api, transport) = api(
            r#"{"success":true,"printers":[{"id":"p1","name":"Office","displayName":"Office Laser"}]}"#,
        );
        let printers = api.search_printers().await.expect("search");
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].display_name.as_deref(), Some("Office Laser"));
        assert_eq!(transport.seen.lock().unwrap()[0].method, Method::Get);
    }

    #[tokio::test]
    async fn list_jobs_filters_by_tag_and_printer() {
        let (api, transport) = api(r#"{"success":true,"jobs":[{"id":"j1"},{"id":"j2"}]}"#);
        let jobs = api.list_jobs(10, 20).await.expect("jobs");
        assert_eq!(jobs.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(), ["j1", "j2"]);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://print.test/cloudprint/jobs");
        assert_eq!(seen[0].field_value("q"), Some("tagjob"));
        assert_eq!(seen[0].field_value("printerid"), Some("printer-1"));
        assert_eq!(seen[0].field_value("limit"), Some("10"));
        assert_eq!(seen[0].field_value("offset"), Some("20"));
    }
}
