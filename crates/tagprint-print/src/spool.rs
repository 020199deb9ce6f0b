// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print spooler: fetch a picture into the spool directory, hand it to Cloud
// Print, and clean up the local copy whatever the outcome.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use tagprint_core::error::{Result, TagprintError};
use tagprint_core::types::{CloudJob, ImageDescriptor, PrintJob};

use crate::cloudprint::CloudPrintApi;

/// Downloads pictures and submits them to the configured printer.
#[derive(Clone)]
pub struct PrintSpooler {
    http: reqwest::Client,
    api: CloudPrintApi,
    spool_dir: PathBuf,
}

impl PrintSpooler {
    pub fn new(http: reqwest::Client, api: CloudPrintApi, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            api,
            spool_dir: spool_dir.into(),
        }
    }

    /// Local path a picture is spooled to.
    pub fn spool_path(&self, image: &ImageDescriptor) -> PathBuf {
        self.spool_dir.join(format!("{}.jpg", sanitize(&image.id)))
    }

    /// Print one picture.
    ///
    /// The spooled file is removed afterwards even when the submit fails.
    #[instrument(skip(self, image), fields(image_id = %image.id))]
    pub async fn submit_print_job(&self, image: &ImageDescriptor) -> Result<Option<CloudJob>> {
        let path = self.spool_path(image);
        let job = PrintJob::for_image(image);

        let outcome = match self.download(&image.image_url, &path).await {
            Ok(content) => self.api.submit(&job, content).await,
            Err(e) => Err(e),
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove spooled file"),
        }

        if outcome.is_ok() {
            info!(title = %job.title, url = %image.image_url, "printed file");
        }
        outcome
    }

    async fn download(&self, url: &str, path: &Path) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TagprintError::Download(format!(
                "{url}: server answered {}",
                status.as_u16()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(url, e))?;

        tokio::fs::create_dir_all(&self.spool_dir).await?;
        tokio::fs::write(path, &bytes).await?;
        Ok(bytes.to_vec())
    }
}

fn download_error(url: &str, e: reqwest::Error) -> TagprintError {
    if e.is_timeout() {
        TagprintError::TimedOut(format!("download {url}: {e}"))
    } else {
        TagprintError::Download(format!("{url}: {e}"))
    }
}

/// Keep ids usable as file names.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
