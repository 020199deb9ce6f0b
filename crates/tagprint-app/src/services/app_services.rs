// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: initialises every backend subsystem once and offers
// the handful of operations the poll loop needs.
//
// `PictureStore` wraps a rusqlite connection, which is `Send` but not `Sync`,
// so it sits behind `Arc<Mutex<>>` and is only touched from the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use tagprint_core::AppConfig;
use tagprint_core::error::{Result, TagprintError};
use tagprint_core::store::CredentialStore;
use tagprint_core::types::{CloudJob, Credential, ImageDescriptor, PictureRecord};
use tagprint_print::{
    AuthenticatedPrintClient, CloudPrintApi, GoogleTokenRefresher, PrintSpooler, QueueStats,
    ReqwestTransport, SerialJobQueue, build_http_client,
};
use tagprint_store::{PictureStore, SqliteCredentialStore};

use super::data_dir;
use crate::feed::InstagramFeed;

/// Shared application services.
///
/// All fields are cheaply cloneable (Arc-wrapped or handle types) so the
/// struct can be moved into spawned tasks.
#[derive(Clone)]
pub struct AppServices {
    config: Arc<AppConfig>,
    pictures: Arc<Mutex<PictureStore>>,
    client: Arc<AuthenticatedPrintClient>,
    api: CloudPrintApi,
    spooler: PrintSpooler,
    queue: SerialJobQueue,
    feed: InstagramFeed,
    data_dir: PathBuf,
}

impl AppServices {
    /// Initialise all services.  Call once at startup.
    ///
    /// Opens the SQLite databases and loads the credential; no network call
    /// is made.
    pub async fn init(config: AppConfig) -> Result<Self> {
        let dir = data_dir::data_dir(config.data_dir.as_deref())?;
        info!(path = %dir.display(), account = %config.account, "initialising app services");

        let credentials = Arc::new(SqliteCredentialStore::open(
            dir.join("credentials.db"),
            &config.account,
        )?);
        let pictures = PictureStore::open(dir.join("pictures.db"))?;
        let credential = bootstrap_credential(&*credentials, &config).await?;

        let http = build_http_client(config.request_timeout())?;
        let refresher = GoogleTokenRefresher::new(
            http.clone(),
            config.token_endpoint.as_str(),
            config.google_client_id.as_str(),
            config.google_client_secret.as_str(),
        )
        .with_redirect_uri(config.google_redirect.clone());
        let client = Arc::new(
            AuthenticatedPrintClient::new(
                Arc::new(ReqwestTransport::new(http.clone())),
                Arc::new(refresher),
                credential,
            )
            .with_store(credentials),
        );

        let api = CloudPrintApi::new(
            Arc::clone(&client),
            config.cloudprint_url.as_str(),
            config.printer_id.as_str(),
            config.print_tag.as_str(),
        );
        let spooler = PrintSpooler::new(http.clone(), api.clone(), data_dir::data_subdir(&dir, "spool")?);
        let queue = match config.task_timeout() {
            Some(limit) => SerialJobQueue::with_task_timeout(limit),
            None => SerialJobQueue::new(),
        };
        let feed = InstagramFeed::new(
            http,
            config.instagram_api_url.as_str(),
            config.instagram_client_id.as_str(),
        );

        info!("app services initialised");

        Ok(Self {
            config: Arc::new(config),
            pictures: Arc::new(Mutex::new(pictures)),
            client,
            api,
            spooler,
            queue,
            feed,
            data_dir: dir,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Resolve once every queued print has finished.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    // -- Feed ----------------------------------------------------------------

    /// Fetch the tag feed once and enqueue a print for every new picture.
    ///
    /// Returns the number of pictures enqueued.
    #[instrument(skip(self), fields(tag = %self.config.instagram_tag))]
    pub async fn poll_once(&self) -> Result<usize> {
        let tag = self.config.instagram_tag.as_str();
        if tag.is_empty() {
            debug!("no tag configured, nothing to poll");
            return Ok(0);
        }

        let images = self.feed.recent(tag).await?;
        let fetched = images.len();
        let fresh = with_pictures(&self.pictures, move |store| store.insert_new(&images)).await?;

        for image in &fresh {
            self.enqueue_print(image.clone());
        }
        info!(fetched, new = fresh.len(), "tag feed polled");
        Ok(fresh.len())
    }

    // -- Printing ------------------------------------------------------------

    /// Queue one picture for printing and record the outcome in the picture
    /// store.
    pub fn enqueue_print(&self, image: ImageDescriptor) {
        let spooler = self.spooler.clone();
        let pictures = Arc::clone(&self.pictures);

        self.queue.enqueue(move || async move {
            let outcome = spooler.submit_print_job(&image).await;
            let id = image.id.clone();

            let recorded = match &outcome {
                Ok(job) => {
                    let job_id = job.as_ref().map(|j| j.id.clone());
                    with_pictures(&pictures, move |store| store.mark_submitted(&id, job_id.as_deref())).await
                }
                Err(e) => {
                    let message = e.to_string();
                    with_pictures(&pictures, move |store| store.mark_failed(&id, &message)).await
                }
            };
            if let Err(e) = recorded {
                warn!(image_id = %image.id, error = %e, "could not record print outcome");
            }

            outcome.map(|_| ())
        });
    }

    /// Queue an already-seen picture for printing again, whatever its current
    /// status.
    #[instrument(skip(self))]
    pub async fn reprint(&self, image_id: &str) -> Result<()> {
        let id = image_id.to_string();
        let record = with_pictures(&self.pictures, move |store| {
            let record = store
                .get(&id)?
                .ok_or_else(|| TagprintError::PictureNotFound(id.clone()))?;
            store.mark_pending(&id)?;
            Ok(record)
        })
        .await?;

        info!(previous = record.status.as_str(), "picture queued for reprint");
        self.enqueue_print(record.image);
        Ok(())
    }

    /// Warn when the configured printer is not visible to the account.
    pub async fn check_printer(&self) -> Result<bool> {
        let printers = self.api.search_printers().await?;
        let found = printers.iter().any(|p| p.id == self.config.printer_id);
        if found {
            info!(printer_id = %self.config.printer_id, "printer available");
        } else {
            warn!(
                printer_id = %self.config.printer_id,
                visible = printers.len(),
                "configured printer not found"
            );
        }
        Ok(found)
    }

    /// Our most recent cloud jobs, each paired with the picture it printed.
    pub async fn cloud_job_report(&self, limit: u32) -> Result<Vec<(CloudJob, Option<PictureRecord>)>> {
        let jobs = self.api.list_jobs(limit, 0).await?;
        let ids: Vec<String> = jobs.iter().map(|j| j.id.clone()).collect();
        let records = with_pictures(&self.pictures, move |store| store.for_cloud_jobs(&ids)).await?;

        Ok(jobs
            .into_iter()
            .map(|job| {
                let record = records
                    .iter()
                    .find(|r| r.cloud_job_id.as_deref() == Some(job.id.as_str()))
                    .cloned();
                (job, record)
            })
            .collect())
    }
}

/// Pick the credential to start with.
///
/// A stored credential wins.  Otherwise the tokens from the configuration are
/// used and persisted, so later runs no longer need them.
pub async fn bootstrap_credential(
    store: &dyn CredentialStore,
    config: &AppConfig,
) -> Result<Credential> {
    if let Some(credential) = store.load().await? {
        debug!("using stored credential");
        return Ok(credential);
    }

    match (&config.initial_access_token, &config.initial_refresh_token) {
        (None, None) => Err(TagprintError::MissingCredential(config.account.clone())),
        (access, refresh) => {
            let credential = Credential::new(
                access.clone().unwrap_or_default(),
                refresh.clone().unwrap_or_default(),
            );
            store.save(&credential).await?;
            info!(account = %config.account, "credential seeded from configuration");
            Ok(credential)
        }
    }
}

/// Run `op` against the picture store on the blocking pool.
async fn with_pictures<T, F>(pictures: &Arc<Mutex<PictureStore>>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PictureStore) -> Result<T> + Send + 'static,
{
    let pictures = Arc::clone(pictures);
    tokio::task::spawn_blocking(move || {
        let mut store = pictures.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut store)
    })
    .await
    .map_err(|e| TagprintError::Database(format!("picture store task failed: {e}")))?
}
