// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tagprint: prints every new Instagram picture carrying a hashtag.
//
// Entry point. Initialises logging and backend services, then either polls
// the tag feed until Ctrl-C or, with `reprint <image-id>...`, prints stored
// pictures again and exits.

mod feed;
mod services;

use std::process::ExitCode;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use tagprint_core::AppConfig;

use services::app_services::AppServices;

const USAGE: &str = "usage: tagprint [reprint <image-id>...]";

/// How long queued prints may keep running after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Tagprint starting");

    let mut args = std::env::args().skip(1);
    let command = args.next();
    let reprint_ids: Vec<String> = args.collect();
    match command.as_deref() {
        None => {}
        Some("reprint") if !reprint_ids.is_empty() => {}
        Some(_) => {
            error!("{USAGE}");
            return ExitCode::FAILURE;
        }
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let services = match AppServices::init(config).await {
        Ok(services) => services,
        Err(e) => {
            error!(error = %e, "could not initialise services");
            return ExitCode::FAILURE;
        }
    };

    info!(data_dir = %services.data_dir().display(), "services ready");

    if command.is_some() {
        return reprint(&services, &reprint_ids).await;
    }

    if let Err(e) = services.check_printer().await {
        warn!(error = %e, "printer lookup failed");
    }

    run(&services).await;
    shutdown(&services).await;
    ExitCode::SUCCESS
}

/// Print stored pictures again, then wait for the queue like a shutdown.
async fn reprint(services: &AppServices, image_ids: &[String]) -> ExitCode {
    let mut ok = true;
    for id in image_ids {
        if let Err(e) = services.reprint(id).await {
            error!(image_id = %id, error = %e, "cannot reprint");
            ok = false;
        }
    }

    shutdown(services).await;
    let stats = services.queue_stats();
    if ok && stats.succeeded == stats.enqueued {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Poll the tag feed until Ctrl-C.
async fn run(services: &AppServices) {
    let mut ticker = tokio::time::interval(services.config().poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        tag = %services.config().instagram_tag,
        interval_secs = services.config().poll_interval_secs,
        "polling tag feed"
    );

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    error!(error = %e, "cannot listen for Ctrl-C");
                }
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = services.poll_once().await {
                    warn!(error = %e, "tag feed poll failed");
                }
            }
        }
    }
}

/// Let queued prints finish, then report where they ended up.
async fn shutdown(services: &AppServices) {
    info!("shutting down, waiting for queued prints");
    if tokio::time::timeout(SHUTDOWN_GRACE, services.wait_idle())
        .await
        .is_err()
    {
        warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "queue still busy, giving up");
    }

    let stats = services.queue_stats();
    info!(
        enqueued = stats.enqueued,
        succeeded = stats.succeeded,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "queue totals"
    );

    match services.cloud_job_report(20).await {
        Ok(report) => {
            for (job, picture) in report {
                info!(
                    cloud_job_id = %job.id,
                    status = job.status.as_deref().unwrap_or("unknown"),
                    image_id = picture.as_ref().map(|p| p.image.id.as_str()).unwrap_or("-"),
                    "cloud print job"
                );
            }
        }
        Err(e) => warn!(error = %e, "could not list cloud print jobs"),
    }
}
