//! Main entry point for vidl CLI

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidl::cli::args::VerbosityLevel;
use vidl::cli::output::{create_progress_callback, format_duration};
use vidl::cli::{Args, OutputFormatter};
use vidl::core::downloader::select_videos;
use vidl::platform::credentials::{EnvSource, PromptSource};
use vidl::{
    ClientContext, CredentialSource, CredentialStore, DownloadOptions, Downloader, SiteEndpoints,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    init_logging(args.verbosity_level());
    debug!("Starting vidl with args: {:?}", args);

    let formatter = Arc::new(OutputFormatter::new(
        args.verbosity_level(),
        !args.no_progress,
    ));

    match run(&args, formatter.clone()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            formatter.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

async fn run(args: &Args, formatter: Arc<OutputFormatter>) -> anyhow::Result<()> {
    let start_time = Instant::now();

    let store = match &args.cookie_file {
        Some(path) => CredentialStore::new(path),
        None => CredentialStore::default_location()?,
    };
    let source: Arc<dyn CredentialSource> = match &args.cookie_env {
        Some(var) => Arc::new(EnvSource::new(var)),
        None => Arc::new(PromptSource),
    };
    let ctx = Arc::new(ClientContext::new(args.client_config(), store, source)?);

    let site = args
        .site
        .as_deref()
        .or_else(|| args.urls.iter().map(String::as_str).find(|u| u.contains("://")))
        .context("no site origin: pass a page URL or --site")?;
    let endpoints = SiteEndpoints::from_url(site)?;
    info!("Using site {}", endpoints.origin());

    let options = DownloadOptions {
        destination: args.destination.clone(),
        quality: args.effective_quality(),
        overwrite: args.overwrite,
        force_new_credential: args.new_cookie,
        engine: args.engine_config(),
    };
    let downloader = Downloader::new(ctx, endpoints, options)
        .with_progress(Arc::new(create_progress_callback(formatter.clone())));

    let collection = downloader
        .collect_all(&args.urls, |url, result| match result {
            Ok(found) => formatter.info(&format!("Found {} video(s) at {}", found.len(), url)),
            Err(e) if e.is_skippable() => formatter.warning(&format!("Skipping {}: {}", url, e)),
            Err(e) => formatter.error(&format!("Failed to list {}: {}", url, e)),
        })
        .await;
    let videos = select_videos(collection.videos, args.reversed, args.maximum);

    let report = downloader
        .download_all(
            &videos,
            |index, total, video| formatter.begin_item(index, total, video),
            |video, result| match result {
                Ok(outcome) => formatter.finish_item(outcome),
                Err(e) => formatter.error(&format!("{} (#{}): {}", video.title, video.id, e)),
            },
        )
        .await;

    if !collection.failures.is_empty() {
        bail!("{} input(s) could not be listed", collection.failures.len());
    }
    if !report.is_success() {
        bail!(
            "{} of {} video(s) failed",
            report.failures.len(),
            videos.len()
        );
    }

    formatter.success(&format!(
        "Finished {} video(s) in {}",
        report.outcomes.len(),
        format_duration(start_time.elapsed())
    ));
    Ok(())
}

/// Initialize logging system
fn init_logging(verbosity: VerbosityLevel) {
    let default_level = match verbosity {
        VerbosityLevel::Verbose => "debug",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Quiet => "error",
    };

    // RUST_LOG takes precedence over the verbosity flags
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
