//! corkboard-ingest - Bulletin Board Photo Ingest
//!
//! Ingests one bulletin board photo end-to-end and reports the outcome:
//! flyer detection, candidate extraction, moderation and decisions, venue
//! geocoding, and event promotion. Requires OPENAI_API_KEY; geocodes via
//! Mapbox when MAPBOX_API_KEY is set and a deterministic stub otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use corkboard_common::{EventBus, PipelineEvent};
use corkboard_ingest::models::Decision;
use corkboard_ingest::{api, db, IngestConfig, SubmissionPipeline};

/// Command-line arguments for corkboard-ingest
#[derive(Parser, Debug)]
#[command(name = "corkboard-ingest")]
#[command(about = "Bulletin board photo ingest for Corkboard")]
#[command(version)]
struct Args {
    /// Path to the board photo (JPEG, PNG, WebP or GIF)
    image: PathBuf,

    /// Data folder holding the SQLite database
    #[arg(long, env = "CORKBOARD_DATA_FOLDER")]
    data_folder: Option<String>,

    /// Label recorded on the submission (defaults to the file name)
    #[arg(long)]
    source_label: Option<String>,

    /// Print the final submission status as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corkboard_ingest=info,corkboard_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting corkboard-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = IngestConfig::load(args.data_folder.as_deref())?;
    if let Some(dir) = config.database_dir() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data folder {}", dir.display()))?;
    }

    let pool = db::init_database_pool(&config.database_path).await?;
    info!("Database: {}", config.database_path.display());

    let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
    let progress = tokio::spawn(print_progress(event_bus.subscribe()));

    let pipeline = SubmissionPipeline::from_config(pool.clone(), Arc::clone(&event_bus), &config)?;

    let image = std::fs::read(&args.image)
        .with_context(|| format!("Failed to read image {}", args.image.display()))?;
    let source_label = args
        .source_label
        .clone()
        .or_else(|| args.image.file_name().map(|n| n.to_string_lossy().into_owned()));

    let report = pipeline.ingest_image(&image, source_label).await?;

    // Drop every bus handle so the progress task drains and exits
    drop(pipeline);
    drop(event_bus);
    let _ = progress.await;

    if args.json {
        let status = api::submission_status(&pool, report.submission_id).await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("Submission {} finished: {}", report.submission_id, report.status);
    println!(
        "  flyers: {}  candidates: {}  published: {}  needs review: {}  blocked: {}  failed: {}",
        report.flyers.len(),
        report.candidates.len(),
        report.decided(Decision::Published),
        report.decided(Decision::NeedsReview),
        report.decided(Decision::Blocked),
        report.failed(),
    );
    for event_id in report.published_events() {
        println!("  published event: {}", event_id);
    }

    Ok(())
}

/// Print pipeline progress as it happens
async fn print_progress(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::SubmissionStatusChanged { new_status, .. } => {
            println!("  -> {}", new_status);
        }
        PipelineEvent::ExtractionCompleted {
            flyer_count,
            candidate_count,
            image_quality,
            ..
        } => {
            println!(
                "  extracted {} flyer(s), {} candidate(s){}",
                flyer_count,
                candidate_count,
                image_quality
                    .as_deref()
                    .map(|q| format!(", image quality {}", q))
                    .unwrap_or_default()
            );
        }
        PipelineEvent::CandidateDecided {
            candidate_id,
            decision,
            score,
            ..
        } => {
            println!("  candidate {}: {} (score {:.2})", candidate_id, decision, score);
        }
        PipelineEvent::EventPublished {
            event_id,
            canonical_key,
            published_via,
            ..
        } => {
            println!("  event {} published ({}, key {})", event_id, published_via, canonical_key);
        }
        PipelineEvent::EventUnpublished { event_id, reason, .. } => {
            println!("  event {} unpublished ({})", event_id, reason);
        }
        PipelineEvent::SubmissionFailed { message, .. } => {
            println!("  failed: {}", message);
        }
    }
}
