mod args;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use netlift::agent::{Agent, JobExecutor, QueueClient};
use netlift::capture::ffmpeg::FfmpegCamera;
use netlift::capture::{CapturePipeline, MediaUploader};
use netlift::config::AgentConfig;
use netlift::device::open_actuator;
use netlift::shutdown;
use netlift::types::unit::UnitId;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use crate::args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging
    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt().json().init();
    }

    let cancel = shutdown::install();

    if let Err(error) = begin(args, cancel).await {
        error!(error = %format!("{error:#}"), "encountered runtime error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn load_config(args: &Args) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };

    if let Some(unit_id) = args.unit_id {
        config.unit_id = UnitId(unit_id);
    }
    if let Some(url) = &args.queue_url {
        config.queue.url.clone_from(url);
    }
    if let Some(url) = &args.media_ingest_url {
        config.capture.media_ingest_url = Some(url.clone());
    }
    if args.simulate {
        config.hardware.simulate = true;
    }

    Ok(config)
}

async fn begin(args: Args, cancel: CancellationToken) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        unit_id = %config.unit_id,
        queue = %config.queue.url,
        "starting agent"
    );

    let actuator = open_actuator(&config.hardware, config.actuation.clone())
        .context("opening hardware")?;

    let uploader = match &config.capture.media_ingest_url {
        Some(url) => Some(
            MediaUploader::new(url.clone(), config.capture.upload_timeout())
                .context("building media uploader")?,
        ),
        None => {
            warn!("no media ingest URL, captures will stay on disk");
            None
        },
    };
    let camera = Arc::new(FfmpegCamera::new(&config.capture));
    let capture =
        CapturePipeline::new(camera, config.capture.clone(), uploader);

    let client = QueueClient::new(
        &config.queue.url,
        config.unit_id,
        config.queue.request_timeout(),
    )
    .context("building queue client")?;
    let executor = JobExecutor::new(config.unit_id, actuator, capture);

    Agent::new(client, executor, config.queue.poll_interval())
        .run(cancel)
        .await?;

    Ok(())
}
