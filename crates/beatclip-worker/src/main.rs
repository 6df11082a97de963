//! Render worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use beatclip_giphy::{GiphyFetcher, KeywordImageFetcher};
use beatclip_media::{
    check_ffmpeg, check_ffprobe, FfmpegAudioAttacher, FfmpegConcatenator, FfmpegRunner,
    FfmpegSecondRenderer, RenderSettings,
};
use beatclip_models::RunOutcome;
use beatclip_worker::{
    Capabilities, JobRunner, JsonTempoEstimator, JsonTranscriber, RunConfig, Transcriber,
    WorkerConfig,
};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("beatclip=info".parse()?)
        .add_directive("beatclip_worker=info".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run() -> anyhow::Result<RunOutcome> {
    let metrics = beatclip_worker::metrics::init_metrics()
        .context("failed to install Prometheus recorder")?;

    let run_config = RunConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    let settings = RenderSettings::from_env();
    info!("Run config: {:?}", run_config);
    info!("Worker config: {:?}", worker_config);

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, finishing in-flight seconds");
            let _ = cancel_tx.send(true);
        }
    });

    let fetcher: Option<Arc<dyn KeywordImageFetcher>> = if run_config.segments_path.is_some() {
        Some(Arc::new(
            GiphyFetcher::from_env().context("failed to create GIPHY client")?,
        ))
    } else {
        None
    };
    let transcriber: Option<Arc<dyn Transcriber>> = run_config
        .lyrics_path
        .as_ref()
        .map(|path| Arc::new(JsonTranscriber::new(path)) as Arc<dyn Transcriber>);

    let runner = FfmpegRunner::new().with_cancel(cancel_rx.clone());
    let caps = Capabilities {
        tempo: Arc::new(JsonTempoEstimator::new(Some(run_config.tempo_source()))),
        transcriber,
        fetcher,
        renderer: Arc::new(FfmpegSecondRenderer::new(settings).with_cancel(cancel_rx.clone())),
        concatenator: Arc::new(FfmpegConcatenator::with_runner(runner.clone())),
        attacher: Arc::new(FfmpegAudioAttacher::new().with_runner(runner)),
    };

    let outcome = JobRunner::new(run_config, worker_config, caps)
        .with_cancel(cancel_rx)
        .run()
        .await;

    info!("Metrics snapshot:\n{}", metrics.render());
    Ok(outcome)
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    info!("Starting beatclip-worker");

    match run().await {
        Ok(RunOutcome::Completed { output_path }) => {
            info!(output = %output_path.display(), "Render complete");
        }
        Ok(RunOutcome::Clamped {
            output_path,
            actual_duration,
        }) => {
            warn!(
                output = %output_path.display(),
                actual_duration,
                "Render complete, shortened to the audio length"
            );
        }
        Ok(RunOutcome::Failed { reason }) => {
            error!("Render failed: {}", reason);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Worker error: {:#}", e);
            std::process::exit(1);
        }
    }
}
