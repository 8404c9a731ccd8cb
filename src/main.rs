use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use screencast_recorder::media::pick_default_source;
use screencast_recorder::postprocess::PassthroughFixer;
use screencast_recorder::session::{HeadlessCameraWindow, NoCaptureExclusion};
use screencast_recorder::video::OverlayMetrics;
use screencast_recorder::{
    spawn_recorder, CaptureBackend, ChunkedDiskWriter, Config, DefaultRecordingSetup,
    DeviceEnumerator, FfmpegMetadataFixer, MetadataFixer, PcmGraphFactory, RecorderServices, SessionConfig,
    SessionEvent, SyntheticBackend, SyntheticEncoderFactory,
};

#[derive(Parser)]
#[command(name = "screencast-recorder")]
#[command(about = "Screen recording pipeline running against generated media")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/screencast-recorder")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List capturable screens and windows
    Sources,

    /// List microphones and cameras, one entry per physical device
    Devices,

    /// Record the synthetic screen
    Record {
        /// Duration to record in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Source id (defaults to the entire screen)
        #[arg(long)]
        source: Option<String>,

        /// Microphone device id
        #[arg(long)]
        mic: Option<String>,

        /// Camera device id for the overlay
        #[arg(long)]
        camera: Option<String>,

        /// Include desktop audio
        #[arg(long)]
        system_sound: bool,

        /// Output directory (overrides the configuration)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Run the ffmpeg metadata fix on the result
        #[arg(long)]
        fix_metadata: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter)))
        .init();

    let backend = Arc::new(SyntheticBackend::default());

    match cli.command {
        Command::Sources => {
            let sources = backend.list_sources().await?;
            let default_id = pick_default_source(&sources).map(|s| s.id.clone());
            for source in &sources {
                let marker = if Some(&source.id) == default_id.as_ref() { " (default)" } else { "" };
                info!("{:<10} {:?} {}{}", source.id, source.kind, source.name, marker);
            }
        }
        Command::Devices => {
            let lists = DeviceEnumerator::new(backend).list_devices().await;
            for mic in &lists.mics {
                info!("mic    {:<16} {}", mic.device_id, mic.label);
            }
            for camera in &lists.cameras {
                info!("camera {:<16} {}", camera.device_id, camera.label);
            }
        }
        Command::Record {
            duration,
            source,
            mic,
            camera,
            system_sound,
            output_dir,
            fix_metadata,
        } => {
            if let Some(dir) = output_dir {
                cfg.recording.recordings_path = dir;
            }

            let sources = backend.list_sources().await?;
            let selected = match source.as_deref() {
                Some(id) => sources.iter().find(|s| s.id == id),
                None => pick_default_source(&sources),
            }
            .cloned()
            .ok_or_else(|| anyhow!("no capture source available"))?;

            record(
                backend,
                cfg,
                SessionConfig {
                    source: Some(selected),
                    mic_id: mic,
                    camera_id: camera,
                    system_sound_enabled: system_sound,
                },
                Duration::from_secs(duration),
                fix_metadata,
            )
            .await?;
        }
    }

    Ok(())
}

async fn record(
    backend: Arc<SyntheticBackend>,
    cfg: Config,
    session: SessionConfig,
    duration: Duration,
    fix_metadata: bool,
) -> Result<()> {
    let camera_window = Arc::new(HeadlessCameraWindow::new(Some(OverlayMetrics {
        width: 240.0,
        height: 240.0,
        corner_radius_px: 120.0,
        device_pixel_ratio: Some(1.0),
    })));

    // Generated recordings are not real MP4s, so remuxing is opt-in here
    let fixer: Arc<dyn MetadataFixer> = if fix_metadata {
        Arc::new(FfmpegMetadataFixer::new(cfg.postprocess.ffmpeg_paths.clone()))
    } else {
        Arc::new(PassthroughFixer)
    };

    let services = RecorderServices {
        backend: backend.clone(),
        setup: Arc::new(DefaultRecordingSetup::new(
            backend,
            cfg.recording.recordings_path.clone(),
        )),
        sink: Arc::new(ChunkedDiskWriter::new()),
        fixer,
        encoders: Arc::new(SyntheticEncoderFactory::default()),
        audio_graphs: Arc::new(PcmGraphFactory::default()),
        camera_metrics: camera_window.clone(),
        camera_preview: camera_window,
        exclusion: Arc::new(NoCaptureExclusion),
    };

    let (recorder, task) = spawn_recorder(services, cfg);
    let mut events = recorder.subscribe();

    recorder.start(session).await?;
    info!("Recording started! Press Ctrl+C to stop early, or wait {} seconds", duration.as_secs());

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    if let Some(stats) = recorder.stats().await {
        info!("Recorded {} ({} chunks, {} bytes)", stats.elapsed_label, stats.chunks, stats.bytes);
    }
    recorder.stop();

    loop {
        match events.recv().await {
            Ok(SessionEvent::Saved { path }) => info!("Recording saved to {}", path.display()),
            Ok(SessionEvent::SaveFailed { path, message }) => {
                warn!("Saving failed: {} (raw file: {:?})", message, path)
            }
            Ok(SessionEvent::Failed { message }) => warn!("Recording failed: {}", message),
            Ok(SessionEvent::Ended) | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }

    drop(recorder);
    task.await?;
    Ok(())
}
