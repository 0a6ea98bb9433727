use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_avatar::api::ApiServer;
use beacon_avatar::session::{
    AvatarRuntime, AvatarSession, AvatarSnapshot, Connector, MediaSubsystem, SessionEvent,
    TrackKind,
};
use beacon_avatar::signal::{AudioCapture, CaptureSource, SampleSource, WavSource};
use beacon_avatar::{Config, Error};

/// Participant id the local microphone is attached under
const MICROPHONE_PARTICIPANT: &str = "microphone";

/// Beacon Avatar - signal fusion and state engine for voice-agent avatars
#[derive(Parser)]
#[command(name = "beacon-avatar", version, about)]
struct Cli {
    /// Local participant identity
    #[arg(long, env = "BEACON_AVATAR_IDENTITY")]
    identity: Option<String>,

    /// Port to listen on
    #[arg(long, env = "BEACON_AVATAR_PORT")]
    port: Option<u16>,

    /// Frame ticks per second
    #[arg(long, env = "BEACON_AVATAR_FPS")]
    fps: Option<u32>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze microphone input and serve avatar snapshots over WebSocket
    Serve,
    /// Print the fused avatar state once per second
    Monitor {
        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
    /// Run a WAV file through the engine and print state changes
    Replay {
        /// WAV file to analyze
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_avatar=info",
        1 => "info,beacon_avatar=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(identity) = cli.identity {
        config.session.identity = identity;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(fps) = cli.fps {
        config.session.fps = fps;
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Monitor { duration } => monitor(&config, duration).await,
        Command::Replay { path } => replay(&config, &path),
    }
}

/// Connector for the local pipeline, which has no remote session to join
struct LocalConnector;

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&mut self) -> beacon_avatar::Result<()> {
        Ok(())
    }
}

/// Hands out the microphone tap once
struct CaptureMedia {
    source: Option<CaptureSource>,
}

impl MediaSubsystem for CaptureMedia {
    type Track = CaptureSource;

    fn attach_remote_audio(&mut self, participant_id: &str) -> beacon_avatar::Result<CaptureSource> {
        self.source.take().ok_or_else(|| {
            Error::Audio(format!("no capture available for participant {participant_id}"))
        })
    }

    fn create_analyzer(&mut self, track: CaptureSource) -> beacon_avatar::Result<Box<dyn SampleSource>> {
        Ok(Box::new(track))
    }
}

/// Open and start the default input device, if there is one
fn open_capture() -> Option<AudioCapture> {
    let mut capture = match AudioCapture::new() {
        Ok(capture) => capture,
        Err(e) => {
            tracing::warn!(error = %e, "microphone unavailable, running without audio analysis");
            return None;
        }
    };
    if let Err(e) = capture.start() {
        tracing::warn!(error = %e, "failed to start microphone, running without audio analysis");
        return None;
    }
    Some(capture)
}

/// Connect a runtime to the local microphone
async fn start_local(
    config: &Config,
    capture: Option<&AudioCapture>,
) -> anyhow::Result<AvatarRuntime<CaptureMedia>> {
    let session = Arc::new(AvatarSession::new(config));
    let media = CaptureMedia {
        source: capture.map(|c| c.source(&config.analysis)),
    };
    let mut runtime = AvatarRuntime::new(session, media, &config.session);

    runtime.connect(&mut LocalConnector).await?;
    runtime
        .handle_event(SessionEvent::TrackSubscribed {
            participant_id: MICROPHONE_PARTICIPANT.to_string(),
            kind: TrackKind::Audio,
        })
        .await;

    Ok(runtime)
}

#[allow(clippy::future_not_send)]
async fn serve(config: &Config) -> anyhow::Result<()> {
    let mut capture = open_capture();
    let mut runtime = start_local(config, capture.as_ref()).await?;

    let server = ApiServer::new(Arc::clone(runtime.session()), config.server.port).spawn();
    tracing::info!(
        identity = %config.session.identity,
        port = config.server.port,
        fps = config.session.fps,
        "beacon avatar ready"
    );

    let outcome = tokio::select! {
        result = server => match result {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    runtime.disconnect().await;
    if let Some(capture) = capture.as_mut() {
        capture.stop();
    }

    outcome
}

/// Print the fused state once per second
#[allow(clippy::future_not_send)]
async fn monitor(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Monitoring avatar state for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = open_capture();
    let mut runtime = start_local(config, capture.as_ref()).await?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = runtime.session().snapshot();
        println!("[{:2}s] {}", i + 1, describe(&snapshot));
    }

    runtime.disconnect().await;
    if let Some(capture) = capture.as_mut() {
        capture.stop();
    }

    println!("\n---");
    println!("If the meter stayed empty, check your input device and levels.");

    Ok(())
}

/// Replay a WAV file at frame rate, faster than real time
fn replay(config: &Config, path: &Path) -> anyhow::Result<()> {
    let mut source = WavSource::open(path, config.session.fps, &config.analysis)?;
    let session = AvatarSession::new(config);
    session.dispatch(SessionEvent::Connected);

    println!(
        "Replaying {} ({} Hz) at {} fps",
        path.display(),
        source.sample_rate(),
        config.session.fps
    );
    println!("---");

    let mut previous = session.snapshot();
    let mut frames = 0u64;
    let mut speaking_frames = 0u64;

    while !source.is_finished() {
        let window = source.read();
        let fused = session.tick(window.as_ref());
        frames += 1;
        if fused.is_speaking {
            speaking_frames += 1;
        }

        let snapshot = session.snapshot();
        if snapshot.robot != previous.robot || snapshot.emotion != previous.emotion {
            println!(
                "[{:7.2}s] {}",
                frame_seconds(frames, config.session.fps),
                describe(&snapshot)
            );
        }
        previous = snapshot;
    }

    session.dispatch(SessionEvent::Disconnected);

    println!("---");
    println!(
        "{frames} frames, speaking for {:.2}s",
        frame_seconds(speaking_frames, config.session.fps)
    );

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn frame_seconds(frames: u64, fps: u32) -> f64 {
    frames as f64 / f64::from(fps)
}

/// One-line meter for a snapshot
fn describe(snapshot: &AvatarSnapshot) -> String {
    let fused = snapshot.fused;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let meter_len = (fused.audio_level * 50.0).clamp(0.0, 50.0) as usize;
    let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

    format!(
        "level: {:.3} | freq: {:.2} | {:<10} | {:<9} | [{}]",
        fused.audio_level, fused.frequency, snapshot.robot, snapshot.emotion, meter
    )
}
