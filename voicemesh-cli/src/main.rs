use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use voicemesh::ParticipantId;
use voicemesh::client::media::{AudioCapture, SyntheticCapture};
use voicemesh::client::transport::RemoteAudioStream;
use voicemesh::client::{MeshConfig, MeshCoordinator, MeshObserver};
use voicemesh::model::IceServerConfig;

#[derive(Parser)]
#[command(name = "voicemesh-cli", version, about = "Join a peer-to-peer voice room")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a room and stay until `q` or Ctrl-C.
    Join {
        #[arg(long)]
        room: String,

        /// Overrides VOICEMESH_SIGNALING_URL.
        #[arg(long)]
        signaling_url: Option<String>,

        /// Overrides VOICEMESH_ICE_SERVER_URL.
        #[arg(long)]
        ice_url: Option<String>,

        #[arg(long)]
        muted: bool,

        /// Send a test tone instead of the microphone.
        #[arg(long)]
        tone: Option<f32>,
    },
}

struct ConsoleObserver;

#[async_trait]
impl MeshObserver for ConsoleObserver {
    async fn on_remote_stream(&self, participant: ParticipantId, mut stream: RemoteAudioStream) {
        println!(
            "{} {} ({} @ {} Hz)",
            "🔊 Hearing".green(),
            participant,
            stream.mime_type,
            stream.clock_rate
        );
        tokio::spawn(async move {
            let mut bytes = 0usize;
            while let Some(frame) = stream.recv().await {
                bytes += frame.len();
            }
            debug!("Audio from {} ended after {} bytes", participant, bytes);
        });
    }

    async fn on_peer_left(&self, participant: ParticipantId) {
        println!("{} {}", "👋 Left:".yellow(), participant);
    }

    async fn on_peer_joined(&self, participant: ParticipantId) {
        println!("{} {}", "➕ Connecting to".cyan(), participant);
    }

    async fn on_signaling_lost(&self) {
        println!(
            "{}",
            "⚠️  Signaling connection lost; no new participants can join this session."
                .red()
                .bold()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match Cli::parse().command {
        Commands::Join {
            room,
            signaling_url,
            ice_url,
            muted,
            tone,
        } => join(room, signaling_url, ice_url, muted, tone).await,
    }
}

async fn join(
    room: String,
    signaling_url: Option<String>,
    ice_url: Option<String>,
    muted: bool,
    tone: Option<f32>,
) -> Result<()> {
    let mut config = MeshConfig::from_env().context("Invalid VOICEMESH_* environment")?;
    if let Some(url) = signaling_url {
        config = config.with_signaling_url(url);
    }
    if let Some(url) = ice_url {
        config.transport.ice_servers = vec![IceServerConfig {
            urls: vec![url],
            username: None,
            credential: None,
        }];
    }

    let coordinator = MeshCoordinator::new(config, capture_backend(tone))
        .context("Failed to set up the voice mesh")?;

    println!("{} '{}'...", "📞 Joining room".green().bold(), room);
    let session = coordinator
        .start(room, Arc::new(ConsoleObserver))
        .await
        .context("Failed to join")?;
    if muted {
        session.set_microphone_enabled(false);
    }

    println!(
        "{} as {}. {} toggles mute, {} lists peers, {} quits.",
        "✅ Joined".green().bold(),
        session.participant_id(),
        "m".bold(),
        "p".bold(),
        "q".bold()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line?.as_deref().map(str::trim) {
                    Some("m") => {
                        let enabled = !session.is_microphone_enabled();
                        session.set_microphone_enabled(enabled);
                        let state = if enabled { "🎙️  Unmuted".green() } else { "🔇 Muted".yellow() };
                        println!("{}", state);
                    }
                    Some("p") => {
                        for peer in session.peers().await {
                            println!("   {} {:?} {:?}", peer.participant, peer.role, peer.state);
                        }
                    }
                    Some("q") | None => break,
                    Some(_) => {}
                }
            }
        }
    }

    coordinator.stop().await;
    println!("{}", "✨ Left the room.".green().bold());
    Ok(())
}

#[cfg(feature = "microphone")]
fn capture_backend(tone: Option<f32>) -> Arc<dyn AudioCapture> {
    match tone {
        Some(hz) => Arc::new(SyntheticCapture::tone(hz)),
        None => Arc::new(voicemesh::client::media::CpalCapture),
    }
}

#[cfg(not(feature = "microphone"))]
fn capture_backend(tone: Option<f32>) -> Arc<dyn AudioCapture> {
    match tone {
        Some(hz) => Arc::new(SyntheticCapture::tone(hz)),
        None => Arc::new(SyntheticCapture::silence()),
    }
}
