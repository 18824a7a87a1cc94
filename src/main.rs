use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::time::Duration;
use tracing::info;
use voxstream::{
    Config, CredentialStore, DeepgramLinkFactory, MicrophoneCapture, SessionController,
    SessionState,
};

#[derive(Parser)]
#[command(name = "voxstream", version, about = "Live microphone transcription")]
struct Cli {
    /// Path to a TOML config file (defaults to ~/.config/voxstream/voxstream.toml)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the microphone and print the live transcript (default)
    Record {
        /// Stop automatically after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Input device: "default", a device name, or a numeric index
        #[arg(long)]
        device: Option<String>,
    },
    /// Save the transcription backend API key
    SetKey {
        /// The API key value
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)?;

    match cli.command.unwrap_or(Command::Record {
        duration: None,
        device: None,
    }) {
        Command::SetKey { key } => {
            CredentialStore::default_location()?.save_api_key(&key)?;
            println!("API key saved.");
            Ok(())
        }
        Command::Record { duration, device } => record(config, duration, device).await,
    }
}

async fn record(config: Config, duration: Option<u64>, device: Option<String>) -> Result<()> {
    let api_key = CredentialStore::default_location()?.load_api_key()?;
    if api_key.is_none() {
        anyhow::bail!("no API key configured, run `voxstream set-key <KEY>` first");
    }

    let mut capture_config = config.capture_config();
    if let Some(device) = device {
        capture_config.device = device;
    }

    let capture = Box::new(MicrophoneCapture::new(capture_config));
    let links = Box::new(DeepgramLinkFactory::new(config.link_config()));
    let mut session = SessionController::new(config.session_config(), api_key, capture, links);

    // One platform prompt, up front
    if !session.request_permission().await {
        anyhow::bail!("microphone permission denied");
    }

    session.start().await?;
    info!("Recording, press Ctrl-C to stop");

    let deadline = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let mut printed_segments = 0usize;
    let mut last_interim = String::new();

    loop {
        let snapshot = session.snapshot().await;

        for segment in snapshot.segments.iter().skip(printed_segments) {
            println!("\n{}", segment.text);
            printed_segments += 1;
            last_interim.clear();
        }
        if let Some(interim) = snapshot.interim.as_deref() {
            if interim != last_interim {
                print!("\r{}", interim);
                let _ = std::io::stdout().flush();
                last_interim = interim.to_string();
            }
        }

        if snapshot.state == SessionState::Error {
            eprintln!(
                "\nSession error: {}",
                snapshot.last_error.unwrap_or_else(|| "unknown".to_string())
            );
            break;
        }

        if deadline
            .map(|d| tokio::time::Instant::now() >= d)
            .unwrap_or(false)
        {
            info!("Recording duration reached");
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }

    session.stop().await;

    let transcript = session.full_text().await;
    if !transcript.is_empty() {
        println!("\n--- transcript ---");
        println!("{}", transcript);
    }

    Ok(())
}
