use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::link::LinkConfig;
use crate::session::SessionConfig;

/// Fixed name the API key is stored under in the secrets file.
const API_KEY_NAME: &str = "deepgram_api_key";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub audio: AudioSettings,
    pub link: LinkSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Deserialize)]
pub struct AudioSettings {
    /// Input device: "default", a device name, or a numeric index
    pub device: String,
    /// Frame size in milliseconds
    pub buffer_duration_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct LinkSettings {
    /// WebSocket endpoint of the transcription backend
    pub endpoint: String,
    /// Transcription model
    pub model: String,
    /// Backend-side punctuation
    pub punctuate: bool,
    /// Backend-side smart formatting
    pub smart_format: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    pub connect_poll_ms: u64,
    pub connect_timeout_ms: u64,
    pub flush_grace_ms: u64,
}

impl Config {
    /// Load configuration: built-in defaults layered under an optional TOML
    /// file, so the binary runs without any file present.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("audio.device", "default")?
            .set_default("audio.buffer_duration_ms", 100_i64)?
            .set_default("link.endpoint", "wss://api.deepgram.com/v1/listen")?
            .set_default("link.model", "nova-2")?
            .set_default("link.punctuate", true)?
            .set_default("link.smart_format", false)?
            .set_default("session.connect_poll_ms", 50_i64)?
            .set_default("session.connect_timeout_ms", 5000_i64)?
            .set_default("session.flush_grace_ms", 3000_i64)?
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Default config file path: `~/.config/voxstream/voxstream`.
    pub fn default_path() -> Result<String> {
        let dir = config_dir()?;
        Ok(dir.join("voxstream").to_string_lossy().into_owned())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device: self.audio.device.clone(),
            buffer_duration_ms: self.audio.buffer_duration_ms,
            ..CaptureConfig::default()
        }
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            endpoint: self.link.endpoint.clone(),
            model: self.link.model.clone(),
            punctuate: self.link.punctuate,
            smart_format: self.link.smart_format,
            ..LinkConfig::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_poll: Duration::from_millis(self.session.connect_poll_ms),
            connect_timeout: Duration::from_millis(self.session.connect_timeout_ms),
            flush_grace: Duration::from_millis(self.session.flush_grace_ms),
            ..SessionConfig::default()
        }
    }
}

/// Secrets file contents: a small key-value table with fixed key names.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Secrets {
    #[serde(default)]
    deepgram_api_key: Option<String>,
}

/// Stores the backend API key in a TOML file under the user's config
/// directory. Read once at startup; written on explicit save.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// A store backed by an explicit file path (used by tests).
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The default store at `~/.config/voxstream/secrets.toml`.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(config_dir()?.join("secrets.toml")))
    }

    /// Read the stored API key. A missing file means no key is configured.
    pub fn load_api_key(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let secrets: Secrets = toml::from_str(&content)
            .with_context(|| format!("malformed secrets file {}", self.path.display()))?;

        Ok(secrets
            .deepgram_api_key
            .filter(|key| !key.trim().is_empty()))
    }

    /// Persist the API key, creating the config directory if needed.
    pub fn save_api_key(&self, key: &str) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("secrets path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;

        let secrets = Secrets {
            deepgram_api_key: Some(key.trim().to_string()),
        };
        let content = toml::to_string_pretty(&secrets)?;
        std::fs::write(&self.path, content)?;

        tracing::info!("Saved {} to {}", API_KEY_NAME, self.path.display());
        Ok(())
    }
}

fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("could not find home directory"))?;
    Ok(home.join(".config").join("voxstream"))
}
