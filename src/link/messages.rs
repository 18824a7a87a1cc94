//! Wire types for the streaming transcription backend (Deepgram live API).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use super::LinkConfig;

/// Control message sent to the backend as a JSON text frame.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Ask the backend to finalize and close the stream.
    CloseStream,
    /// Keep the connection alive during silence.
    KeepAlive,
}

impl ControlMessage {
    pub fn to_json(self) -> String {
        // Serialization of a unit enum with a tag cannot fail
        serde_json::to_string(&self).unwrap_or_default()
    }
}

/// A transcript update extracted from a backend `Results` message.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptUpdate {
    pub text: String,
    pub is_final: bool,
    pub confidence: Option<f32>,
}

/// Transcript event received from the backend.
#[derive(Debug, Deserialize)]
struct ListenResponse {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_final: bool,
    channel: Option<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f32>,
}

/// Parse a raw inbound text frame into a transcript update.
///
/// Returns `None` for non-transcript messages (metadata, utterance markers),
/// malformed payloads, and empty transcripts. The backend emits empty
/// `Results` during silence and those must not reach the transcript model.
pub fn parse_transcript_event(raw: &str) -> Option<TranscriptUpdate> {
    let response: ListenResponse = serde_json::from_str(raw).ok()?;

    if response.kind.as_deref() != Some("Results") {
        return None;
    }

    let alternative = response.channel?.alternatives.into_iter().next()?;
    let text = alternative.transcript.trim();
    if text.is_empty() {
        return None;
    }

    Some(TranscriptUpdate {
        text: text.to_string(),
        is_final: response.is_final,
        confidence: alternative.confidence,
    })
}

/// Build the streaming endpoint URL with the audio format and formatting
/// parameters. The API key travels in the `Authorization` header, never in
/// the URL.
pub fn build_listen_url(config: &LinkConfig) -> Result<Url> {
    let mut url = Url::parse(&config.endpoint)?;

    url.query_pairs_mut()
        .append_pair("model", &config.model)
        .append_pair("encoding", "linear16")
        .append_pair("sample_rate", &config.sample_rate.to_string())
        .append_pair("channels", &config.channels.to_string())
        .append_pair("interim_results", bool_str(config.interim_results))
        .append_pair("punctuate", bool_str(config.punctuate))
        .append_pair("smart_format", bool_str(config.smart_format));

    Ok(url)
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
