use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Encode the samples as little-endian PCM bytes, the wire format the
    /// transcription backend expects for `linear16` audio.
    pub fn pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Configuration for an audio capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Input device: "default" for the system default, otherwise a device
    /// name or numeric index
    pub device: String,
    /// Target sample rate expected by the transcription backend
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono)
    pub target_channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            target_sample_rate: 16000, // 16kHz contract of the STT backend
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms frames
        }
    }
}

/// Microphone capture backend trait
///
/// Implementations own an exclusive hardware resource; only one backend
/// should hold the device at a time. Frames are delivered through a channel
/// in capture order; the channel closing signals that capture has ended.
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Request microphone permission.
    ///
    /// Idempotent: the result is cached for the lifetime of the instance, so
    /// the platform prompt fires at most once per process. Denial is
    /// `Ok(false)`, not an error; the caller decides what to do next.
    async fn request_permission(&mut self) -> Result<bool>;

    /// Start capturing and return the frame receiver.
    ///
    /// Calling `start` while already capturing replaces the previous stream;
    /// the device is never captured twice concurrently.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the audio device. Safe to call when not
    /// capturing.
    async fn stop(&mut self) -> Result<()>;

    /// Check if the backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Convert a frame to the target rate and channel count expected by the
/// transcription backend.
pub fn convert_frame(frame: AudioFrame, target_sample_rate: u32, target_channels: u16) -> AudioFrame {
    let mut processed = frame;

    if processed.sample_rate != target_sample_rate {
        processed = downsample_frame(processed, target_sample_rate);
    }

    if processed.channels != target_channels && target_channels == 1 {
        processed = mix_to_mono(processed);
    }

    processed
}

/// Downsample a frame by nearest-sample index mapping, which handles
/// non-integer rate ratios (44.1 kHz devices included) without mislabeling
/// the output rate. Upsampling is not supported; frames at or below the
/// target rate pass through unchanged with their true rate.
pub fn downsample_frame(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate <= target_rate || target_rate == 0 {
        return frame;
    }

    let channels = frame.channels.max(1) as usize;
    let src_frames = frame.samples.len() / channels;
    let out_frames =
        (src_frames as u64 * target_rate as u64 / frame.sample_rate as u64) as usize;

    let mut downsampled = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let src = (i as u64 * frame.sample_rate as u64 / target_rate as u64) as usize;
        let start = src * channels;
        downsampled.extend_from_slice(&frame.samples[start..start + channels]);
    }

    AudioFrame {
        samples: downsampled,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Fold an interleaved multi-channel frame down to mono by averaging the
/// channels of each sample frame.
pub fn mix_to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mut mono_samples = Vec::with_capacity(frame.samples.len() / channels);

    for chunk in frame.samples.chunks_exact(channels) {
        let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
        let mono = (sum / channels as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        mono_samples.push(mono);
    }

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}
