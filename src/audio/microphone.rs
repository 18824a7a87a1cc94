//! cpal microphone backend.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated capture
//! thread. The async side talks to it through the frame channel and a stop
//! flag; stream setup errors are reported back through a ready handshake so
//! `start()` can fail synchronously.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::capture::{AudioCapture, AudioFrame, CaptureConfig};

/// How long `start()` waits for the capture thread to report stream setup.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Microphone capture backend backed by cpal.
pub struct MicrophoneCapture {
    config: CaptureConfig,
    /// Cached permission probe result (at most one platform prompt per process)
    permission: Option<bool>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
    capturing: bool,
}

impl MicrophoneCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            permission: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioCapture for MicrophoneCapture {
    async fn request_permission(&mut self) -> Result<bool> {
        if let Some(granted) = self.permission {
            return Ok(granted);
        }

        // Opening the input device is what triggers the OS-level microphone
        // prompt on macOS; on other platforms this probes device presence.
        let device_spec = self.config.device.clone();
        let granted = tokio::task::spawn_blocking(move || match open_device(&device_spec) {
            Ok(device) => match device.default_input_config() {
                Ok(_) => true,
                Err(e) => {
                    warn!("Microphone config probe failed: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Microphone device probe failed: {}", e);
                false
            }
        })
        .await?;

        self.permission = Some(granted);
        info!("Microphone permission {}", if granted { "granted" } else { "denied" });
        Ok(granted)
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing {
            // Replace the previous stream rather than capturing twice
            warn!("Capture already active, restarting stream");
            self.stop().await?;
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(64);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::result::Result<(), String>>();

        let config = self.config.clone();
        let thread_stop = Arc::clone(&stop_flag);
        let worker = std::thread::Builder::new()
            .name("voxstream-capture".to_string())
            .spawn(move || run_capture(config, frame_tx, thread_stop, ready_tx))?;

        // Wait for the capture thread to confirm the stream is running
        let ready = tokio::task::spawn_blocking(move || ready_rx.recv_timeout(READY_TIMEOUT)).await?;
        match ready {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => {
                let _ = join_capture_thread(worker).await;
                return Err(anyhow!("failed to start audio capture: {msg}"));
            }
            Err(_) => {
                stop_flag.store(true, Ordering::SeqCst);
                let _ = join_capture_thread(worker).await;
                return Err(anyhow!("timed out waiting for audio capture to start"));
            }
        }

        self.stop_flag = stop_flag;
        self.worker = Some(worker);
        self.capturing = true;

        info!("Microphone capture started");
        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing && self.worker.is_none() {
            return Ok(());
        }

        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            // The thread exits within one poll tick once the flag is raised
            join_capture_thread(worker).await?;
        }

        self.capturing = false;
        info!("Microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "microphone (cpal)"
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        // Raise the flag so the capture thread releases the device even if
        // the caller never stopped explicitly.
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

/// Accumulates device callbacks into fixed-duration frames and pushes them
/// into the async frame channel.
struct FrameAssembler {
    tx: mpsc::Sender<AudioFrame>,
    buffer: Vec<i16>,
    chunk_len: usize,
    sample_rate: u32,
    channels: u16,
    started: Instant,
}

impl FrameAssembler {
    fn push(&mut self, data: &[i16]) {
        self.buffer.extend_from_slice(data);

        while self.buffer.len() >= self.chunk_len {
            let rest = self.buffer.split_off(self.chunk_len);
            let samples = std::mem::replace(&mut self.buffer, rest);
            let frame = AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: self.started.elapsed().as_millis() as u64,
            };
            // Never block the audio callback; drop the frame on backpressure
            if self.tx.try_send(frame).is_err() {
                debug!("Frame channel full, dropping audio frame");
            }
        }
    }
}

/// Capture thread body: owns the cpal stream for its whole lifetime.
fn run_capture(
    config: CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    stop_flag: Arc<AtomicBool>,
    ready_tx: std::sync::mpsc::Sender<std::result::Result<(), String>>,
) {
    let setup = || -> Result<(cpal::Stream, String)> {
        let device = open_device(&config.device)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown device".to_string());

        let supported = device.default_input_config()?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();

        debug!(
            "Device configuration: {}Hz, {} channels, {:?}",
            sample_rate, channels, sample_format
        );

        let chunk_len =
            (sample_rate as u64 * config.buffer_duration_ms / 1000) as usize * channels as usize;
        let mut assembler = FrameAssembler {
            tx: frame_tx.clone(),
            buffer: Vec::with_capacity(chunk_len.max(1)),
            chunk_len: chunk_len.max(1),
            sample_rate,
            channels,
            started: Instant::now(),
        };

        let err_stop = Arc::clone(&stop_flag);
        let err_fn = move |err: cpal::StreamError| {
            error!("Audio stream error: {}", err);
            // Ends the capture loop; the session sees the frame channel close
            err_stop.store(true, Ordering::SeqCst);
        };

        let stream = match sample_format {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    assembler.push(data);
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    assembler.push(&converted);
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(anyhow!("unsupported sample format: {other:?}"));
            }
        };

        stream.play()?;
        Ok((stream, device_name))
    };

    match setup() {
        Ok((stream, device_name)) => {
            info!("Recording device: {}", device_name);
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until asked to stop or the session side
            // drops the receiver
            while !stop_flag.load(Ordering::SeqCst) && !frame_tx.is_closed() {
                std::thread::sleep(Duration::from_millis(50));
            }

            drop(stream);
            debug!("Capture thread exiting");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
        }
    }
}

/// Join a capture thread off the async runtime, so a slow or hung device
/// teardown blocks a pool thread instead of a tokio worker.
async fn join_capture_thread(worker: std::thread::JoinHandle<()>) -> Result<()> {
    let joined = tokio::task::spawn_blocking(move || worker.join()).await?;
    if joined.is_err() {
        warn!("Capture thread panicked during shutdown");
    }
    Ok(())
}

/// Finds an audio input device by name or numeric index; "default" selects
/// the system default device.
fn open_device(device_spec: &str) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if device_spec == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow!("no audio input device available"));
    }

    if let Ok(index) = device_spec.parse::<usize>() {
        let devices: Vec<_> = host
            .input_devices()
            .map_err(|e| anyhow!("failed to enumerate devices: {e}"))?
            .collect();
        return devices
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow!("audio input device index {index} is out of range"));
    }

    let devices = host
        .input_devices()
        .map_err(|e| anyhow!("failed to enumerate devices: {e}"))?;
    for device in devices {
        if device.name().map(|n| n == device_spec).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(anyhow!("audio input device '{device_spec}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(flavor = "current_thread")]
    async fn slow_thread_join_keeps_the_runtime_responsive() {
        let worker = std::thread::spawn(|| std::thread::sleep(Duration::from_millis(200)));

        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        join_capture_thread(worker).await.unwrap();
        ticker.abort();

        // On a single-threaded runtime, joining on the worker directly would
        // have starved the ticker for the whole 200ms
        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }
}
