pub mod capture;
pub mod microphone;

pub use capture::{
    convert_frame, downsample_frame, mix_to_mono, AudioCapture, AudioFrame, CaptureConfig,
};
pub use microphone::MicrophoneCapture;
