//! Microphone capture using cpal
//!
//! The device callback runs on the audio subsystem's own thread. It copies
//! every delivered block into an `AudioChunk` and pushes it onto the chunk
//! queue, nothing else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
use tracing::{info, warn};

use super::{AudioChunk, ChunkProducer};
use crate::config::AudioSettings;

/// Errors raised while opening the input stream
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoInputDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("input device `{device}` has no i16/f32 config at {sample_rate} Hz")]
    UnsupportedConfig { device: String, sample_rate: u32 },

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// Pick the capture sample rate: the configured override, or the default
/// input device's own rate.
pub fn resolve_sample_rate(settings: &AudioSettings) -> Result<u32, CaptureError> {
    if let Some(rate) = settings.sample_rate {
        return Ok(rate);
    }
    let device = default_device()?;
    let rate = device.default_input_config()?.sample_rate().0;
    info!(sample_rate = rate, "using device default sample rate");
    Ok(rate)
}

fn default_device() -> Result<Device, CaptureError> {
    cpal::default_host()
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)
}

/// Bridges the default input device to the chunk queue
pub struct AudioCaptureSource {
    producer: ChunkProducer,
    sample_rate: u32,
    block_size: u32,
    device_errors: Arc<AtomicU64>,
}

impl AudioCaptureSource {
    pub fn new(producer: ChunkProducer, sample_rate: u32, block_size: u32) -> Self {
        Self {
            producer,
            sample_rate,
            block_size,
            device_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open the default input device and start delivering chunks.
    ///
    /// Delivery stops when the returned `CaptureStream` is dropped.
    pub fn open(&self) -> Result<CaptureStream, CaptureError> {
        let device = default_device()?;
        let name = device.name().unwrap_or_else(|_| "<unknown>".into());

        let supported = choose_config(device.supported_input_configs()?, self.sample_rate)
            .ok_or_else(|| CaptureError::UnsupportedConfig {
                device: name.clone(),
                sample_rate: self.sample_rate,
            })?;
        let format = supported.sample_format();
        let channels = supported.channels();

        let fixed = StreamConfig {
            channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: BufferSize::Fixed(self.block_size),
        };

        let stream = match self.build_stream(&device, &fixed, format) {
            Ok(stream) => stream,
            Err(CaptureError::Build(e)) => {
                warn!(
                    error = %e,
                    block_size = self.block_size,
                    "fixed block size rejected, using device default buffer size"
                );
                let fallback = StreamConfig {
                    buffer_size: BufferSize::Default,
                    ..fixed
                };
                self.build_stream(&device, &fallback, format)?
            }
            Err(e) => return Err(e),
        };

        stream.play()?;

        info!(
            device = %name,
            sample_rate = self.sample_rate,
            block_size = self.block_size,
            channels,
            format = ?format,
            "audio capture started{}",
            if channels > 1 { " (downmixing to mono)" } else { "" },
        );

        Ok(CaptureStream {
            stream,
            device_errors: Arc::clone(&self.device_errors),
        })
    }

    fn build_stream(
        &self,
        device: &Device,
        config: &StreamConfig,
        format: SampleFormat,
    ) -> Result<Stream, CaptureError> {
        let producer = self.producer.clone();
        let channels = config.channels;
        let errors = Arc::clone(&self.device_errors);
        let on_error = move |err: cpal::StreamError| {
            errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "audio device reported an error");
        };

        let stream = match format {
            SampleFormat::I16 => device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    producer.push(block_to_chunk(data, channels, |s| s));
                },
                on_error,
                None,
            )?,
            SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    producer.push(block_to_chunk(data, channels, f32_to_i16));
                },
                on_error,
                None,
            )?,
            other => return Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
        };

        Ok(stream)
    }
}

/// Pick a device config that runs at `sample_rate` with a usable sample
/// format, preferring mono and then native 16-bit.
fn choose_config<I>(ranges: I, sample_rate: u32) -> Option<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    let rate = SampleRate(sample_rate);
    ranges
        .into_iter()
        .filter(|range| {
            matches!(range.sample_format(), SampleFormat::I16 | SampleFormat::F32)
                && range.channels() >= 1
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .min_by_key(|range| {
            (
                range.channels() != 1,
                range.sample_format() != SampleFormat::I16,
                range.channels(),
            )
        })
        .map(|range| range.with_sample_rate(rate))
}

/// Copy one hardware block into a mono chunk, averaging interleaved
/// channels per frame.
fn block_to_chunk<T: Copy>(data: &[T], channels: u16, convert: fn(T) -> i16) -> AudioChunk {
    if channels <= 1 {
        let samples: Vec<i16> = data.iter().map(|&s| convert(s)).collect();
        return AudioChunk::from_samples(&samples);
    }
    let ch = channels as usize;
    let mono: Vec<i16> = data
        .chunks_exact(ch)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| convert(s) as i32).sum();
            (sum / ch as i32) as i16
        })
        .collect();
    AudioChunk::from_samples(&mono)
}

/// A running input stream; capture stops when this is dropped
pub struct CaptureStream {
    stream: Stream,
    device_errors: Arc<AtomicU64>,
}

impl CaptureStream {
    /// Device errors reported since the source was created
    pub fn device_errors(&self) -> u64 {
        self.device_errors.load(Ordering::Relaxed)
    }

    /// Stop delivery explicitly
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            warn!(error = %e, "failed to pause input stream");
        }
        info!(device_errors = self.device_errors(), "audio capture stopped");
    }
}

/// Convert a normalized float sample to 16-bit PCM
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
