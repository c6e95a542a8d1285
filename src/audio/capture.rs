//! Microphone audio capture using cpal.
//!
//! Captures at the device's native rate and format, then converts to
//! fixed-size blocks of 16-bit mono PCM at the recognizer's sample rate.

use crate::config::AudioConfig;
use crate::error::{AssistError, Result};
use crate::pipeline::messages::AudioChunk;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Audio capture from a system microphone via cpal.
pub struct CpalCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
    block_size: usize,
}

/// Keeps the input stream alive. Capture stops when this is dropped.
pub struct CaptureGuard {
    _stream: cpal::Stream,
}

impl CpalCapture {
    /// Open the configured (or default) input device.
    ///
    /// # Errors
    ///
    /// Returns an error if no matching input device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| AssistError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| AssistError::Audio(format!("input device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| AssistError::Audio("no default input device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device
            .default_input_config()
            .map_err(|e| AssistError::Audio(format!("no default input config: {e}")))?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(
            "native input config: {}Hz, {} channels",
            stream_config.sample_rate, stream_config.channels
        );

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.sample_rate,
            block_size: config.block_size,
        })
    }

    /// Start capturing, sending complete blocks to `tx`.
    ///
    /// The stream runs on cpal's own thread until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream cannot be built or started.
    pub fn start(self, tx: Sender<AudioChunk>) -> Result<CaptureGuard> {
        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let mut blocks = ChunkAccumulator::new(self.block_size, target_rate);

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let samples = resample(&mono, native_rate, target_rate);
                    for chunk in blocks.push(&samples) {
                        if tx.try_send(chunk).is_err() {
                            debug!("audio queue closed, dropping block");
                        }
                    }
                },
                move |err| {
                    warn!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| AssistError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AssistError::Audio(format!("failed to start input stream: {e}")))?;

        info!(
            "audio capture started: native {}Hz -> target {}Hz, {} samples per block",
            native_rate, target_rate, self.block_size
        );
        Ok(CaptureGuard { _stream: stream })
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AssistError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        info!("audio capture stopped");
    }
}

/// Buffers converted samples and emits fixed-size PCM blocks.
#[derive(Debug)]
pub struct ChunkAccumulator {
    block_size: usize,
    sample_rate: u32,
    pending: Vec<i16>,
}

impl ChunkAccumulator {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            sample_rate,
            pending: Vec::with_capacity(block_size),
        }
    }

    /// Append float samples in `[-1, 1]` and return any completed blocks.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioChunk> {
        self.pending.extend(samples.iter().copied().map(to_pcm16));

        let mut out = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let block = std::mem::replace(&mut self.pending, rest);
            out.push(AudioChunk {
                samples: block,
                sample_rate: self.sample_rate,
                captured_at: Instant::now(),
            });
        }
        out
    }

    /// Samples waiting for a full block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn to_pcm16(sample: f32) -> i16 {
    #[allow(clippy::cast_possible_truncation)]
    let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
    value
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler, adequate for speech.
fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || dst_rate == 0 {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}
