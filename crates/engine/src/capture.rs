//! Live capture sources.
//!
//! A [`CaptureDevice`] opens a [`CaptureStream`]: interleaved `f32` frames
//! pushed into a ring buffer by the device and drained by whoever monitors the
//! capture. Dropping the stream releases the device.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use singsong_transport::AudioBuffer;

use crate::stream::{Idle, StreamThread, spawn_stream};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no capture device available")]
    NoDevice,

    #[error("capture device configuration rejected: {0}")]
    Config(String),

    #[error("failed to open capture stream: {0}")]
    Stream(String),

    #[error("capture thread failed: {0}")]
    Thread(#[from] std::io::Error),
}

pub trait CaptureDevice: Send + Sync {
    /// Acquire the device. The stream buffers up to `buffer_secs` of audio
    /// between drains.
    fn open(&self, buffer_secs: u32) -> Result<CaptureStream, CaptureError>;
}

pub struct CaptureStream {
    samples: rtrb::Consumer<f32>,
    sample_rate: u32,
    channels: u16,
    dropped: Arc<AtomicUsize>,
    _device: Option<StreamThread>,
}

impl CaptureStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Move every sample captured so far onto the end of `out`.
    pub fn drain_into(&mut self, out: &mut Vec<f32>) -> usize {
        let available = self.samples.slots();
        out.reserve(available);
        let mut taken = 0;
        while let Ok(sample) = self.samples.pop() {
            out.push(sample);
            taken += 1;
        }
        taken
    }

    /// Samples lost because the ring buffer was full.
    pub fn dropped_samples(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn ring_capacity(sample_rate: u32, channels: u16, buffer_secs: u32) -> usize {
    (sample_rate as usize * channels as usize * buffer_secs.max(1) as usize).max(1)
}

/// The host's default input device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalCapture;

struct CaptureReady {
    samples: rtrb::Consumer<f32>,
    sample_rate: u32,
    channels: u16,
    dropped: Arc<AtomicUsize>,
}

impl CaptureDevice for CpalCapture {
    fn open(&self, buffer_secs: u32) -> Result<CaptureStream, CaptureError> {
        let (thread, ready) = spawn_stream("singsong-capture", move || build_input(buffer_secs))?;
        log::info!(
            "capture stream started: {} Hz, {} channels",
            ready.sample_rate,
            ready.channels
        );

        Ok(CaptureStream {
            samples: ready.samples,
            sample_rate: ready.sample_rate,
            channels: ready.channels,
            dropped: ready.dropped,
            _device: Some(thread),
        })
    }
}

fn build_input(buffer_secs: u32) -> Result<(cpal::Stream, CaptureReady, Idle), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let supported = device
        .default_input_config()
        .map_err(|err| CaptureError::Config(err.to_string()))?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let capacity = ring_capacity(config.sample_rate.0, config.channels, buffer_secs);
    let (producer, consumer) = rtrb::RingBuffer::<f32>::new(capacity);
    let dropped = Arc::new(AtomicUsize::new(0));

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            input_stream::<f32>(&device, &config, producer, Arc::clone(&dropped))?
        }
        cpal::SampleFormat::I16 => {
            input_stream::<i16>(&device, &config, producer, Arc::clone(&dropped))?
        }
        cpal::SampleFormat::U16 => {
            input_stream::<u16>(&device, &config, producer, Arc::clone(&dropped))?
        }
        other => {
            return Err(CaptureError::Config(format!(
                "unsupported sample format '{other}'"
            )));
        }
    };
    stream
        .play()
        .map_err(|err| CaptureError::Stream(err.to_string()))?;

    let ready = CaptureReady {
        samples: consumer,
        sample_rate: config.sample_rate.0,
        channels: config.channels,
        dropped,
    };
    Ok((stream, ready, Box::new(|| {})))
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: rtrb::Producer<f32>,
    dropped: Arc<AtomicUsize>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    if producer.push(f32::from_sample_(sample)).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            },
            |err| log::error!("capture stream error: {err}"),
            None,
        )
        .map_err(|err| CaptureError::Stream(err.to_string()))
}

/// Plays back a prepared buffer as if it had just been captured. With no
/// buffer it behaves like a machine without an input device.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapture {
    audio: Option<AudioBuffer>,
}

impl MemoryCapture {
    pub fn new(audio: AudioBuffer) -> Self {
        Self { audio: Some(audio) }
    }

    pub fn unavailable() -> Self {
        Self { audio: None }
    }
}

impl CaptureDevice for MemoryCapture {
    fn open(&self, _buffer_secs: u32) -> Result<CaptureStream, CaptureError> {
        let audio = self.audio.as_ref().ok_or(CaptureError::NoDevice)?;
        let (mut producer, consumer) = rtrb::RingBuffer::<f32>::new(audio.samples.len().max(1));
        for &sample in &audio.samples {
            // Capacity covers the whole buffer
            let _ = producer.push(sample);
        }

        Ok(CaptureStream {
            samples: consumer,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            dropped: Arc::new(AtomicUsize::new(0)),
            _device: None,
        })
    }
}
