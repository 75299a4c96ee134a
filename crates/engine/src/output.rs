use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use basedrop::{Collector, Handle, Owned};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::stream::{Idle, StreamThread, spawn_stream};
use crate::voice::Voice;

/// Voices the audio callback can hold at once; extra voices wait in the queue.
pub const MAX_VOICES: usize = 64;

type QueuedVoice = Owned<Box<dyn Voice>>;

/// A shared sink every playback chain and the metronome write to.
///
/// Voices started on an endpoint overlap freely; nothing ducks or queues them.
pub trait OutputEndpoint: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    fn play(&self, voice: Box<dyn Voice>) -> anyhow::Result<()>;
}

/// The default cpal output device.
///
/// New voices cross into the audio callback through a lock-free ring buffer.
/// Finished voices are dropped in the callback as `basedrop` handles, so their
/// memory is reclaimed on the stream thread instead.
pub struct CpalOutput {
    voices: Mutex<rtrb::Producer<QueuedVoice>>,
    handle: Handle,
    sample_rate: u32,
    channels: u16,
    _thread: StreamThread,
}

struct OutputReady {
    voices: rtrb::Producer<QueuedVoice>,
    handle: Handle,
    sample_rate: u32,
    channels: u16,
}

impl CpalOutput {
    pub fn open() -> anyhow::Result<Self> {
        let (thread, ready) = spawn_stream("singsong-output", build_output)?;
        log::info!(
            "output stream started: {} Hz, {} channels",
            ready.sample_rate,
            ready.channels
        );

        Ok(Self {
            voices: Mutex::new(ready.voices),
            handle: ready.handle,
            sample_rate: ready.sample_rate,
            channels: ready.channels,
            _thread: thread,
        })
    }
}

impl OutputEndpoint for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn play(&self, voice: Box<dyn Voice>) -> anyhow::Result<()> {
        let voice = Owned::new(&self.handle, voice);
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(voice)
            .map_err(|_| anyhow::anyhow!("output voice queue is full"))
    }
}

fn build_output() -> anyhow::Result<(cpal::Stream, OutputReady, Idle)> {
    let mut collector = Collector::new();
    let handle = collector.handle();
    let (voice_tx, mut voice_rx) = rtrb::RingBuffer::<QueuedVoice>::new(MAX_VOICES);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let supported = device.default_output_config()?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        anyhow::bail!("unsupported sample format '{}'", supported.sample_format());
    }
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0;

    let mut playing: Vec<QueuedVoice> = Vec::with_capacity(MAX_VOICES);

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            while playing.len() < MAX_VOICES {
                match voice_rx.pop() {
                    Ok(voice) => playing.push(voice),
                    Err(_) => break,
                }
            }

            data.fill(0.0);
            playing.retain_mut(|voice| voice.render(data, channels));
        },
        |err| log::error!("output stream error: {err}"),
        None,
    )?;
    stream.play()?;

    let ready = OutputReady {
        voices: voice_tx,
        handle,
        sample_rate,
        channels: config.channels,
    };
    Ok((stream, ready, Box::new(move || collector.collect())))
}

/// An output with no device behind it. Voices are rendered on demand, which
/// makes playback observable in tests.
pub struct OfflineOutput {
    sample_rate: u32,
    channels: u16,
    voices: Mutex<Vec<Box<dyn Voice>>>,
    started: AtomicUsize,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            voices: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
        }
    }

    /// Mix the next `frames` frames of every playing voice.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let channels = self.channels as usize;
        let mut out = vec![0.0f32; frames * channels];
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain_mut(|voice| voice.render(&mut out, channels));
        out
    }

    pub fn active_voices(&self) -> usize {
        self.voices.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Voices started since creation.
    pub fn voices_started(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }
}

impl OutputEndpoint for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn play(&self, voice: Box<dyn Voice>) -> anyhow::Result<()> {
        self.voices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(voice);
        self.started.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
