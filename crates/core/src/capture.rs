//! Capture pipeline: live monitoring while a take is recorded, then the
//! finalize sequence that turns the take into a new track.
//!
//! Finalize is strictly `raw capture → decode → tone-shape → store` and runs in
//! its own task, so it completes even if whoever stopped the capture goes away.
//! A failure at any step leaves the song untouched.

use std::sync::Arc;
use std::time::Duration;

use singsong_engine::{CaptureStream, LevelMeter, MeterReading};
use singsong_transport::{AssetRef, AudioAsset, AudioBuffer, Role, Track, TrackId};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::EngineError;
use crate::session::SongEntry;

/// Everything needed to turn audio into a track, fixed when the take starts.
#[derive(Debug, Clone)]
pub(crate) struct TakeInfo {
    pub name: String,
    pub role: Role,
    pub volume: f32,
}

/// Shape `raw_bytes` for `role` and build the processed and raw assets.
pub(crate) fn finalize_bytes(
    raw_bytes: Vec<u8>,
    extension: Option<&str>,
    role: Role,
) -> Result<(AudioAsset, AudioAsset), EngineError> {
    let raw = singsong_decode::decode_bytes(&raw_bytes, extension).map_err(EngineError::Decode)?;
    if raw.is_empty() {
        return Err(EngineError::Decode(anyhow::anyhow!("capture contains no audio")));
    }
    log::debug!(
        "decoded take: {} frames, {} Hz, {} channels",
        raw.frames(),
        raw.sample_rate,
        raw.channels
    );

    let processed = singsong_render::shape(&raw, role);
    let processed_bytes = singsong_render::encode_wav(&processed);

    Ok((
        AudioAsset::new(AssetRef::generate(), processed, processed_bytes),
        AudioAsset::new(AssetRef::generate(), raw, raw_bytes),
    ))
}

/// Full finalize for a live take: store it losslessly, then shape it.
pub(crate) fn finalize_capture(
    raw: AudioBuffer,
    role: Role,
) -> Result<(AudioAsset, AudioAsset), EngineError> {
    let raw_bytes = singsong_render::encode_wav_float(&raw).map_err(EngineError::Encode)?;
    finalize_bytes(raw_bytes, Some("wav"), role)
}

/// Append the finished track. This is the only point where the song changes.
pub(crate) fn commit(
    entry: &SongEntry,
    take: TakeInfo,
    (processed, raw): (AudioAsset, AudioAsset),
) -> TrackId {
    let mut track = Track::new(take.name, take.role, processed, raw);
    track.volume = take.volume;

    let mut song = entry.song();
    while song.track(track.id).is_some() {
        track.id = TrackId::new();
    }
    let id = track.id;
    log::info!("added track '{}' to '{}'", track.name, song.title());
    // Id uniqueness was checked under the same lock
    let _ = song.push_track(track);
    id
}

struct Captured {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

/// A take in progress.
///
/// Dropping it without calling [`CaptureSession::stop`] discards the take and
/// releases the device.
pub struct CaptureSession {
    take: TakeInfo,
    entry: Arc<SongEntry>,
    levels: watch::Receiver<MeterReading>,
    stop: oneshot::Sender<()>,
    monitor: JoinHandle<Captured>,
}

impl CaptureSession {
    pub(crate) fn start(
        stream: CaptureStream,
        take: TakeInfo,
        entry: Arc<SongEntry>,
        meter_interval: Duration,
        meter_window_frames: usize,
    ) -> Self {
        let (levels_tx, levels) = watch::channel(MeterReading::default());
        let (stop, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor(
            stream,
            levels_tx,
            stop_rx,
            meter_interval,
            meter_window_frames,
        ));
        log::info!("recording '{}' ({})", take.name, take.role);

        Self {
            take,
            entry,
            levels,
            stop,
            monitor,
        }
    }

    pub fn name(&self) -> &str {
        &self.take.name
    }

    pub fn role(&self) -> Role {
        self.take.role
    }

    /// Live level and waveform, refreshed on every meter tick.
    pub fn levels(&self) -> watch::Receiver<MeterReading> {
        self.levels.clone()
    }

    /// Stop monitoring, release the device and finalize the take into a track.
    ///
    /// Once this is first polled the take is committed even if the returned
    /// future is dropped; awaiting it only reports the outcome.
    pub async fn stop(self) -> Result<TrackId, EngineError> {
        let Self {
            take,
            entry,
            stop,
            monitor,
            ..
        } = self;
        let _ = stop.send(());

        tokio::spawn(finish(take, entry, monitor)).await?
    }
}

/// Wait for the monitor to hand over the take, then finalize and commit it.
async fn finish(
    take: TakeInfo,
    entry: Arc<SongEntry>,
    monitor: JoinHandle<Captured>,
) -> Result<TrackId, EngineError> {
    let captured = monitor.await?;
    log::info!(
        "stopped recording '{}': {} samples",
        take.name,
        captured.samples.len()
    );

    let task = tokio::task::spawn_blocking(move || {
        let raw = AudioBuffer::new(captured.samples, captured.sample_rate, captured.channels);
        let assets = finalize_capture(raw, take.role)?;
        Ok(commit(&entry, take, assets))
    });
    task.await?
}

async fn monitor(
    mut stream: CaptureStream,
    levels: watch::Sender<MeterReading>,
    mut stop: oneshot::Receiver<()>,
    interval: Duration,
    window_frames: usize,
) -> Captured {
    let channels = stream.channels().max(1);
    let mut meter = LevelMeter::new(channels, window_frames);
    let mut samples = Vec::new();
    let mut ticks = tokio::time::interval(interval.max(Duration::from_millis(1)));

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let start = samples.len();
                if stream.drain_into(&mut samples) > 0 {
                    meter.push(&samples[start..]);
                    levels.send_replace(meter.reading());
                }
            }
            _ = &mut stop => break,
        }
    }

    stream.drain_into(&mut samples);
    if stream.dropped_samples() > 0 {
        log::warn!(
            "capture buffer overflowed, {} samples lost",
            stream.dropped_samples()
        );
    }

    // Overflow can drop part of a frame
    let whole = samples.len() - samples.len() % channels as usize;
    samples.truncate(whole);

    Captured {
        samples,
        sample_rate: stream.sample_rate(),
        channels,
    }
}
