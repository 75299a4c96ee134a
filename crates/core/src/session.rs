use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use singsong_engine::{
    CaptureDevice, ChainVoice, CpalCapture, CpalOutput, Metronome, MetronomeState, OutputEndpoint,
};
use singsong_project::OfflineTrack;
use singsong_transport::{AudioBuffer, EqSettings, Role, Song, SongId, Track, TrackId};

use crate::capture::{CaptureSession, TakeInfo, commit, finalize_bytes};
use crate::export::{Export, ExportKind, export_file_name};
use crate::{EngineConfig, EngineError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One song plus the guard that serializes its mixdowns.
pub(crate) struct SongEntry {
    id: SongId,
    song: Mutex<Song>,
    render_guard: Arc<tokio::sync::Mutex<()>>,
}

impl SongEntry {
    fn new(song: Song) -> Self {
        Self {
            id: song.id(),
            song: Mutex::new(song),
            render_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub(crate) fn song(&self) -> MutexGuard<'_, Song> {
        lock(&self.song)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongSummary {
    pub id: SongId,
    pub title: String,
    pub track_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Result of loading a project into the session.
#[derive(Debug)]
pub struct LoadedSong {
    pub id: SongId,
    pub offline_tracks: Vec<OfflineTrack>,
}

/// The engine context: songs, devices and the metronome. Every operation goes
/// through here; nothing is process-global.
pub struct Session {
    config: EngineConfig,
    songs: Mutex<Vec<Arc<SongEntry>>>,
    output: Arc<dyn OutputEndpoint>,
    capture: Arc<dyn CaptureDevice>,
    metronome: Mutex<Metronome>,
}

impl Session {
    pub fn new(
        config: EngineConfig,
        output: Arc<dyn OutputEndpoint>,
        capture: Arc<dyn CaptureDevice>,
    ) -> Self {
        let metronome = Metronome::new(config.click_settings());
        Self {
            config,
            songs: Mutex::new(Vec::new()),
            output,
            capture,
            metronome: Mutex::new(metronome),
        }
    }

    /// Session on the default output device, capturing from the default input.
    pub fn with_default_devices(config: EngineConfig) -> Result<Self, EngineError> {
        let output = CpalOutput::open().map_err(EngineError::Output)?;
        Ok(Self::new(config, Arc::new(output), Arc::new(CpalCapture)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn entry(&self, id: SongId) -> Result<Arc<SongEntry>, EngineError> {
        lock(&self.songs)
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or(EngineError::SongNotFound(id))
    }

    fn with_song<R>(&self, id: SongId, f: impl FnOnce(&mut Song) -> R) -> Result<R, EngineError> {
        let entry = self.entry(id)?;
        let mut song = entry.song();
        Ok(f(&mut song))
    }

    fn with_track(
        &self,
        song: SongId,
        track: TrackId,
        f: impl FnOnce(&mut Song) -> Option<()>,
    ) -> Result<(), EngineError> {
        self.with_song(song, f)?
            .ok_or(EngineError::TrackNotFound(track))
    }

    // Songs

    /// Create an empty song at the top of the list. Without a title it is
    /// called `New Song <n>`, `n` being the new song count.
    pub fn create_song(&self, title: Option<&str>) -> SongId {
        let mut songs = lock(&self.songs);
        let title = match title {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("New Song {}", songs.len() + 1),
        };
        let song = Song::new(title);
        let id = song.id();
        log::info!("created song '{}'", song.title());
        songs.insert(0, Arc::new(SongEntry::new(song)));
        id
    }

    pub fn songs(&self) -> Vec<SongSummary> {
        lock(&self.songs)
            .iter()
            .map(|entry| {
                let song = entry.song();
                SongSummary {
                    id: song.id(),
                    title: song.title().to_string(),
                    track_count: song.tracks().len(),
                    updated_at: song.updated_at(),
                }
            })
            .collect()
    }

    /// Snapshot of a song, audio included.
    pub fn song(&self, id: SongId) -> Result<Song, EngineError> {
        self.with_song(id, |song| song.clone())
    }

    /// Set the title; an empty one becomes `Untitled song`.
    pub fn rename_song(&self, id: SongId, title: &str) -> Result<(), EngineError> {
        let title = if title.is_empty() { "Untitled song" } else { title };
        self.with_song(id, |song| song.set_title(title))
    }

    pub fn delete_song(&self, id: SongId) -> Result<Song, EngineError> {
        let mut songs = lock(&self.songs);
        let index = songs
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(EngineError::SongNotFound(id))?;
        let entry = songs.remove(index);
        let song = entry.song().clone();
        log::info!("deleted song '{}'", song.title());
        Ok(song)
    }

    pub fn invite(&self, id: SongId, handle: &str) -> Result<(), EngineError> {
        self.with_song(id, |song| song.invite(handle))
    }

    /// Link a collaborator can open: `<base>#collab=<song id>`.
    pub fn invite_link(&self, id: SongId, base: &str) -> Result<String, EngineError> {
        self.with_song(id, |song| format!("{base}#collab={}", song.id()))
    }

    // Mix parameters. Values are stored as given, without range checks.

    pub fn set_volume(&self, song: SongId, track: TrackId, volume: f32) -> Result<(), EngineError> {
        self.with_track(song, track, |s| s.set_volume(track, volume))
    }

    pub fn set_pan(&self, song: SongId, track: TrackId, pan: f32) -> Result<(), EngineError> {
        self.with_track(song, track, |s| s.set_pan(track, pan))
    }

    pub fn set_eq(&self, song: SongId, track: TrackId, eq: EqSettings) -> Result<(), EngineError> {
        self.with_track(song, track, |s| s.set_eq(track, eq))
    }

    pub fn set_compressor(&self, song: SongId, track: TrackId, on: bool) -> Result<(), EngineError> {
        self.with_track(song, track, |s| s.set_compressor(track, on))
    }

    /// Flip the mute flag, returning the new value.
    pub fn toggle_mute(&self, song: SongId, track: TrackId) -> Result<bool, EngineError> {
        self.with_song(song, |s| s.toggle_mute(track))?
            .ok_or(EngineError::TrackNotFound(track))
    }

    /// Flip the solo flag, returning the new value.
    pub fn toggle_solo(&self, song: SongId, track: TrackId) -> Result<bool, EngineError> {
        self.with_song(song, |s| s.toggle_solo(track))?
            .ok_or(EngineError::TrackNotFound(track))
    }

    /// Tracks audible right now under the solo and mute flags.
    pub fn active_tracks(&self, song: SongId) -> Result<Vec<TrackId>, EngineError> {
        self.with_song(song, |s| {
            singsong_transport::active_tracks(s.tracks())
                .into_iter()
                .map(|track| track.id)
                .collect()
        })
    }

    // Capture

    fn take_info(song: &Song, role: Option<Role>, name: Option<String>, volume: f32) -> TakeInfo {
        let role = role.unwrap_or_default();
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => format!("{role} track {}", song.tracks().len() + 1),
        };
        TakeInfo { name, role, volume }
    }

    /// Acquire the capture device and start recording a new take for `song`.
    ///
    /// If the device cannot be acquired nothing changes and
    /// [`EngineError::DeviceAcquisition`] is returned.
    pub async fn start_capture(
        &self,
        song: SongId,
        role: Option<Role>,
        name: Option<String>,
    ) -> Result<CaptureSession, EngineError> {
        let entry = self.entry(song)?;
        let take = Self::take_info(&entry.song(), role, name, self.config.default_track_volume);

        let device = Arc::clone(&self.capture);
        let buffer_secs = self.config.capture_buffer_secs;
        let stream = tokio::task::spawn_blocking(move || device.open(buffer_secs)).await??;

        Ok(CaptureSession::start(
            stream,
            take,
            entry,
            Duration::from_millis(self.config.meter_interval_ms),
            self.config.meter_window_frames,
        ))
    }

    /// Finalize an already-encoded recording into a new track.
    pub async fn import_capture(
        &self,
        song: SongId,
        role: Option<Role>,
        name: Option<String>,
        bytes: Vec<u8>,
        extension: Option<String>,
    ) -> Result<TrackId, EngineError> {
        let entry = self.entry(song)?;
        let take = Self::take_info(&entry.song(), role, name, self.config.default_track_volume);

        let task = tokio::task::spawn_blocking(move || {
            let assets = finalize_bytes(bytes, extension.as_deref(), take.role)?;
            Ok(commit(&entry, take, assets))
        });
        task.await?
    }

    // Mixdown and export

    /// Mix the song's audible tracks into one stereo buffer.
    ///
    /// Mixdowns of the same song never overlap; a second call waits for the
    /// first to finish.
    pub async fn render_mixdown(&self, song: SongId) -> Result<AudioBuffer, EngineError> {
        let entry = self.entry(song)?;
        let guard = Arc::clone(&entry.render_guard).lock_owned().await;

        let tracks: Vec<Track> = entry.song().tracks().to_vec();
        if tracks.is_empty() {
            return Err(EngineError::EmptyMix);
        }

        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            singsong_render::render_tracks(&tracks)
        });
        Ok(task.await??)
    }

    pub async fn export(&self, song: SongId, kind: ExportKind) -> Result<Export, EngineError> {
        let snapshot = self.song(song)?;
        if snapshot.tracks().is_empty() {
            return Err(EngineError::EmptyMix);
        }

        let bytes = if kind.is_audio() {
            let mix = self.render_mixdown(song).await?;
            singsong_render::encode_wav(&mix)
        } else {
            singsong_project::encode_project(&snapshot)?.into_bytes()
        };

        let file_name = export_file_name(snapshot.title(), kind);
        log::info!("exported {file_name} ({} bytes)", bytes.len());
        Ok(Export {
            kind,
            file_name,
            bytes,
        })
    }

    // Playback

    /// Play one track through a fresh monitoring chain.
    ///
    /// Muted tracks are skipped and `false` is returned.
    pub async fn play_track(&self, song: SongId, track: TrackId) -> Result<bool, EngineError> {
        let track = self
            .with_song(song, |s| s.track(track).cloned())?
            .ok_or(EngineError::TrackNotFound(track))?;
        play(Arc::clone(&self.output), track).await
    }

    /// Start every active track, each as soon as its own chain is ready. There
    /// is no shared clock, so start times are not aligned. Returns the number
    /// of tracks started.
    pub async fn play_all(&self, song: SongId) -> Result<usize, EngineError> {
        let tracks: Vec<Track> = self.with_song(song, |s| {
            singsong_transport::active_tracks(s.tracks())
                .into_iter()
                .cloned()
                .collect()
        })?;

        let handles: Vec<_> = tracks
            .into_iter()
            .map(|track| tokio::spawn(play(Arc::clone(&self.output), track)))
            .collect();

        let mut started = 0;
        for handle in handles {
            if handle.await?? {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Start or stop the metronome. Must be called inside a tokio runtime.
    pub fn toggle_metronome(&self) -> MetronomeState {
        lock(&self.metronome).toggle(Arc::clone(&self.output))
    }

    pub fn metronome_state(&self) -> MetronomeState {
        lock(&self.metronome).state()
    }

    // Projects

    pub async fn save_project(&self, song: SongId, path: &Path) -> Result<(), EngineError> {
        let snapshot = self.song(song)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || singsong_project::save_project(&path, &snapshot))
            .await??;
        Ok(())
    }

    /// Load a project into the session, replacing any song with the same id.
    pub async fn load_project(&self, path: &Path) -> Result<LoadedSong, EngineError> {
        let path = path.to_path_buf();
        let loaded =
            tokio::task::spawn_blocking(move || singsong_project::load_project(&path)).await??;

        let id = loaded.song.id();
        let mut songs = lock(&self.songs);
        songs.retain(|entry| entry.id != id);
        songs.insert(0, Arc::new(SongEntry::new(loaded.song)));

        Ok(LoadedSong {
            id,
            offline_tracks: loaded.offline_tracks,
        })
    }
}

async fn play(output: Arc<dyn OutputEndpoint>, track: Track) -> Result<bool, EngineError> {
    if track.mute {
        log::debug!("not playing muted track '{}'", track.name);
        return Ok(false);
    }

    let sample_rate = output.sample_rate();
    let voice = tokio::task::spawn_blocking(move || ChainVoice::for_track(&track, sample_rate))
        .await?
        .map_err(EngineError::Output)?;
    output.play(Box::new(voice)).map_err(EngineError::Output)?;
    Ok(true)
}
