use crate::{ProjectError, ProjectFile, TrackData, decode_project};
use chrono::{DateTime, Utc};
use singsong_transport::{AssetRef, AudioAsset, AudioBuffer, Role, Song, Track, TrackId};
use std::fs;
use std::path::Path;

/// A track whose audio could not be loaded.
///
/// The track stays in the song with silent placeholder assets that keep their
/// original references, so saving the song again does not lose it.
#[derive(Debug, Clone)]
pub struct OfflineTrack {
    pub track_id: TrackId,
    pub name: String,
    pub role: Role,
    /// The reference that failed to load
    pub reference: AssetRef,
    pub error: String,
}

#[derive(Debug)]
pub struct LoadedProject {
    pub song: Song,
    /// Tracks with a missing or undecodable asset
    pub offline_tracks: Vec<OfflineTrack>,
}

#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    pub title: String,
    pub track_count: usize,
    pub invited_count: usize,
    pub updated_at: DateTime<Utc>,
}

fn load_project_data(path: &Path) -> Result<ProjectFile, ProjectError> {
    let text = fs::read_to_string(path)?;
    decode_project(&text)
}

pub fn load_project_metadata(path: &Path) -> Result<ProjectMetadata, ProjectError> {
    let project = load_project_data(path)?;

    Ok(ProjectMetadata {
        title: project.title,
        track_count: project.tracks.len(),
        invited_count: project.invited.len(),
        updated_at: project.updated_at,
    })
}

/// Load a project and decode every asset relative to the project's directory.
pub fn load_project(path: &Path) -> Result<LoadedProject, ProjectError> {
    let project = load_project_data(path)?;
    let root = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tracks = Vec::with_capacity(project.tracks.len());
    let mut offline_tracks = Vec::new();

    for data in project.tracks {
        let (track, offline) = load_track(root, data);
        tracks.push(track);
        offline_tracks.extend(offline);
    }

    let song = Song::restore(
        project.id,
        project.title,
        tracks,
        project.invited,
        project.created_at,
        project.updated_at,
    );

    Ok(LoadedProject {
        song,
        offline_tracks,
    })
}

fn load_track(root: &Path, data: TrackData) -> (Track, Option<OfflineTrack>) {
    let mut failure: Option<(AssetRef, String)> = None;
    let mut load = |reference: &AssetRef| match load_asset(root, reference) {
        Ok(asset) => asset,
        Err(err) => {
            log::warn!("track '{}' is offline: {err}", data.name);
            if failure.is_none() {
                failure = Some((reference.clone(), err.to_string()));
            }
            placeholder(reference)
        }
    };
    let processed_audio = load(&data.processed_audio_ref);
    let raw_audio = load(&data.raw_audio_ref);

    let offline = failure.map(|(reference, error)| OfflineTrack {
        track_id: data.id,
        name: data.name.clone(),
        role: data.role,
        reference,
        error,
    });

    let track = Track {
        id: data.id,
        name: data.name,
        role: data.role,
        volume: data.volume,
        pan: data.pan,
        mute: data.mute,
        solo: data.solo,
        eq: data.eq,
        compressor_on: data.compressor_on,
        processed_audio,
        raw_audio,
    };
    (track, offline)
}

/// Silent stand-in for an asset that could not be read. Its bytes are empty,
/// so saving never overwrites the file it points at.
fn placeholder(reference: &AssetRef) -> AudioAsset {
    AudioAsset::new(
        reference.clone(),
        AudioBuffer::new(Vec::new(), PLACEHOLDER_SAMPLE_RATE, 1),
        Vec::new(),
    )
}

const PLACEHOLDER_SAMPLE_RATE: u32 = 44100;

fn load_asset(root: &Path, reference: &AssetRef) -> Result<AudioAsset, ProjectError> {
    let audio_error = |source: anyhow::Error| ProjectError::AudioDecode {
        reference: reference.clone(),
        source,
    };

    let path = root.join(reference.as_str());
    let encoded = fs::read(&path).map_err(|err| audio_error(anyhow::anyhow!("{}: {err}", path.display())))?;
    let pcm = singsong_decode::decode_bytes(&encoded, Some("wav")).map_err(audio_error)?;

    Ok(AudioAsset::new(reference.clone(), pcm, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save_project;
    use crate::tests::sample_song;
    use tempfile::tempdir;

    #[test]
    fn test_load_project_restores_song() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("song.json");
        let song = sample_song();
        save_project(&path, &song).expect("save");

        let loaded = load_project(&path).expect("load");

        assert!(loaded.offline_tracks.is_empty());
        assert_eq!(loaded.song.id(), song.id());
        assert_eq!(loaded.song.title(), song.title());
        assert_eq!(loaded.song.invited(), song.invited());
        assert_eq!(loaded.song.created_at(), song.created_at());
        assert_eq!(loaded.song.updated_at(), song.updated_at());
        assert_eq!(ProjectFile::from(&loaded.song), ProjectFile::from(&song));

        for (a, b) in loaded.song.tracks().iter().zip(song.tracks()) {
            assert_eq!(a.processed_audio.pcm.frames(), b.processed_audio.pcm.frames());
            assert_eq!(a.raw_audio.encoded, b.raw_audio.encoded);
        }
    }

    #[test]
    fn test_missing_asset_marks_track_offline() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("song.json");
        let song = sample_song();
        save_project(&path, &song).expect("save");

        let victim = &song.tracks()[0];
        fs::remove_file(dir.path().join(victim.processed_audio.reference.as_str()))
            .expect("remove");

        let loaded = load_project(&path).expect("load");

        assert_eq!(loaded.song.tracks().len(), 2);
        assert_eq!(loaded.offline_tracks.len(), 1);
        let offline = &loaded.offline_tracks[0];
        assert_eq!(offline.track_id, victim.id);
        assert_eq!(offline.reference, victim.processed_audio.reference);
        assert_eq!(offline.role, Role::Drums);

        let kept = loaded.song.track(victim.id).expect("offline track kept");
        assert!(kept.processed_audio.pcm.is_empty());
        assert_eq!(kept.raw_audio.encoded, victim.raw_audio.encoded);
    }

    #[test]
    fn test_resave_keeps_offline_track() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("song.json");
        let song = sample_song();
        save_project(&path, &song).expect("save");

        let missing = dir.path().join(song.tracks()[0].processed_audio.reference.as_str());
        fs::remove_file(&missing).expect("remove");

        let loaded = load_project(&path).expect("load");
        save_project(&path, &loaded.song).expect("resave");

        let text = fs::read_to_string(&path).expect("read");
        let project = decode_project(&text).expect("decode");
        assert_eq!(project, ProjectFile::from(&song));
        assert!(!missing.exists());

        // Once the asset is back, the track loads normally again
        fs::write(&missing, &song.tracks()[0].processed_audio.encoded).expect("restore");
        let reloaded = load_project(&path).expect("reload");
        assert!(reloaded.offline_tracks.is_empty());
        assert_eq!(reloaded.song.tracks().len(), 2);
    }

    #[test]
    fn test_corrupt_asset_marks_track_offline() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("song.json");
        let song = sample_song();
        save_project(&path, &song).expect("save");

        let victim = &song.tracks()[1];
        fs::write(dir.path().join(victim.raw_audio.reference.as_str()), b"nope").expect("write");

        let loaded = load_project(&path).expect("load");
        assert_eq!(loaded.offline_tracks.len(), 1);
        assert_eq!(loaded.offline_tracks[0].reference, victim.raw_audio.reference);
    }

    #[test]
    fn test_load_project_metadata() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("song.json");
        save_project(&path, &sample_song()).expect("save");

        let meta = load_project_metadata(&path).expect("meta");
        assert_eq!(meta.title, "Test Song");
        assert_eq!(meta.track_count, 2);
        assert_eq!(meta.invited_count, 1);
    }

    #[test]
    fn test_missing_project_file_is_io_error() {
        let dir = tempdir().expect("tempdir");
        let result = load_project(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ProjectError::Io(_))));
    }
}
