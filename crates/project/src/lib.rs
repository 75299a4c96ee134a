mod load;
mod save;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use singsong_transport::{AssetRef, EqSettings, Role, Song, SongId, Track, TrackId};

pub use load::{LoadedProject, OfflineTrack, ProjectMetadata, load_project, load_project_metadata};
pub use save::save_project;

/// On-disk form of a song: every mix parameter, with audio referenced by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub id: SongId,
    pub title: String,
    pub tracks: Vec<TrackData>,
    #[serde(default)]
    pub invited: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackData {
    pub id: TrackId,
    pub name: String,
    pub role: Role,
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub eq: EqSettings,
    pub compressor_on: bool,
    pub processed_audio_ref: AssetRef,
    pub raw_audio_ref: AssetRef,
}

/// A track entry as it may appear in older project files, where the mixer
/// fields were added later and can be missing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackRecord {
    id: TrackId,
    name: String,
    role: Role,
    volume: f32,
    pan: Option<f32>,
    mute: Option<bool>,
    solo: Option<bool>,
    eq: Option<EqSettings>,
    #[serde(default)]
    compressor_on: bool,
    processed_audio_ref: AssetRef,
    raw_audio_ref: AssetRef,
}

impl TrackRecord {
    /// Fill missing mixer fields with defaults. Present fields are kept as-is,
    /// so normalizing a complete record changes nothing.
    fn normalize(self) -> TrackData {
        TrackData {
            id: self.id,
            name: self.name,
            role: self.role,
            volume: self.volume,
            pan: self.pan.unwrap_or(0.0),
            mute: self.mute.unwrap_or(false),
            solo: self.solo.unwrap_or(false),
            eq: self.eq.unwrap_or_default(),
            compressor_on: self.compressor_on,
            processed_audio_ref: self.processed_audio_ref,
            raw_audio_ref: self.raw_audio_ref,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRecord {
    id: SongId,
    title: String,
    tracks: Vec<TrackRecord>,
    #[serde(default)]
    invited: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Track> for TrackData {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            name: track.name.clone(),
            role: track.role,
            volume: track.volume,
            pan: track.pan,
            mute: track.mute,
            solo: track.solo,
            eq: track.eq,
            compressor_on: track.compressor_on,
            processed_audio_ref: track.processed_audio.reference.clone(),
            raw_audio_ref: track.raw_audio.reference.clone(),
        }
    }
}

impl From<&Song> for ProjectFile {
    fn from(song: &Song) -> Self {
        Self {
            id: song.id(),
            title: song.title().to_string(),
            tracks: song.tracks().iter().map(TrackData::from).collect(),
            invited: song.invited().to_vec(),
            created_at: song.created_at(),
            updated_at: song.updated_at(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(serde_json::Error),

    #[error("Asset reference '{0}' points outside the project directory")]
    UnsafeAssetRef(AssetRef),

    #[error("Failed to decode audio asset '{reference}': {source}")]
    AudioDecode {
        reference: AssetRef,
        source: anyhow::Error,
    },
}

/// Serialize the whole song as a pretty-printed JSON project file.
pub fn encode_project(song: &Song) -> Result<String, ProjectError> {
    serde_json::to_string_pretty(&ProjectFile::from(song)).map_err(ProjectError::Serialize)
}

/// Parse a project file, normalizing legacy track entries on the way in.
///
/// Asset references must stay inside the project directory.
pub fn decode_project(text: &str) -> Result<ProjectFile, ProjectError> {
    let record: ProjectRecord = serde_json::from_str(text).map_err(ProjectError::Deserialize)?;
    for track in &record.tracks {
        for reference in [&track.processed_audio_ref, &track.raw_audio_ref] {
            check_asset_ref(reference)?;
        }
    }
    Ok(ProjectFile {
        id: record.id,
        title: record.title,
        tracks: record.tracks.into_iter().map(TrackRecord::normalize).collect(),
        invited: record.invited,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

pub(crate) fn check_asset_ref(reference: &AssetRef) -> Result<(), ProjectError> {
    if reference.is_contained() {
        Ok(())
    } else {
        Err(ProjectError::UnsafeAssetRef(reference.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use singsong_transport::{AudioAsset, AudioBuffer};

    pub(crate) fn sample_song() -> Song {
        let asset = |samples: Vec<f32>| {
            let pcm = AudioBuffer::new(samples, 44100, 1);
            let encoded = singsong_render::encode_wav(&pcm);
            AudioAsset::new(AssetRef::generate(), pcm, encoded)
        };

        let mut song = Song::new("Test Song");
        let mut drums = Track::new(
            "drums track 1",
            Role::Drums,
            asset(vec![0.5, -0.5, 0.25]),
            asset(vec![0.4, -0.4, 0.2]),
        );
        drums.pan = -0.25;
        drums.eq = EqSettings::new(3.0, -2.0, 6.0);
        drums.compressor_on = true;
        let mut bass = Track::new(
            "bass track 2",
            Role::Bass,
            asset(vec![0.1; 5]),
            asset(vec![0.2; 5]),
        );
        bass.solo = true;
        bass.mute = true;
        bass.volume = 1.4;

        song.push_track(drums).unwrap();
        song.push_track(bass).unwrap();
        song.invite("bandmate@example.com");
        song
    }

    #[test]
    fn test_encode_uses_documented_field_names() {
        let text = encode_project(&sample_song()).expect("encode");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");

        for key in ["id", "title", "tracks", "invited", "createdAt", "updatedAt"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        let track = &value["tracks"][0];
        for key in [
            "id",
            "name",
            "role",
            "volume",
            "pan",
            "mute",
            "solo",
            "eq",
            "compressorOn",
            "processedAudioRef",
            "rawAudioRef",
        ] {
            assert!(track.get(key).is_some(), "missing track.{key}");
        }
        assert_eq!(track["role"], "drums");
        assert_eq!(track["eq"]["treble"], 6.0);
    }

    #[test]
    fn test_project_roundtrip_is_field_equal() {
        let song = sample_song();
        let first = encode_project(&song).expect("encode");
        let decoded = decode_project(&first).expect("decode");

        assert_eq!(decoded, ProjectFile::from(&song));
        let second = serde_json::to_string_pretty(&decoded).expect("re-encode");
        assert_eq!(first, second);
    }

    #[test]
    fn test_legacy_track_gets_defaults() {
        let text = r#"{
            "id": "6c1d7b1e-3c57-4d38-9d7e-2b2f6f1f5a10",
            "title": "Old Song",
            "tracks": [{
                "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
                "name": "vocal track 1",
                "role": "vocal",
                "volume": 0.9,
                "processedAudioRef": "assets/a.wav",
                "rawAudioRef": "assets/b.wav"
            }],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-02T00:00:00Z"
        }"#;

        let project = decode_project(text).expect("decode");
        let track = &project.tracks[0];
        assert_eq!(track.pan, 0.0);
        assert!(!track.mute);
        assert!(!track.solo);
        assert_eq!(track.eq, EqSettings::default());
        assert!(!track.compressor_on);
        assert!(project.invited.is_empty());
    }

    #[test]
    fn test_normalize_keeps_complete_records() {
        let song = sample_song();
        let text = encode_project(&song).expect("encode");
        let once = decode_project(&text).expect("decode");
        let twice = decode_project(&serde_json::to_string(&once).expect("encode")).expect("decode");

        assert_eq!(once, twice);
        assert_eq!(once.tracks[1].volume, 1.4);
        assert!(once.tracks[1].solo && once.tracks[1].mute);
    }

    #[test]
    fn test_decode_rejects_escaping_asset_refs() {
        for reference in ["../../secret.wav", "/tmp/absolute.wav", "assets/../../up.wav"] {
            let text = format!(
                r#"{{
                "id": "6c1d7b1e-3c57-4d38-9d7e-2b2f6f1f5a10",
                "title": "Sneaky",
                "tracks": [{{
                    "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
                    "name": "x",
                    "role": "vocal",
                    "volume": 1.0,
                    "processedAudioRef": "assets/ok.wav",
                    "rawAudioRef": "{reference}"
                }}],
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-01T00:00:00Z"
            }}"#
            );
            assert!(
                matches!(decode_project(&text), Err(ProjectError::UnsafeAssetRef(r)) if r.as_str() == reference),
                "{reference} accepted"
            );
        }
    }

    #[test]
    fn test_decode_rejects_unknown_role() {
        let text = r#"{
            "id": "6c1d7b1e-3c57-4d38-9d7e-2b2f6f1f5a10",
            "title": "Odd",
            "tracks": [{
                "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
                "name": "x",
                "role": "theremin",
                "volume": 1.0,
                "processedAudioRef": "a.wav",
                "rawAudioRef": "b.wav"
            }],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }"#;
        assert!(matches!(decode_project(text), Err(ProjectError::Deserialize(_))));
    }
}
