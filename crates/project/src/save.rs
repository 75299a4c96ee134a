use crate::{ProjectError, ProjectFile};
use singsong_transport::{AudioAsset, Song};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Write `song` to `path` as a JSON project, with every referenced audio asset
/// stored next to it under the asset's relative reference.
pub fn save_project(path: &Path, song: &Song) -> Result<(), ProjectError> {
    let root = path.parent().unwrap_or_else(|| Path::new("."));

    for track in song.tracks() {
        write_asset(root, &track.processed_audio)?;
        write_asset(root, &track.raw_audio)?;
    }

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &ProjectFile::from(song)).map_err(ProjectError::Serialize)?;

    log::info!(
        "saved '{}' ({} tracks) to {}",
        song.title(),
        song.tracks().len(),
        path.display()
    );
    Ok(())
}

fn write_asset(root: &Path, asset: &AudioAsset) -> Result<(), ProjectError> {
    if asset.encoded.is_empty() {
        log::warn!("asset {} has no encoded bytes, skipping", asset.reference);
        return Ok(());
    }

    crate::check_asset_ref(&asset.reference)?;
    let target = root.join(asset.reference.as_str());
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&target, &asset.encoded)?;
    Ok(())
}
