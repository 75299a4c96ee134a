use std::path::PathBuf;
use std::time::Duration;

use singsong_engine::{ChainVoice, CpalOutput, OutputEndpoint};
use singsong_transport::{AssetRef, AudioAsset, Role, Track};

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: play_file <audio file> [role]"))?;
    let role: Role = match std::env::args().nth(2) {
        Some(role) => role.parse()?,
        None => Role::default(),
    };

    let audio = singsong_decode::decode_file(&path)?;
    println!(
        "Loaded audio: {} frames, {} Hz, {} channels",
        audio.frames(),
        audio.sample_rate,
        audio.channels
    );

    let asset = AudioAsset::new(AssetRef::generate(), audio, Vec::new());
    let track = Track::new(format!("{role} track 1"), role, asset.clone(), asset);

    let output = CpalOutput::open()?;
    println!(
        "Output: {} Hz, {} channels",
        output.sample_rate(),
        output.channels()
    );

    let voice = ChainVoice::for_track(&track, output.sample_rate())?;
    let duration_secs = voice.remaining_frames() as f64 / output.sample_rate() as f64;
    output.play(Box::new(voice))?;

    std::thread::sleep(Duration::from_secs_f64(duration_secs + 0.1));
    Ok(())
}
