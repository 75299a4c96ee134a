use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use singsong_transport::AudioBuffer;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode an audio file on disk.
pub fn decode_file(path: &Path) -> anyhow::Result<AudioBuffer> {
    let file = File::open(path)?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_source(Box::new(file), extension)
        .map_err(|e| e.context(format!("decoding {}", path.display())))
}

/// Decode encoded audio held in memory, e.g. an asset's bytes.
///
/// `extension` is only a hint for the format probe.
pub fn decode_bytes(bytes: &[u8], extension: Option<&str>) -> anyhow::Result<AudioBuffer> {
    decode_source(Box::new(Cursor::new(bytes.to_vec())), extension)
}

fn decode_source(source: Box<dyn MediaSource>, extension: Option<&str>) -> anyhow::Result<AudioBuffer> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track"))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow::anyhow!("stream has no sample rate"))?;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
    if channels == 0 {
        anyhow::bail!("stream has no channels");
    }
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;

        let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    // A truncated final packet can leave a partial frame behind
    let whole = samples.len() - samples.len() % channels as usize;
    if whole != samples.len() {
        log::warn!(
            "dropping {} trailing samples of a partial frame",
            samples.len() - whole
        );
        samples.truncate(whole);
    }

    log::debug!(
        "decoded {} frames, {} Hz, {} channels",
        samples.len() / channels as usize,
        sample_rate,
        channels
    );

    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for &sample in samples {
                writer.write_sample(sample).expect("write");
            }
            writer.finalize().expect("finalize");
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_bytes_recovers_format() {
        let bytes = wav_bytes(&[0, 16384, -16384, 32767], 2, 48000);
        let audio = decode_bytes(&bytes, Some("wav")).expect("decode");

        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.frames(), 2);
        assert!((audio.samples[1] - 0.5).abs() < 1e-3);
        assert!((audio.samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_decode_bytes_without_hint() {
        let bytes = wav_bytes(&[1000; 10], 1, 44100);
        let audio = decode_bytes(&bytes, None).expect("decode");
        assert_eq!(audio.frames(), 10);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_bytes(b"definitely not audio", Some("wav")).is_err());
        assert!(decode_bytes(&[], None).is_err());
    }

    #[test]
    fn test_decode_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("take.wav");
        std::fs::write(&path, wav_bytes(&[0, 100, 200], 1, 22050)).expect("write");

        let audio = decode_file(&path).expect("decode");
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.frames(), 3);
    }

    #[test]
    fn test_decode_missing_file() {
        assert!(decode_file(Path::new("/nonexistent/take.wav")).is_err());
    }
}
