//! Audio containers.
//!
//! Exports always use the canonical 44-byte-header, 16-bit PCM WAV layout built
//! by [`encode_wav`], whatever extension the caller asked for. Raw captures are
//! kept losslessly as 32-bit float WAV through `hound`.

use std::io::Cursor;

use singsong_transport::AudioBuffer;

pub const WAV_HEADER_LEN: usize = 44;

/// Total file size of a 16-bit PCM container for `buffer`.
pub fn encoded_len(buffer: &AudioBuffer) -> usize {
    WAV_HEADER_LEN + buffer.samples.len() * 2
}

/// Scale one sample to 16 bits: clamp to `[-1, 1]`, then negative values scale
/// by 32768 and positive ones by 32767, truncating toward zero.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Serialize `buffer` as a little-endian RIFF/WAVE file with 16-bit PCM samples.
///
/// | offset | field |
/// |---|---|
/// | 0 | `"RIFF"` |
/// | 4 | file length − 8 |
/// | 8 | `"WAVE"` |
/// | 12 | `"fmt "` |
/// | 16 | 16 |
/// | 20 | 1 (PCM) |
/// | 22 | channels |
/// | 24 | sample rate |
/// | 28 | sample rate × 2 × channels |
/// | 32 | channels × 2 |
/// | 34 | 16 |
/// | 36 | `"data"` |
/// | 40 | data length |
/// | 44 | interleaved samples |
pub fn encode_wav(buffer: &AudioBuffer) -> Vec<u8> {
    let total = encoded_len(buffer);
    let data_len = (total - WAV_HEADER_LEN) as u32;
    let channels = buffer.channels;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(total as u32 - 8).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    out.extend_from_slice(&(buffer.sample_rate * 2 * channels as u32).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for &sample in &buffer.samples {
        out.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }

    out
}

/// Encode `buffer` as 32-bit float WAV without any clamping.
pub fn encode_wav_float(buffer: &AudioBuffer) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in &buffer.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_header_layout_for_100_stereo_frames() {
        let buffer = AudioBuffer::silence(100, 44100, 2);
        let bytes = encode_wav(&buffer);

        assert_eq!(bytes.len(), 444);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), 436);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 24), 44100);
        assert_eq!(u32_at(&bytes, 28), 176400);
        assert_eq!(u16_at(&bytes, 32), 4);
        assert_eq!(u16_at(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), 400);
    }

    #[test]
    fn test_sample_scaling_and_clamping() {
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(-1.0), -32768);
        assert_eq!(sample_to_i16(2.5), 32767);
        assert_eq!(sample_to_i16(-7.0), -32768);
        assert_eq!(sample_to_i16(0.5), 16383);
        assert_eq!(sample_to_i16(-0.5), -16384);
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn test_samples_are_interleaved_little_endian() {
        let buffer = AudioBuffer::new(vec![1.0, -1.0, 0.0, 0.5], 8000, 2);
        let bytes = encode_wav(&buffer);
        let data: Vec<i16> = bytes[44..]
            .chunks(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(data, vec![32767, -32768, 0, 16383]);
    }

    #[test]
    fn test_container_decodes_back() {
        let samples: Vec<f32> = (0..200).map(|i| ((i as f32) * 0.05).sin() * 0.8).collect();
        let buffer = AudioBuffer::new(samples, 22050, 2);
        let decoded =
            singsong_decode::decode_bytes(&encode_wav(&buffer), Some("wav")).expect("decode");

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.frames(), 100);
        for (a, b) in buffer.samples.iter().zip(&decoded.samples) {
            assert!((a - b).abs() <= 2.0 / 32768.0, "{a} vs {b}");
        }
    }

    #[test]
    fn test_float_wav_is_lossless() {
        let buffer = AudioBuffer::new(vec![1.75, -0.123_456, 0.0], 48000, 1);
        let bytes = encode_wav_float(&buffer).expect("encode");
        let decoded = singsong_decode::decode_bytes(&bytes, Some("wav")).expect("decode");
        assert_eq!(decoded.samples, buffer.samples);
    }
}
