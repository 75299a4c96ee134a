mod model;
mod resolve;

pub use model::{
    AssetRef, AudioAsset, EqSettings, ParseRoleError, Role, Song, SongId, Track, TrackId,
    DEFAULT_TRACK_VOLUME,
};
pub use resolve::{active_track_ids, active_tracks};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Decoded PCM audio with interleaved samples.
///
/// For stereo the layout is `[L, R, L, R, ...]`. A buffer is always owned by
/// exactly one asset; nothing in the engine shares sample data between tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// Create a buffer from interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    ///
    /// # Examples
    ///
    /// ```
    /// use singsong_transport::AudioBuffer;
    ///
    /// let samples = vec![0.0, 0.1, 0.2, 0.3]; // [L1, R1, L2, R2]
    /// let audio = AudioBuffer::new(samples, 44100, 2);
    /// assert_eq!(audio.frames(), 2);
    /// ```
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Silent buffer of `frames` frames.
    pub fn silence(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Build an interleaved buffer from per-channel sample arrays.
    ///
    /// Shorter channels are zero-padded to the longest one.
    pub fn from_channels(channels: &[Vec<f32>], sample_rate: u32) -> Self {
        assert!(!channels.is_empty(), "channels must be greater than 0");
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels.len());
        for frame in 0..frames {
            for channel in channels {
                samples.push(channel.get(frame).copied().unwrap_or(0.0));
            }
        }
        Self::new(samples, sample_rate, channels.len() as u16)
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Get an iterator over a specific channel's samples.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is >= `self.channels`.
    ///
    /// # Examples
    ///
    /// ```
    /// use singsong_transport::AudioBuffer;
    ///
    /// let audio = AudioBuffer::new(vec![0.0, 1.0, 0.5, 1.5], 44100, 2);
    /// let left: Vec<f32> = audio.channel(0).collect();
    /// assert_eq!(left, vec![0.0, 0.5]);
    /// ```
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        assert!(
            channel < self.channels as usize,
            "channel index out of bounds"
        );
        let channels = self.channels as usize;
        (0..self.frames()).map(move |frame| self.samples[frame * channels + channel])
    }

    /// One frame as a slice of `channels` samples.
    #[inline]
    pub fn frame(&self, index: usize) -> &[f32] {
        let channels = self.channels as usize;
        &self.samples[index * channels..(index + 1) * channels]
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Min/max peaks for drawing a waveform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformData {
    pub peaks: Vec<(f32, f32)>,
    pub samples_per_bucket: usize,
}

impl WaveformData {
    /// Compute min/max peaks of an interleaved slice, e.g. the most recent
    /// capture window, in buckets of `samples_per_bucket` frames each. Peaks
    /// describe the mono mix-down of all channels.
    ///
    /// # Examples
    ///
    /// ```
    /// use singsong_transport::WaveformData;
    ///
    /// let window = vec![0.0; 44100 * 2];
    /// let waveform = WaveformData::from_interleaved(&window, 2, 512);
    /// assert_eq!(waveform.peaks.len(), 87);
    /// ```
    pub fn from_interleaved(samples: &[f32], channels: u16, samples_per_bucket: usize) -> Self {
        let channels = channels.max(1) as usize;
        let samples_per_bucket = samples_per_bucket.max(1);
        let frames = samples.len() / channels;
        let num_buckets = frames.div_ceil(samples_per_bucket);
        let mut peaks = Vec::with_capacity(num_buckets);

        for bucket_idx in 0..num_buckets {
            let start = bucket_idx * samples_per_bucket;
            let end = ((bucket_idx + 1) * samples_per_bucket).min(frames);

            let mut min_val: f32 = 0.0;
            let mut max_val: f32 = 0.0;

            for frame_idx in start..end {
                let frame = &samples[frame_idx * channels..(frame_idx + 1) * channels];
                let mono_sample = frame.iter().sum::<f32>() / channels as f32;
                min_val = min_val.min(mono_sample);
                max_val = max_val.max(mono_sample);
            }

            peaks.push((min_val, max_val));
        }

        Self {
            peaks,
            samples_per_bucket,
        }
    }
}

/// Expected frame count after converting `frames` from one rate to another.
pub fn resampled_frames(frames: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate {
        return frames;
    }
    (frames as f64 * to_rate as f64 / from_rate as f64).ceil() as usize
}

/// Resample an audio buffer to a target sample rate.
///
/// Performs sinc interpolation. Buffers already at the target rate, and empty
/// buffers, are returned as a plain copy.
///
/// # Examples
///
/// ```
/// use singsong_transport::{AudioBuffer, resample_audio};
///
/// let audio = AudioBuffer::new(vec![0.0; 44100], 44100, 1);
/// let resampled = resample_audio(&audio, 48000).unwrap();
/// assert_eq!(resampled.sample_rate, 48000);
/// ```
pub fn resample_audio(
    buffer: &AudioBuffer,
    target_sample_rate: u32,
) -> anyhow::Result<AudioBuffer> {
    if buffer.sample_rate == target_sample_rate {
        return Ok(buffer.clone());
    }
    if buffer.is_empty() {
        return Ok(AudioBuffer::new(
            Vec::new(),
            target_sample_rate,
            buffer.channels,
        ));
    }

    let channels = buffer.channels as usize;
    let input_frames = buffer.frames();

    let resample_ratio = target_sample_rate as f64 / buffer.sample_rate as f64;
    let output_frames = resampled_frames(input_frames, buffer.sample_rate, target_sample_rate);

    // rubato works on per-channel vectors
    let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
    for frame_idx in 0..input_frames {
        for (ch, input) in input_channels.iter_mut().enumerate() {
            input.push(buffer.samples[frame_idx * channels + ch]);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;

    let output_channels = resampler.process(&input_channels, None)?;

    let mut output_samples = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_channels[0].len() {
        for output in &output_channels {
            output_samples.push(output[frame_idx]);
        }
    }

    Ok(AudioBuffer::new(
        output_samples,
        target_sample_rate,
        buffer.channels,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn generate_sine_wave(
        frequency: f32,
        sample_rate: u32,
        duration_secs: f32,
        channels: u16,
    ) -> AudioBuffer {
        let num_frames = (sample_rate as f32 * duration_secs) as usize;
        let mut samples = Vec::with_capacity(num_frames * channels as usize);

        for i in 0..num_frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * PI * frequency * t).sin();
            for _ in 0..channels {
                samples.push(sample);
            }
        }

        AudioBuffer::new(samples, sample_rate, channels)
    }

    #[test]
    fn test_audio_buffer_new() {
        let audio = AudioBuffer::new(vec![0.0, 0.1, 0.2, 0.3], 44100, 2);

        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frames(), 2);
        assert!(!audio.is_empty());
    }

    #[test]
    #[should_panic(expected = "channels must be greater than 0")]
    fn test_audio_buffer_zero_channels() {
        AudioBuffer::new(vec![0.0], 44100, 0);
    }

    #[test]
    #[should_panic(expected = "samples.len() must be divisible by channels")]
    fn test_audio_buffer_invalid_length() {
        AudioBuffer::new(vec![0.0, 0.1, 0.2, 0.3, 0.4], 44100, 2);
    }

    #[test]
    fn test_from_channels_pads_short_channels() {
        let audio = AudioBuffer::from_channels(&[vec![1.0, 2.0, 3.0], vec![-1.0]], 48000);

        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples, vec![1.0, -1.0, 2.0, 0.0, 3.0, 0.0]);
        assert_eq!(audio.frame(1), &[2.0, 0.0]);
    }

    #[test]
    fn test_channel_iterator_and_peak() {
        let audio = AudioBuffer::new(vec![0.0, 1.0, -0.75, 1.5, 0.25, 1.25], 44100, 2);

        let left: Vec<f32> = audio.channel(0).collect();
        assert_eq!(left, vec![0.0, -0.75, 0.25]);
        assert_eq!(audio.peak(), 1.5);
    }

    #[test]
    fn test_duration() {
        let audio = AudioBuffer::silence(44100, 44100, 2);
        assert!((audio.duration_secs() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_waveform_buckets_track_min_and_max() {
        let waveform = WaveformData::from_interleaved(&[0.5, -0.25, 0.0, 1.0, -1.0], 1, 2);

        assert_eq!(waveform.peaks, vec![(-0.25, 0.5), (0.0, 1.0), (-1.0, 0.0)]);
    }

    #[test]
    fn test_resample_same_rate_is_copy() {
        let audio = generate_sine_wave(440.0, 44100, 0.1, 2);
        let resampled = resample_audio(&audio, 44100).unwrap();
        assert_eq!(resampled, audio);
    }

    #[test]
    fn test_resample_empty_buffer() {
        let audio = AudioBuffer::new(Vec::new(), 44100, 1);
        let resampled = resample_audio(&audio, 48000).unwrap();
        assert!(resampled.is_empty());
        assert_eq!(resampled.sample_rate, 48000);
    }

    #[test]
    fn test_resample_upsampling() {
        let audio = generate_sine_wave(440.0, 44100, 0.1, 2);
        let resampled = resample_audio(&audio, 48000).unwrap();

        assert_eq!(resampled.sample_rate, 48000);
        assert_eq!(resampled.channels, 2);

        let expected_frames = resampled_frames(audio.frames(), 44100, 48000);
        let tolerance = (expected_frames as f64 * 0.03) as i64;
        let diff = (resampled.frames() as i64 - expected_frames as i64).abs();
        assert!(
            diff <= tolerance,
            "expected ~{} frames, got {}",
            expected_frames,
            resampled.frames()
        );
    }
}
