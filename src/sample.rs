//! Immutable PCM assets.
//!
//! A [`Sample`] owns raw interleaved PCM bytes plus their declared format and
//! is shared read-only between any number of playing sources. Supported input
//! layouts are little-endian signed 16-bit and unsigned 8-bit, mono or
//! stereo.

use crate::buffer::Buffer;
use crate::error::{BinauraError, Result};

/// Width of a single PCM sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    /// Unsigned 8-bit, midpoint 128.
    U8,
    /// Signed 16-bit little-endian.
    S16Le,
}

impl SampleWidth {
    pub fn bytes(&self) -> usize {
        match self {
            SampleWidth::U8 => 1,
            SampleWidth::S16Le => 2,
        }
    }
}

/// Declared layout of a PCM byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub width: SampleWidth,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, width: SampleWidth) -> Self {
        Self {
            sample_rate,
            channels,
            width,
        }
    }

    /// Bytes occupied by one interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.width.bytes() * self.channels as usize
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BinauraError::InvalidFormat(
                "sample rate must be greater than 0".into(),
            ));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(BinauraError::InvalidFormat(format!(
                "only mono and stereo inputs are supported, got {} channels",
                self.channels
            )));
        }
        Ok(())
    }
}

/// An immutable PCM asset. Created once, then shared read-only across
/// sources through the context's sample registry.
#[derive(Debug, Clone)]
pub struct Sample {
    data: Buffer,
    format: PcmFormat,
    frames: usize,
}

impl Sample {
    /// Wraps raw interleaved PCM bytes. Trailing bytes that do not fill a
    /// whole frame are rejected.
    pub fn from_pcm(data: Buffer, format: PcmFormat) -> Result<Self> {
        format.validate()?;
        let frame_bytes = format.frame_bytes();
        if data.len() % frame_bytes != 0 {
            return Err(BinauraError::InvalidFormat(format!(
                "{} PCM bytes do not divide into {}-byte frames",
                data.len(),
                frame_bytes
            )));
        }
        let frames = data.len() / frame_bytes;
        Ok(Self {
            data,
            format,
            frames,
        })
    }

    /// Convenience constructor from interleaved i16 frames.
    pub fn from_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Self> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self::from_pcm(
            Buffer::from_vec(bytes),
            PcmFormat::new(sample_rate, channels, SampleWidth::S16Le),
        )
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Total frame count.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.format.sample_rate as f64
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Frame `idx` mixed down to a mono f32 in [-1, 1]. Out of range returns
    /// `None`.
    pub fn frame_mono(&self, idx: usize) -> Option<f32> {
        if idx >= self.frames {
            return None;
        }
        Some(decode_frame_mono(self.data.as_slice(), &self.format, idx))
    }
}

/// Decodes interleaved frame `idx` from raw PCM bytes and mixes it to mono.
/// The caller guarantees `idx` is in range.
pub(crate) fn decode_frame_mono(bytes: &[u8], format: &PcmFormat, idx: usize) -> f32 {
    let channels = format.channels as usize;
    let base = idx * format.frame_bytes();
    let mut acc = 0.0f32;
    for ch in 0..channels {
        acc += match format.width {
            SampleWidth::U8 => {
                let b = bytes[base + ch];
                (b as f32 - 128.0) / 128.0
            }
            SampleWidth::S16Le => {
                let off = base + ch * 2;
                let v = i16::from_le_bytes([bytes[off], bytes[off + 1]]);
                v as f32 / 32768.0
            }
        };
    }
    acc / channels as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_i16_frame_count() {
        let sample = Sample::from_i16(&[0, 0, 100, -100], 44100, 2).unwrap();
        assert_eq!(sample.frames(), 2);
        assert_eq!(sample.format().frame_bytes(), 4);
    }

    #[test]
    fn test_rejects_partial_frames() {
        let buf = Buffer::from_vec(vec![0, 1, 2]);
        let fmt = PcmFormat::new(44100, 2, SampleWidth::S16Le);
        assert!(Sample::from_pcm(buf, fmt).is_err());
    }

    #[test]
    fn test_rejects_bad_formats() {
        let buf = Buffer::new();
        assert!(Sample::from_pcm(buf.clone(), PcmFormat::new(0, 1, SampleWidth::U8)).is_err());
        assert!(Sample::from_pcm(buf.clone(), PcmFormat::new(44100, 0, SampleWidth::U8)).is_err());
        assert!(Sample::from_pcm(buf, PcmFormat::new(44100, 6, SampleWidth::U8)).is_err());
    }

    #[test]
    fn test_s16_decode() {
        let sample = Sample::from_i16(&[i16::MAX, i16::MIN, 0], 44100, 1).unwrap();
        assert!((sample.frame_mono(0).unwrap() - (32767.0 / 32768.0)).abs() < 1e-6);
        assert!((sample.frame_mono(1).unwrap() + 1.0).abs() < 1e-6);
        assert_eq!(sample.frame_mono(2), Some(0.0));
        assert_eq!(sample.frame_mono(3), None);
    }

    #[test]
    fn test_u8_decode_midpoint_is_silence() {
        let buf = Buffer::from_vec(vec![128, 255, 0]);
        let fmt = PcmFormat::new(22050, 1, SampleWidth::U8);
        let sample = Sample::from_pcm(buf, fmt).unwrap();
        assert_eq!(sample.frame_mono(0), Some(0.0));
        assert!(sample.frame_mono(1).unwrap() > 0.9);
        assert!(sample.frame_mono(2).unwrap() < -0.9);
    }

    #[test]
    fn test_stereo_mixdown_averages() {
        let sample = Sample::from_i16(&[16384, -16384], 44100, 2).unwrap();
        assert!((sample.frame_mono(0).unwrap()).abs() < 1e-6);
    }
}
