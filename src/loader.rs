//! Decoding media files into samples and streams.
//!
//! The mixer itself only consumes raw PCM; this module is the bridge from
//! compressed containers to it. [`load_sample`] decodes a whole file into an
//! immutable [`Sample`]; [`MediaStream`] wraps the same decoder behind the
//! pull-based [`Stream`] interface for audio too large to predecode.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::buffer::Buffer;
use crate::error::{BinauraError, Result};
use crate::sample::{PcmFormat, Sample, SampleWidth};
use crate::stream::Stream;

/// Options for [`load_sample`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Resample the decoded audio to this rate. `None` keeps the file's
    /// rate; the source-level linear resampler covers the difference at mix
    /// time.
    pub resample_to: Option<u32>,
    /// Mix everything down to one channel.
    pub mono: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resample_to(mut self, rate: u32) -> Self {
        self.resample_to = Some(rate);
        self
    }

    pub fn mono(mut self, mono: bool) -> Self {
        self.mono = mono;
        self
    }
}

struct Decoded {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

fn open(path: &str) -> Result<Decoded> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BinauraError::Decode(format!("failed to probe {}: {}", path, e)))?;

    let reader = probed.format;
    let (track_id, codec_params) = {
        let track = reader
            .default_track()
            .ok_or_else(|| BinauraError::Decode(format!("no audio track in {}", path)))?;
        (track.id, track.codec_params.clone())
    };

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| BinauraError::Decode("sample rate not declared".into()))?;
    let channels = codec_params
        .channels
        .ok_or_else(|| BinauraError::Decode("channel layout not declared".into()))?
        .count() as u16;

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| BinauraError::Decode(format!("no decoder for {}: {}", path, e)))?;

    Ok(Decoded {
        track_id,
        reader,
        decoder,
        sample_rate,
        channels,
    })
}

/// Pulls the next packet's samples as interleaved f32. `Ok(None)` is end of
/// stream; recoverable decode errors skip the packet.
fn next_packet(d: &mut Decoded) -> Result<Option<Vec<f32>>> {
    loop {
        let packet = match d.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => return Ok(None),
            Err(e) => return Err(BinauraError::Decode(format!("packet read failed: {}", e))),
        };
        if packet.track_id() != d.track_id {
            continue;
        }
        let decoded = match d.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::IoError(_)) => return Ok(None),
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(BinauraError::Decode(format!("decode failed: {}", e))),
        };
        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        return Ok(Some(buf.samples().to_vec()));
    }
}

/// Decodes a whole file into a 16-bit PCM [`Sample`].
pub fn load_sample(path: &str, options: &LoadOptions) -> Result<Sample> {
    let mut decoded = open(path)?;
    let mut samples: Vec<f32> = Vec::new();
    while let Some(packet) = next_packet(&mut decoded)? {
        samples.extend_from_slice(&packet);
    }

    let mut channels = decoded.channels;
    if options.mono && channels > 1 {
        samples = samples
            .chunks(channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        channels = 1;
    }

    let mut sample_rate = decoded.sample_rate;
    if let Some(target) = options.resample_to {
        if target != sample_rate {
            samples = resample_interleaved(&samples, sample_rate, target, channels)?;
            sample_rate = target;
        }
    }

    log::info!(
        "loaded {:?}: {} frames, {} channel(s) at {} Hz",
        path,
        samples.len() / channels as usize,
        channels,
        sample_rate
    );

    let pcm: Vec<i16> = samples
        .iter()
        .map(|v| (v.clamp(-1.0, 1.0) * 32767.0).round() as i16)
        .collect();
    Sample::from_i16(&pcm, sample_rate, channels)
}

/// Offline rubato resample of interleaved audio, channel by channel.
fn resample_interleaved(
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
    channels: u16,
) -> Result<Vec<f32>> {
    use rubato::Resampler;

    const CHUNK: usize = 1024;
    let channels = channels as usize;
    let frames = samples.len() / channels;

    let mut planes: Vec<Vec<f32>> = Vec::with_capacity(channels);
    for ch in 0..channels {
        let mut resampler =
            rubato::FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK, 2, 1)
                .map_err(|e| {
                    BinauraError::Allocation(format!("failed to create resampler: {}", e))
                })?;
        let delay = resampler.output_delay();
        let target = (frames as f64 * to_rate as f64 / from_rate as f64).round() as usize;

        let mut plane: Vec<f32> = samples
            .chunks(channels)
            .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
            .collect();
        let mut output = Vec::with_capacity(target + delay);
        let mut offset = 0;
        while output.len() < delay + target {
            let mut chunk = vec![0.0f32; CHUNK];
            if offset < plane.len() {
                let n = CHUNK.min(plane.len() - offset);
                chunk[..n].copy_from_slice(&plane[offset..offset + n]);
                offset += n;
            }
            let waves = resampler
                .process(&[chunk], None)
                .map_err(|e| BinauraError::Decode(format!("resampling failed: {}", e)))?;
            output.extend_from_slice(&waves[0]);
        }
        plane.clear();
        output.drain(..delay);
        output.truncate(target);
        planes.push(output);
    }

    let out_frames = planes[0].len();
    let mut interleaved = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        for plane in &planes {
            interleaved.push(plane[i]);
        }
    }
    Ok(interleaved)
}

/// A [`Stream`] that decodes a media file on demand, packet by packet. The
/// file-format counterpart of wiring a predecoded sample: the host accepts
/// that decode work (and its I/O) happens inside the audio callback.
pub struct MediaStream {
    decoded: Decoded,
    format: PcmFormat,
    finished: bool,
}

impl MediaStream {
    pub fn open(path: &str) -> Result<Self> {
        let decoded = open(path)?;
        let format = PcmFormat::new(decoded.sample_rate, decoded.channels, SampleWidth::S16Le);
        format.validate()?;
        Ok(Self {
            decoded,
            format,
            finished: false,
        })
    }
}

impl Stream for MediaStream {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn rewind(&mut self) {
        let seek = self.decoded.reader.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::default(),
                track_id: Some(self.decoded.track_id),
            },
        );
        match seek {
            Ok(_) => {
                self.decoded.decoder.reset();
                self.finished = false;
            }
            Err(e) => {
                log::warn!("stream rewind failed: {}", e);
                self.finished = true;
            }
        }
    }

    fn read(&mut self, out: &mut Buffer, hint: usize) -> bool {
        if self.finished {
            return false;
        }
        let mut written = 0usize;
        while written < hint {
            match next_packet(&mut self.decoded) {
                Ok(Some(samples)) => {
                    for v in &samples {
                        let pcm = (v.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                        out.append(&pcm.to_le_bytes());
                    }
                    written += samples.len() * 2;
                }
                Ok(None) => {
                    self.finished = true;
                    return written > 0;
                }
                Err(e) => {
                    log::warn!("stream decode failed: {}", e);
                    self.finished = true;
                    return written > 0;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_sample("/nonexistent/tone.ogg", &LoadOptions::new()).is_err());
        assert!(MediaStream::open("/nonexistent/tone.ogg").is_err());
    }

    #[test]
    fn test_resample_interleaved_halves_length() {
        let frames = 4096;
        let input: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let output = resample_interleaved(&input, 44100, 22050, 1).unwrap();
        assert_eq!(output.len(), frames / 2);
        // Still a signal, not silence or garbage.
        let peak = output.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak > 0.8 && peak <= 1.05, "peak {}", peak);
    }

    #[test]
    fn test_resample_preserves_channel_association() {
        // Left is a ramp, right is its negation.
        let frames = 2048;
        let mut input = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let v = (i as f32 / frames as f32) * 0.8;
            input.push(v);
            input.push(-v);
        }
        let output = resample_interleaved(&input, 44100, 48000, 2).unwrap();
        assert_eq!(output.len() % 2, 0);
        // Away from the edges, channels stay mirrored.
        let pairs = output.len() / 2;
        for i in pairs / 4..3 * pairs / 4 {
            let (l, r) = (output[2 * i], output[2 * i + 1]);
            assert!((l + r).abs() < 0.01, "frame {}: {} vs {}", i, l, r);
        }
    }
}
