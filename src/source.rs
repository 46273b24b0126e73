//! A single playing sample or stream anchored to an object.
//!
//! The source owns every piece of per-emitter mutable state: the rational
//! playback cursor, loop flag, fade envelopes, and the persistent
//! convolution tails that keep HRTF blocks artifact-free across calls. All
//! scratch buffers are sized and allocated at construction; the render path
//! does not allocate except on the first visit to a new direction bin.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use num_complex::Complex32;

use crate::buffer::Buffer;
use crate::dsp::Fft;
use crate::error::{BinauraError, Result};
use crate::hrtf::{DirectionBin, HrtfDatabase};
use crate::sample::{decode_frame_mono, PcmFormat, Sample};
use crate::stream::Stream;

/// Playback parameters for a new source.
#[derive(Debug, Clone)]
pub struct SourceDesc {
    pub gain: f32,
    pub pitch: f32,
    pub looped: bool,
    /// Ramp-in time from the start of playback, seconds.
    pub fade_in: f32,
    /// Ramp-out time applied when playback ends naturally, seconds.
    pub fade_out: f32,
}

impl Default for SourceDesc {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch: 1.0,
            looped: false,
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }
}

impl SourceDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    pub fn fade_in(mut self, seconds: f32) -> Self {
        self.fade_in = seconds;
        self
    }

    pub fn fade_out(mut self, seconds: f32) -> Self {
        self.fade_out = seconds;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(BinauraError::InvalidFormat(format!(
                "gain {} is not a finite non-negative number",
                self.gain
            )));
        }
        if !self.pitch.is_finite() || self.pitch <= 0.0 {
            return Err(BinauraError::InvalidFormat(format!(
                "pitch {} is not a finite positive number",
                self.pitch
            )));
        }
        if self.fade_in < 0.0 || self.fade_out < 0.0 {
            return Err(BinauraError::InvalidFormat(
                "fade times must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// The PCM supply behind a source.
enum Input {
    Sample(Arc<Sample>),
    Stream {
        stream: Box<dyn Stream>,
        format: PcmFormat,
        /// Decoded mono frames covering [window_start, window_start + len).
        window: VecDeque<f32>,
        window_start: usize,
        /// Raw bytes read but not yet decoded into whole frames.
        pending: Buffer,
        eof: bool,
        wrapped: bool,
    },
}

impl Input {
    fn sample_rate(&self) -> u32 {
        match self {
            Input::Sample(s) => s.sample_rate(),
            Input::Stream { format, .. } => format.sample_rate,
        }
    }

    /// Drops decoded stream frames the cursor has passed.
    fn trim(&mut self, cursor: usize) {
        if let Input::Stream {
            window,
            window_start,
            ..
        } = self
        {
            while *window_start < cursor && !window.is_empty() {
                window.pop_front();
                *window_start += 1;
            }
        }
    }

    /// Mono frame at `frame`, wrapping for looping inputs. `None` means the
    /// input is exhausted at that position.
    fn fetch(&mut self, frame: usize, looped: bool) -> Option<f32> {
        match self {
            Input::Sample(s) => {
                let frames = s.frames();
                if frames == 0 {
                    return None;
                }
                if looped {
                    s.frame_mono(frame % frames)
                } else {
                    s.frame_mono(frame)
                }
            }
            Input::Stream {
                stream,
                format,
                window,
                window_start,
                pending,
                eof,
                wrapped,
            } => {
                let frame_bytes = format.frame_bytes();
                let mut stalls = 0u32;
                loop {
                    if frame < *window_start {
                        // The cursor never moves backwards; a stale index can
                        // only come from an interpolation neighbor.
                        return window.front().copied();
                    }
                    let idx = frame - *window_start;
                    if idx < window.len() {
                        return Some(window[idx]);
                    }
                    if *eof {
                        return None;
                    }

                    let missing_frames = idx - window.len() + 1;
                    let hint = (missing_frames * frame_bytes).max(2048);
                    let before = window.len();
                    if stream.read(pending, hint) {
                        let whole = pending.len() / frame_bytes;
                        for i in 0..whole {
                            window.push_back(decode_frame_mono(pending.as_slice(), format, i));
                        }
                        pending.drain_front(whole * frame_bytes);
                    } else if looped {
                        stream.rewind();
                        *wrapped = true;
                    } else {
                        *eof = true;
                    }

                    if window.len() == before {
                        stalls += 1;
                        if stalls > 8 {
                            log::warn!("stream made no progress, treating as end of stream");
                            *eof = true;
                        }
                    } else {
                        stalls = 0;
                    }
                }
            }
        }
    }

    fn take_wrapped(&mut self) -> bool {
        match self {
            Input::Sample(_) => false,
            Input::Stream { wrapped, .. } => std::mem::take(wrapped),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FadeOut {
    remaining: f32,
    total: f32,
}

struct SpectrumPair {
    left: Vec<Complex32>,
    right: Vec<Complex32>,
}

/// Per-emitter playback state. Created through
/// [`Context::create_source`](crate::Context::create_source) and owned by an
/// object's source maps; every access is serialized by the audio lock.
pub struct Source {
    input: Input,
    looped: bool,
    gain: f32,
    pitch: f32,
    fade_in: f32,
    fade_out_at_end: f32,

    cursor_int: usize,
    cursor_frac: f64,
    out_elapsed: f64,
    fade: Option<FadeOut>,
    consumed: bool,
    flushed_blocks: u32,
    dead: bool,
    wrapped: bool,

    hrtf: Arc<HrtfDatabase>,
    fft: Fft,
    fft_len: usize,
    out_rate: u32,
    block_size: usize,

    block: Vec<f32>,
    scratch: Vec<Complex32>,
    overlap: [Vec<f32>; 2],
    spectra: HashMap<DirectionBin, SpectrumPair>,
}

impl Source {
    pub(crate) fn with_sample(
        sample: Arc<Sample>,
        desc: SourceDesc,
        out_rate: u32,
        block_size: usize,
        hrtf: Arc<HrtfDatabase>,
    ) -> Result<Self> {
        Self::new(Input::Sample(sample), desc, out_rate, block_size, hrtf)
    }

    pub(crate) fn with_stream(
        stream: Box<dyn Stream>,
        desc: SourceDesc,
        out_rate: u32,
        block_size: usize,
        hrtf: Arc<HrtfDatabase>,
    ) -> Result<Self> {
        let format = stream.format();
        format.validate()?;
        Self::new(
            Input::Stream {
                stream,
                format,
                window: VecDeque::new(),
                window_start: 0,
                pending: Buffer::new(),
                eof: false,
                wrapped: false,
            },
            desc,
            out_rate,
            block_size,
            hrtf,
        )
    }

    fn new(
        input: Input,
        desc: SourceDesc,
        out_rate: u32,
        block_size: usize,
        hrtf: Arc<HrtfDatabase>,
    ) -> Result<Self> {
        desc.validate()?;
        let ir_len = hrtf.ir_len();
        let fft_len = (block_size + ir_len - 1)
            .checked_next_power_of_two()
            .ok_or_else(|| {
                BinauraError::Allocation(format!(
                    "convolution block for {} output frames overflows",
                    block_size
                ))
            })?;
        Ok(Self {
            input,
            looped: desc.looped,
            gain: desc.gain,
            pitch: desc.pitch,
            fade_in: desc.fade_in,
            fade_out_at_end: desc.fade_out,
            cursor_int: 0,
            cursor_frac: 0.0,
            out_elapsed: 0.0,
            fade: None,
            consumed: false,
            flushed_blocks: 0,
            dead: false,
            wrapped: false,
            hrtf,
            fft: Fft::with_len(fft_len)?,
            fft_len,
            out_rate,
            block_size,
            block: vec![0.0; block_size],
            scratch: vec![Complex32::new(0.0, 0.0); fft_len],
            overlap: [vec![0.0; ir_len - 1], vec![0.0; ir_len - 1]],
            spectra: HashMap::new(),
        })
    }

    pub fn looped(&self) -> bool {
        self.looped
    }

    pub(crate) fn set_looped(&mut self, looped: bool) {
        self.looped = looped;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        if gain.is_finite() && gain >= 0.0 {
            self.gain = gain;
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Starts (or restarts) a linear fade to silence over `seconds`.
    pub(crate) fn begin_fade_out(&mut self, seconds: f32) {
        let seconds = seconds.max(0.0);
        log::debug!("source fading out over {} s", seconds);
        self.fade = Some(FadeOut {
            remaining: seconds,
            total: seconds.max(f32::EPSILON),
        });
    }

    pub(crate) fn kill(&mut self) {
        self.dead = true;
    }

    /// True once per loop wrap; cleared by the call.
    pub(crate) fn take_wrapped(&mut self) -> bool {
        std::mem::take(&mut self.wrapped)
    }

    fn envelope(&self, offset_secs: f64) -> f32 {
        let mut e = 1.0f32;
        if self.fade_in > 0.0 {
            let t = (self.out_elapsed + offset_secs) as f32;
            e *= (t / self.fade_in).clamp(0.0, 1.0);
        }
        if let Some(fade) = self.fade {
            e *= ((fade.remaining - offset_secs as f32) / fade.total).clamp(0.0, 1.0);
        }
        e
    }

    /// Renders one block and sums the stereo contribution into `out`
    /// (interleaved, `2 * block_size` samples). `gain_scale` folds distance
    /// attenuation and master volume; `pitch_scale` folds the Doppler
    /// factor; `bin` selects the HRTF direction.
    pub(crate) fn render(&mut self, out: &mut [f32], gain_scale: f32, pitch_scale: f32, bin: DirectionBin) {
        debug_assert_eq!(out.len(), 2 * self.block_size);
        if self.dead {
            return;
        }

        let was_consumed = self.consumed;
        self.pull_block(pitch_scale);
        self.apply_envelope(gain_scale);
        self.convolve(bin, out);

        let block_secs = self.block_size as f64 / self.out_rate as f64;
        self.out_elapsed += block_secs;
        if let Some(fade) = &mut self.fade {
            fade.remaining -= block_secs as f32;
        }
        if was_consumed {
            self.flushed_blocks += 1;
        }
        if self.input.take_wrapped() {
            self.wrapped = true;
        }

        if self.consumed && self.fade.is_none() && self.fade_out_at_end > 0.0 {
            self.begin_fade_out(self.fade_out_at_end);
        }
        let faded_out = self.fade.map_or(false, |f| f.remaining <= 0.0);
        let tail_flushed = self.consumed && self.flushed_blocks >= 1 && self.fade.is_none();
        if faded_out || tail_flushed {
            log::debug!(
                "source exhausted after {:.3} s (faded: {})",
                self.out_elapsed,
                faded_out
            );
            self.dead = true;
        }
    }

    /// Fills the mono block from the input with linear-interpolation
    /// resampling, zero-filling past the end of a non-looping input.
    fn pull_block(&mut self, pitch_scale: f32) {
        let src_rate = self.input.sample_rate();
        let step = ((self.pitch * pitch_scale) as f64 * src_rate as f64 / self.out_rate as f64)
            .max(1e-6);
        let looped = self.looped;

        self.input.trim(self.cursor_int);
        for i in 0..self.block_size {
            let v = match self.input.fetch(self.cursor_int, looped) {
                Some(s0) => {
                    let s1 = self
                        .input
                        .fetch(self.cursor_int + 1, looped)
                        .unwrap_or(s0);
                    s0 + (s1 - s0) * self.cursor_frac as f32
                }
                None => {
                    self.consumed = true;
                    0.0
                }
            };
            self.block[i] = v;

            self.cursor_frac += step;
            let advance = self.cursor_frac as usize;
            self.cursor_int += advance;
            self.cursor_frac -= advance as f64;
        }

        // Loop wrap detection for finite samples.
        if looped {
            if let Input::Sample(s) = &self.input {
                let frames = s.frames();
                if frames > 0 && self.cursor_int >= frames {
                    self.cursor_int %= frames;
                    self.wrapped = true;
                }
            }
        }
    }

    fn apply_envelope(&mut self, gain_scale: f32) {
        let block_secs = self.block_size as f64 / self.out_rate as f64;
        let g0 = self.envelope(0.0) * self.gain * gain_scale;
        let g1 = self.envelope(block_secs) * self.gain * gain_scale;
        let n = self.block_size as f32;
        for (i, v) in self.block.iter_mut().enumerate() {
            let t = i as f32 / n;
            *v *= g0 + (g1 - g0) * t;
        }
    }

    /// Overlap-save convolution against the cached spectrum of `bin`,
    /// summing the valid region into the interleaved output.
    fn convolve(&mut self, bin: DirectionBin, out: &mut [f32]) {
        if !self.spectra.contains_key(&bin) {
            let (left_ir, right_ir) = self.hrtf.impulse_responses(bin);
            let pair = SpectrumPair {
                left: ir_spectrum(&self.fft, self.fft_len, left_ir),
                right: ir_spectrum(&self.fft, self.fft_len, right_ir),
            };
            self.spectra.insert(bin, pair);
        }

        let tail_len = self.hrtf.ir_len() - 1;
        let b = self.block_size;
        for ear in 0..2 {
            let spectrum = {
                let pair = &self.spectra[&bin];
                if ear == 0 {
                    &pair.left
                } else {
                    &pair.right
                }
            };

            self.scratch.fill(Complex32::new(0.0, 0.0));
            for (dst, src) in self.scratch.iter_mut().zip(&self.overlap[ear]) {
                dst.re = *src;
            }
            for (dst, src) in self.scratch[tail_len..].iter_mut().zip(&self.block) {
                dst.re = *src;
            }

            self.fft.forward(&mut self.scratch);
            for (v, h) in self.scratch.iter_mut().zip(spectrum) {
                *v = *v * *h;
            }
            self.fft.inverse(&mut self.scratch);

            for i in 0..b {
                out[2 * i + ear] += self.scratch[tail_len + i].re;
            }
        }

        // Carry the last tail_len input samples into the next block.
        for ear in 0..2 {
            let tail = &mut self.overlap[ear];
            if b >= tail_len {
                tail.copy_from_slice(&self.block[b - tail_len..]);
            } else {
                tail.rotate_left(b);
                tail[tail_len - b..].copy_from_slice(&self.block);
            }
        }
    }
}

fn ir_spectrum(fft: &Fft, fft_len: usize, ir: &[f32]) -> Vec<Complex32> {
    let mut buf = vec![Complex32::new(0.0, 0.0); fft_len];
    for (dst, src) in buf.iter_mut().zip(ir) {
        dst.re = *src;
    }
    fft.forward(&mut buf);
    buf
}
