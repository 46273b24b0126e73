//! Pull-based PCM streaming.
//!
//! A [`Stream`] is the seam between the mixer and any decoder: the source
//! pulls raw PCM bytes on the audio callback, the implementation produces
//! them however it likes (file decode, procedural synthesis, network buffer).
//! A stream is owned by exactly one source and read by exactly one thread.

use crate::buffer::Buffer;
use crate::sample::PcmFormat;

/// Abstract pull source of interleaved PCM bytes.
pub trait Stream: Send {
    /// The PCM layout of the bytes this stream produces. Must not change
    /// over the stream's lifetime.
    fn format(&self) -> PcmFormat;

    /// Seeks back to the beginning. Called when a looping source exhausts
    /// the stream.
    fn rewind(&mut self);

    /// Appends roughly `hint` bytes of PCM to `out`. Returns `false` at end
    /// of stream; returning `true` with fewer than `hint` bytes appended is
    /// permitted and does not imply EOF. A decode failure is reported as end
    /// of stream — the mixer substitutes silence.
    fn read(&mut self, out: &mut Buffer, hint: usize) -> bool;
}
