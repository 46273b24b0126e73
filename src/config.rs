//! Output configuration for a [`Context`](crate::Context).

use crate::error::{BinauraError, Result};

/// Describes the PCM format the mixer produces and how much of it is
/// produced per callback.
#[derive(Debug, Clone)]
pub struct ContextDesc {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count. Only stereo output is supported.
    pub channels: u16,
    /// Frames produced per `process` call.
    pub block_size: usize,
}

impl Default for ContextDesc {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            block_size: 1024,
        }
    }
}

impl ContextDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn block_size(mut self, frames: usize) -> Self {
        self.block_size = frames;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BinauraError::InvalidFormat(
                "sample rate must be greater than 0".into(),
            ));
        }
        if self.channels != 2 {
            return Err(BinauraError::InvalidFormat(format!(
                "only stereo output is supported, requested {} channels",
                self.channels
            )));
        }
        if self.block_size == 0 {
            return Err(BinauraError::Allocation(
                "block size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
