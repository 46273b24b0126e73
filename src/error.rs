//! Error types for binaura.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinauraError {
    /// A sample or stream declared a PCM layout the mixer cannot consume.
    #[error("unsupported PCM format: {0}")]
    InvalidFormat(String),

    /// Preallocation at context or source construction failed or was
    /// impossible for the requested configuration.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// Named sample lookup failed.
    #[error("no sample registered under {0:?}")]
    NotFound(String),

    /// The host audio layer refused the requested output configuration.
    #[error("audio device error: {0}")]
    AudioDevice(String),

    /// Decoding a media file failed.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BinauraError>;
