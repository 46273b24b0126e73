//! Spectral kernels backing the HRTF convolution path.

pub mod fft;
pub mod mdct;

pub use fft::Fft;
pub use mdct::{sine_window, Mdct};
