//! Modified Discrete Cosine Transform.
//!
//! Length-N MDCT implemented over an internal FFT of length N/4 with pre-
//! and post-rotation by `exp(2*pi*i*(t + 1/8)/N)`. The forward transform
//! produces N/2 coefficients in place; the inverse reconstructs N samples.
//! With an analysis/synthesis window satisfying the Princen-Bradley
//! condition `W[i]^2 + W[i + N/2]^2 == 1` and 50% overlap-add, the
//! round trip reconstructs the input exactly in the steady state.

use num_complex::Complex32;

use crate::dsp::fft::Fft;
use crate::error::{BinauraError, Result};

/// MDCT plan plus its in-place sample block.
pub struct Mdct {
    n: usize,
    fft: Fft,
    window: Vec<f32>,
    data: Vec<f32>,
    freq: Vec<Complex32>,
    rotate: Vec<f32>,
}

impl Mdct {
    /// Plan for N = 2^bits samples with a window evaluated once per slot at
    /// construction. `bits` must be at least 2 so the internal FFT length
    /// N/4 exists.
    pub fn new<W>(bits: u32, window: W) -> Result<Self>
    where
        W: Fn(usize) -> f32,
    {
        if bits < 2 {
            return Err(BinauraError::Allocation(format!(
                "MDCT of 2^{} points has no internal FFT",
                bits
            )));
        }
        let n = 1usize << bits;
        let n4 = n / 4;
        Ok(Self {
            n,
            fft: Fft::with_len(n4.max(1))?,
            window: (0..n).map(window).collect(),
            data: vec![0.0; n],
            freq: vec![Complex32::new(0.0, 0.0); n4],
            rotate: vec![0.0; n],
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// The current block: input samples before [`forward`](Self::forward),
    /// N/2 coefficients after it, N samples after [`inverse`](Self::inverse).
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Multiplies the block by the cached window in place.
    pub fn apply_window(&mut self) {
        for (v, w) in self.data.iter_mut().zip(&self.window) {
            *v *= w;
        }
    }

    /// Zeroes the block.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    fn twiddle(&self, t: usize) -> Complex32 {
        Complex32::from_polar(
            1.0,
            2.0 * std::f32::consts::PI * (t as f32 + 0.125) / self.n as f32,
        )
    }

    /// Time to frequency: N windowed samples in `data` become N/2
    /// coefficients in `data[..N/2]`.
    pub fn forward(&mut self) {
        let n = self.n;
        let n4 = n / 4;
        let m = n / 2;

        for t in 0..n4 {
            self.rotate[t] = -self.data[t + 3 * n4];
        }
        for t in n4..n {
            self.rotate[t] = self.data[t - n4];
        }

        for t in 0..n4 {
            let re = (self.rotate[2 * t] - self.rotate[n - 1 - 2 * t]) / 2.0;
            let im = (self.rotate[m + 2 * t] - self.rotate[m - 1 - 2 * t]) / -2.0;
            let a = self.twiddle(t);
            self.freq[t] = Complex32::new(re * a.re + im * a.im, -re * a.im + im * a.re);
        }

        self.fft.forward(&mut self.freq);

        let scale = 2.0 / (n as f32).sqrt();
        for t in 0..n4 {
            let a = self.twiddle(t);
            let f = self.freq[t];
            self.freq[t] = Complex32::new(
                scale * (f.re * a.re + f.im * a.im),
                scale * (-f.re * a.im + f.im * a.re),
            );
        }

        for t in 0..n4 {
            self.data[2 * t] = self.freq[t].re;
            self.data[m - 2 * t - 1] = -self.freq[t].im;
        }
    }

    /// Frequency to time: N/2 coefficients in `data[..N/2]` become N
    /// samples in `data`.
    pub fn inverse(&mut self) {
        let n = self.n;
        let n4 = n / 4;
        let m = n / 2;

        for t in 0..n4 {
            let re = self.data[2 * t] / 2.0;
            let im = self.data[m - 1 - 2 * t] / 2.0;
            let a = self.twiddle(t);
            self.freq[t] = Complex32::new(re * a.re + im * a.im, -re * a.im + im * a.re);
        }

        self.fft.forward(&mut self.freq);

        let scale = 8.0 / (n as f32).sqrt();
        for t in 0..n4 {
            let a = self.twiddle(t);
            let f = self.freq[t];
            self.freq[t] = Complex32::new(
                scale * (f.re * a.re + f.im * a.im),
                scale * (-f.re * a.im + f.im * a.re),
            );
        }

        for t in 0..n4 {
            self.rotate[2 * t] = self.freq[t].re;
            self.rotate[m + 2 * t] = self.freq[t].im;
        }
        let mut t = 1;
        while t < n {
            self.rotate[t] = -self.rotate[n - t - 1];
            t += 2;
        }

        for t in 0..3 * n4 {
            self.data[t] = self.rotate[t + n4];
        }
        for t in 3 * n4..n {
            self.data[t] = -self.rotate[t - 3 * n4];
        }
    }
}

/// Sine window `sin(pi*(i + 0.5)/N)`, which satisfies the Princen-Bradley
/// condition for 50% overlap.
pub fn sine_window(n: usize) -> impl Fn(usize) -> f32 {
    move |i| (std::f32::consts::PI * (i as f32 + 0.5) / n as f32).sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(seed: &mut u64) -> f32 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*seed >> 34) as f64 / (1u64 << 29) as f64 - 1.0) as f32
    }

    #[test]
    fn test_sine_window_princen_bradley() {
        let n = 512;
        let w = sine_window(n);
        for i in 0..n / 2 {
            let sum = w(i) * w(i) + w(i + n / 2) * w(i + n / 2);
            assert!((sum - 1.0).abs() < 1e-6, "slot {}: {}", i, sum);
        }
    }

    #[test]
    fn test_rejects_tiny_transform() {
        assert!(Mdct::new(1, |_| 1.0).is_err());
        assert!(Mdct::new(8, |_| 1.0).is_ok());
    }

    #[test]
    fn test_forward_emits_half_spectrum_linearly() {
        let bits = 6;
        let n = 1usize << bits;
        let mut seed = 7;
        let x: Vec<f32> = (0..n).map(|_| noise(&mut seed)).collect();
        let y: Vec<f32> = (0..n).map(|_| noise(&mut seed)).collect();

        let mut mdct = Mdct::new(bits, |_| 1.0).unwrap();

        mdct.data_mut().copy_from_slice(&x);
        mdct.forward();
        let fx = mdct.data()[..n / 2].to_vec();

        mdct.data_mut().copy_from_slice(&y);
        mdct.forward();
        let fy = mdct.data()[..n / 2].to_vec();

        let combined: Vec<f32> = x.iter().zip(&y).map(|(a, b)| 0.5 * a - 2.0 * b).collect();
        mdct.data_mut().copy_from_slice(&combined);
        mdct.forward();

        for k in 0..n / 2 {
            let expected = 0.5 * fx[k] - 2.0 * fy[k];
            assert!(
                (mdct.data()[k] - expected).abs() < 1e-3,
                "coefficient {} not linear",
                k
            );
        }
    }

    #[test]
    fn test_overlap_add_reconstruction() {
        let bits = 8;
        let n = 1usize << bits;
        let hop = n / 2;
        let blocks = 8;
        let len = hop * (blocks + 1);

        let mut seed = 0xabcd;
        let signal: Vec<f32> = (0..len).map(|_| noise(&mut seed)).collect();
        let mut output = vec![0.0f32; len];

        let mut mdct = Mdct::new(bits, sine_window(n)).unwrap();
        for b in 0..blocks {
            let off = b * hop;
            mdct.data_mut().copy_from_slice(&signal[off..off + n]);
            mdct.apply_window();
            mdct.forward();

            let coeffs = mdct.data()[..n / 2].to_vec();
            mdct.clear();
            mdct.data_mut()[..n / 2].copy_from_slice(&coeffs);
            mdct.inverse();
            mdct.apply_window();

            for (i, v) in mdct.data().iter().enumerate() {
                output[off + i] += v;
            }
        }

        // Steady state excludes the first and last half-overlapped block.
        for i in n..len - n {
            assert!(
                (output[i] - signal[i]).abs() < 1e-3,
                "sample {}: {} vs {}",
                i,
                output[i],
                signal[i]
            );
        }
    }
}
