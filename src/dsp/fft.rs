//! Radix-2 complex FFT.
//!
//! In-place transform over a contiguous complex buffer of power-of-two
//! length: bit-reversal scramble followed by log2(N) Danielson-Lanczos
//! passes. Twiddles are generated by the trigonometric recurrence
//! `w <- w + w*wp` so the inner loop never calls `sin`/`cos`.

use num_complex::{Complex32, Complex64};

use crate::error::{BinauraError, Result};

/// Transform plan for a fixed power-of-two length.
#[derive(Debug, Clone)]
pub struct Fft {
    n: usize,
}

impl Fft {
    /// Plan for N = 2^bits points.
    pub fn new(bits: u32) -> Self {
        Self { n: 1 << bits }
    }

    /// Plan for an explicit length, which must be a power of two.
    pub fn with_len(n: usize) -> Result<Self> {
        if n == 0 || !n.is_power_of_two() {
            return Err(BinauraError::Allocation(format!(
                "FFT length {} is not a power of two",
                n
            )));
        }
        Ok(Self { n })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// X[k] = sum_n x[n] * exp(-2*pi*i*k*n/N).
    pub fn forward(&self, data: &mut [Complex32]) {
        debug_assert_eq!(data.len(), self.n);
        scramble(data);
        butterflies(data, -1.0);
    }

    /// Inverse transform with the opposite twiddle sign, scaled by 1/N so
    /// that `inverse(forward(x)) == x` up to rounding.
    pub fn inverse(&self, data: &mut [Complex32]) {
        debug_assert_eq!(data.len(), self.n);
        scramble(data);
        butterflies(data, 1.0);
        let scale = 1.0 / self.n as f32;
        for v in data.iter_mut() {
            *v *= scale;
        }
    }
}

fn scramble(data: &mut [Complex32]) {
    let n = data.len();
    let mut j = 0usize;
    for i in 0..n {
        if i > j {
            data.swap(i, j);
        }
        let mut m = n / 2;
        while j >= m && m >= 2 {
            j -= m;
            m >>= 1;
        }
        j += m;
    }
}

fn butterflies(data: &mut [Complex32], sign: f64) {
    let n = data.len();
    let mut half = 1usize;
    while half < n {
        let step = half * 2;
        let alpha = sign * std::f64::consts::PI / half as f64;
        let wtemp = (alpha / 2.0).sin();
        let wp = Complex64::new(-2.0 * wtemp * wtemp, alpha.sin());
        let mut w = Complex64::new(1.0, 0.0);
        for k in 0..half {
            let wk = Complex32::new(w.re as f32, w.im as f32);
            let mut i = k;
            while i < n {
                let j = i + half;
                let temp = wk * data[j];
                data[j] = data[i] - temp;
                data[i] += temp;
                i += step;
            }
            w += w * wp;
        }
        half = step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random values in [-1, 1].
    fn noise(seed: &mut u64) -> f32 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*seed >> 34) as f64 / (1u64 << 29) as f64 - 1.0) as f32
    }

    fn random_vector(n: usize, seed: &mut u64) -> Vec<Complex32> {
        (0..n)
            .map(|_| Complex32::new(noise(seed), noise(seed)))
            .collect()
    }

    fn max_err(a: &[Complex32], b: &[Complex32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).norm())
            .fold(0.0f32, f32::max)
    }

    #[test]
    fn test_impulse_has_flat_spectrum() {
        let fft = Fft::new(4);
        let mut data = vec![Complex32::new(0.0, 0.0); 16];
        data[0] = Complex32::new(1.0, 0.0);
        fft.forward(&mut data);
        for bin in &data {
            assert!((bin - Complex32::new(1.0, 0.0)).norm() < 1e-6);
        }
    }

    #[test]
    fn test_constant_concentrates_in_dc() {
        let fft = Fft::new(3);
        let mut data = vec![Complex32::new(0.5, 0.0); 8];
        fft.forward(&mut data);
        assert!((data[0] - Complex32::new(4.0, 0.0)).norm() < 1e-5);
        for bin in &data[1..] {
            assert!(bin.norm() < 1e-5);
        }
    }

    #[test]
    fn test_single_tone_bin() {
        let n = 64;
        let fft = Fft::with_len(n).unwrap();
        let k = 5;
        let mut data: Vec<Complex32> = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * k as f32 * i as f32 / n as f32;
                Complex32::new(phase.cos(), 0.0)
            })
            .collect();
        fft.forward(&mut data);
        // A real cosine splits between bins k and N-k.
        assert!((data[k].re - n as f32 / 2.0).abs() < 1e-3);
        assert!((data[n - k].re - n as f32 / 2.0).abs() < 1e-3);
        assert!(data[1].norm() < 1e-3);
    }

    #[test]
    fn test_round_trip_all_sizes() {
        let eps = (2.0f32).powi(-20);
        let mut seed = 0x5eed;
        for bits in 3..=10u32 {
            let n = 1usize << bits;
            let fft = Fft::new(bits);
            let original = random_vector(n, &mut seed);
            let mut data = original.clone();
            fft.forward(&mut data);
            fft.inverse(&mut data);
            let err = max_err(&data, &original);
            assert!(
                err < eps * n as f32,
                "round trip error {} at N={}",
                err,
                n
            );
        }
    }

    #[test]
    fn test_linearity() {
        let n = 256;
        let fft = Fft::with_len(n).unwrap();
        let mut seed = 99;
        let x = random_vector(n, &mut seed);
        let y = random_vector(n, &mut seed);
        let (a, b) = (0.7f32, -1.3f32);

        let mut combined: Vec<Complex32> =
            x.iter().zip(&y).map(|(xv, yv)| *xv * a + *yv * b).collect();
        fft.forward(&mut combined);

        let mut fx = x;
        let mut fy = y;
        fft.forward(&mut fx);
        fft.forward(&mut fy);
        let expected: Vec<Complex32> =
            fx.iter().zip(&fy).map(|(xv, yv)| *xv * a + *yv * b).collect();

        let eps = (2.0f32).powi(-20) * n as f32 * 4.0;
        assert!(max_err(&combined, &expected) < eps);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(Fft::with_len(0).is_err());
        assert!(Fft::with_len(48).is_err());
        assert!(Fft::with_len(1024).is_ok());
    }
}
