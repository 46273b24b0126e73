//! KEMAR-layout impulse response grid.
//!
//! The table keeps the measurement grid of the KEMAR dataset: elevation rows
//! from -40 to +90 degrees in 10 degree steps, each row covering the full
//! azimuth circle with its own measurement count, one 128-tap response per
//! position at 44.1 kHz, a single stored ear with the other served by the
//! mirrored azimuth. Responses are synthesized from a rigid spherical-head
//! model: Woodworth arrival delay, angle-dependent shadow gain and a
//! one-pole damping of the shadowed side, normalized per direction.

/// Elevation rows in degrees, low to high.
pub const ELEVATIONS: [f32; 14] = [
    -40.0, -30.0, -20.0, -10.0, 0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0,
];

/// Measured azimuths per elevation row, uniformly spaced over [0, 360).
pub const AZIMUTH_COUNTS: [usize; 14] = [56, 60, 72, 72, 72, 72, 72, 60, 56, 45, 36, 24, 12, 1];

/// Impulse response length at the measurement rate.
pub const IR_LEN: usize = 128;

/// Rate the table is defined at; resampled on init when the output differs.
pub const MEASUREMENT_RATE: u32 = 44100;

const HEAD_RADIUS_M: f32 = 0.0875;
const SPEED_OF_SOUND_M_S: f32 = 343.0;
/// Residual gain of the fully shadowed ear.
const SHADOW_FLOOR: f32 = 0.12;
/// Taps the response leads the direct arrival by, leaving room for the
/// interpolation kernel's left lobe.
const ONSET_TAPS: f32 = 8.0;

/// Left-ear impulse response for a measurement position, 128 taps at
/// 44.1 kHz, normalized so the louder ear of the pair has unit DC gain.
pub fn synthesize_left_ir(elevation_deg: f32, azimuth_deg: f32) -> Vec<f32> {
    // cos of the angle between the direction and each ear axis; azimuth is
    // clockwise from straight ahead toward the right ear.
    let el = elevation_deg.to_radians();
    let az = azimuth_deg.to_radians();
    let lateral = az.sin() * el.cos();
    let cos_right = lateral;
    let cos_left = -lateral;

    let norm = shadow_gain(cos_left).max(shadow_gain(cos_right));
    let gain = shadow_gain(cos_left) / norm;

    let fs = MEASUREMENT_RATE as f32;
    let delay_taps = ONSET_TAPS + arrival_delay_secs(cos_left) * fs;

    let mut ir = vec![0.0f32; IR_LEN];
    place_impulse(&mut ir, delay_taps, gain);
    damp_shadowed(&mut ir, cos_left, fs);
    ir
}

/// Per-ear shadow gain, 1.0 at the ear, tapering to the floor behind the
/// head.
fn shadow_gain(cos_incidence: f32) -> f32 {
    SHADOW_FLOOR + (1.0 - SHADOW_FLOOR) * (1.0 + cos_incidence) / 2.0
}

/// Woodworth arrival delay relative to the closest approach.
fn arrival_delay_secs(cos_incidence: f32) -> f32 {
    let theta = cos_incidence.clamp(-1.0, 1.0).acos();
    let base = HEAD_RADIUS_M / SPEED_OF_SOUND_M_S;
    if theta <= std::f32::consts::FRAC_PI_2 {
        base * (1.0 - cos_incidence)
    } else {
        base * (1.0 + theta - std::f32::consts::FRAC_PI_2)
    }
}

/// Writes a windowed-sinc unit impulse at a fractional tap position.
fn place_impulse(ir: &mut [f32], center: f32, gain: f32) {
    const HALF_WIDTH: f32 = 4.0;
    let lo = (center - HALF_WIDTH).floor().max(0.0) as usize;
    let hi = ((center + HALF_WIDTH).ceil() as usize).min(ir.len() - 1);
    for (n, tap) in ir.iter_mut().enumerate().take(hi + 1).skip(lo) {
        let t = n as f32 - center;
        if t.abs() >= HALF_WIDTH {
            continue;
        }
        let sinc = if t.abs() < 1e-6 {
            1.0
        } else {
            let x = std::f32::consts::PI * t;
            x.sin() / x
        };
        let window = 0.5 * (1.0 + (std::f32::consts::PI * t / HALF_WIDTH).cos());
        *tap = gain * sinc * window;
    }
}

/// One-pole damping whose cutoff closes as the ear falls into shadow. Unit
/// DC gain, so the per-direction normalization is preserved.
fn damp_shadowed(ir: &mut [f32], cos_incidence: f32, fs: f32) {
    let openness = (1.0 + cos_incidence) / 2.0;
    let cutoff_hz = 1500.0 + (0.45 * fs - 1500.0) * openness;
    let alpha = (-2.0 * std::f32::consts::PI * cutoff_hz / fs).exp();
    let mut y = 0.0f32;
    for tap in ir.iter_mut() {
        y = (1.0 - alpha) * *tap + alpha * y;
        *tap = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dc_gain(ir: &[f32]) -> f32 {
        ir.iter().sum()
    }

    #[test]
    fn test_grid_shape() {
        assert_eq!(ELEVATIONS.len(), AZIMUTH_COUNTS.len());
        assert_eq!(AZIMUTH_COUNTS[4], 72); // horizontal plane
        assert_eq!(*AZIMUTH_COUNTS.last().unwrap(), 1); // zenith
    }

    #[test]
    fn test_front_ir_has_unit_dc_gain() {
        let ir = synthesize_left_ir(0.0, 0.0);
        assert_eq!(ir.len(), IR_LEN);
        assert!((dc_gain(&ir) - 1.0).abs() < 0.05, "gain {}", dc_gain(&ir));
    }

    #[test]
    fn test_ipsilateral_louder_than_contralateral() {
        // Source hard right: the left ear is shadowed.
        let shadowed = synthesize_left_ir(0.0, 90.0);
        let open = synthesize_left_ir(0.0, 270.0);
        assert!(dc_gain(&open) > 3.0 * dc_gain(&shadowed));
    }

    #[test]
    fn test_shadowed_ear_arrives_later() {
        let onset = |ir: &[f32]| ir.iter().position(|v| v.abs() > 0.05).unwrap();
        let shadowed = synthesize_left_ir(0.0, 90.0);
        let open = synthesize_left_ir(0.0, 270.0);
        assert!(onset(&shadowed) > onset(&open));
    }

    #[test]
    fn test_every_grid_position_fits_the_window() {
        for (row, &elevation) in ELEVATIONS.iter().enumerate() {
            let count = AZIMUTH_COUNTS[row];
            for k in 0..count {
                let azimuth = k as f32 * 360.0 / count as f32;
                let ir = synthesize_left_ir(elevation, azimuth);
                assert!(ir.iter().all(|v| v.is_finite()));
                // The response must have fully decayed inside 128 taps.
                let tail: f32 = ir[IR_LEN - 8..].iter().map(|v| v.abs()).sum();
                assert!(tail < 1e-3, "tail energy {} at el {} az {}", tail, elevation, azimuth);
            }
        }
    }
}
