//! Distance attenuation and Doppler shift.

use crate::math::Vec3;

/// Attenuation curve over distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttenuationCurve {
    /// `ref / (ref + rolloff * (r - ref))`
    Inverse,
    /// `1 - rolloff * (r - ref) / (max - ref)`
    Linear,
    /// `(r / ref) ^ -rolloff`
    Exponential,
}

/// Pure distance/velocity to (gain, pitch factor) mapping.
#[derive(Debug, Clone, Copy)]
pub struct DistanceModel {
    pub curve: AttenuationCurve,
    /// Distance below which no attenuation is applied, in meters.
    pub reference: f32,
    pub rolloff: f32,
    /// Distance beyond which attenuation stops changing, in meters.
    pub max_distance: f32,
    /// Speed of sound for the Doppler factor, in m/s.
    pub speed_of_sound: f32,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self {
            curve: AttenuationCurve::Inverse,
            reference: 1.0,
            rolloff: 1.0,
            max_distance: 100.0,
            speed_of_sound: 343.0,
        }
    }
}

impl DistanceModel {
    /// Gain for a source at distance `r` meters. Monotonically non-increasing
    /// beyond the reference distance, in [0, 1].
    pub fn gain(&self, r: f32) -> f32 {
        let r = r.clamp(self.reference, self.max_distance);
        let g = match self.curve {
            AttenuationCurve::Inverse => {
                self.reference / (self.reference + self.rolloff * (r - self.reference))
            }
            AttenuationCurve::Linear => {
                if self.max_distance <= self.reference {
                    1.0
                } else {
                    1.0 - self.rolloff * (r - self.reference) / (self.max_distance - self.reference)
                }
            }
            AttenuationCurve::Exponential => (r / self.reference).powf(-self.rolloff),
        };
        g.clamp(0.0, 1.0)
    }

    /// Doppler pitch factor `(c - v_l . d) / (c - v_s . d)` with `d` the unit
    /// vector from the source to the listener. Clamped to [0.1, 10] so
    /// degenerate velocities cannot blow up the resampler.
    pub fn doppler(&self, source_to_listener: Vec3, listener_vel: Vec3, source_vel: Vec3) -> f32 {
        let d = source_to_listener.normalize_or_zero();
        if d == Vec3::ZERO {
            return 1.0;
        }
        let c = self.speed_of_sound;
        let denom = c - source_vel.dot(d);
        if denom.abs() < 1e-3 {
            return 10.0;
        }
        ((c - listener_vel.dot(d)) / denom).clamp(0.1, 10.0)
    }

    /// Combined evaluation for a source at `rel_pos = source - listener`.
    pub fn evaluate(&self, rel_pos: Vec3, listener_vel: Vec3, source_vel: Vec3) -> (f32, f32) {
        let gain = self.gain(rel_pos.length());
        let pitch = self.doppler(-rel_pos, listener_vel, source_vel);
        (gain, pitch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(curve: AttenuationCurve) -> DistanceModel {
        DistanceModel {
            curve,
            ..DistanceModel::default()
        }
    }

    #[test]
    fn test_no_attenuation_inside_reference() {
        for curve in [
            AttenuationCurve::Inverse,
            AttenuationCurve::Linear,
            AttenuationCurve::Exponential,
        ] {
            let m = model(curve);
            assert!((m.gain(0.0) - 1.0).abs() < 1e-6);
            assert!((m.gain(0.5) - 1.0).abs() < 1e-6);
            assert!((m.gain(1.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_gain_monotonically_non_increasing() {
        for curve in [
            AttenuationCurve::Inverse,
            AttenuationCurve::Linear,
            AttenuationCurve::Exponential,
        ] {
            let m = model(curve);
            let mut prev = 1.0f32;
            let mut r = 1.0f32;
            while r < 150.0 {
                let g = m.gain(r);
                assert!(
                    g <= prev + 1e-6,
                    "{:?} not monotonic at r={}: {} > {}",
                    curve,
                    r,
                    g,
                    prev
                );
                assert!((0.0..=1.0).contains(&g));
                prev = g;
                r += 0.73;
            }
        }
    }

    #[test]
    fn test_gain_freezes_past_max_distance() {
        for curve in [
            AttenuationCurve::Inverse,
            AttenuationCurve::Linear,
            AttenuationCurve::Exponential,
        ] {
            let m = model(curve);
            assert!((m.gain(100.0) - m.gain(1000.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_doppler_approaching_source_raises_pitch() {
        let m = DistanceModel {
            speed_of_sound: 340.0,
            ..DistanceModel::default()
        };
        // Source 5 m ahead, moving straight at the listener at 10 m/s.
        let rel = Vec3::new(0.0, 0.0, -5.0);
        let (_, pitch) = m.evaluate(rel, Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0));
        assert!((pitch - 340.0 / 330.0).abs() < 1e-4);
    }

    #[test]
    fn test_doppler_receding_source_lowers_pitch() {
        let m = DistanceModel {
            speed_of_sound: 340.0,
            ..DistanceModel::default()
        };
        let rel = Vec3::new(0.0, 0.0, -5.0);
        let (_, pitch) = m.evaluate(rel, Vec3::ZERO, Vec3::new(0.0, 0.0, -10.0));
        assert!((pitch - 340.0 / 350.0).abs() < 1e-4);
    }

    #[test]
    fn test_doppler_static_is_unity() {
        let m = DistanceModel::default();
        let (_, pitch) = m.evaluate(Vec3::new(3.0, 1.0, -2.0), Vec3::ZERO, Vec3::ZERO);
        assert!((pitch - 1.0).abs() < 1e-6);
        // Degenerate geometry falls back to unity as well.
        assert!((m.doppler(Vec3::ZERO, Vec3::X, Vec3::Y) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_doppler_clamped() {
        let m = DistanceModel {
            speed_of_sound: 340.0,
            ..DistanceModel::default()
        };
        let rel = Vec3::new(0.0, 0.0, -5.0);
        let (_, pitch) = m.evaluate(rel, Vec3::ZERO, Vec3::new(0.0, 0.0, 339.9999));
        assert!(pitch <= 10.0);
    }
}
