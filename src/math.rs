//! Math types for binaura.
//!
//! Coordinates are right-handed with Y up, distances in meters. The listener
//! orientation is a forward unit vector; the ear axis is derived from it and
//! world-up.

pub use glam::Vec3;

/// Orthonormal listener basis derived from a forward vector and world-up.
#[derive(Debug, Clone, Copy)]
pub struct ListenerFrame {
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
}

impl ListenerFrame {
    /// Builds the frame from a forward vector. A forward vector parallel to
    /// world-up falls back to the default frame.
    pub fn from_forward(forward: Vec3) -> Self {
        let forward = forward.normalize_or_zero();
        if forward == Vec3::ZERO {
            return Self::default();
        }
        let right = forward.cross(Vec3::Y);
        if right.length_squared() < 1e-8 {
            return Self::default();
        }
        let right = right.normalize();
        let up = right.cross(forward);
        Self { right, up, forward }
    }

    /// Expresses a world-space vector in listener-local coordinates
    /// (x = right, y = up, z = forward).
    pub fn to_local(&self, v: Vec3) -> Vec3 {
        Vec3::new(v.dot(self.right), v.dot(self.up), v.dot(self.forward))
    }
}

impl Default for ListenerFrame {
    fn default() -> Self {
        Self {
            right: Vec3::X,
            up: Vec3::Y,
            forward: Vec3::NEG_Z,
        }
    }
}

/// Spherical direction in the listener frame: elevation from the horizontal
/// plane, azimuth clockwise from straight ahead toward the right ear. Degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction {
    pub azimuth_deg: f32,
    pub elevation_deg: f32,
}

impl Direction {
    /// Converts a listener-local unit direction to spherical angles.
    /// Azimuth is normalized to [0, 360).
    pub fn from_local(dir: Vec3) -> Self {
        let elevation_deg = dir.y.clamp(-1.0, 1.0).asin().to_degrees();
        let mut azimuth_deg = dir.x.atan2(dir.z).to_degrees();
        if azimuth_deg < 0.0 {
            azimuth_deg += 360.0;
        }
        Self {
            azimuth_deg,
            elevation_deg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_frame_right_handed() {
        let frame = ListenerFrame::default();
        assert_eq!(frame.right, Vec3::X);
        assert_eq!(frame.up, Vec3::Y);
        assert_eq!(frame.forward, Vec3::NEG_Z);
    }

    #[test]
    fn test_frame_from_forward_keeps_world_up() {
        let frame = ListenerFrame::from_forward(Vec3::new(1.0, 0.0, 0.0));
        assert!((frame.right - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-6);
        assert!((frame.up - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_degenerate_forward_falls_back() {
        let frame = ListenerFrame::from_forward(Vec3::Y);
        assert_eq!(frame.forward, Vec3::NEG_Z);
        let frame = ListenerFrame::from_forward(Vec3::ZERO);
        assert_eq!(frame.forward, Vec3::NEG_Z);
    }

    #[test]
    fn test_to_local_maps_source_on_the_right() {
        let frame = ListenerFrame::default();
        let local = frame.to_local(Vec3::new(1.0, 0.0, 0.0));
        assert!((local - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn test_direction_angles() {
        let ahead = Direction::from_local(Vec3::new(0.0, 0.0, 1.0));
        assert!(ahead.azimuth_deg.abs() < 1e-4);
        assert!(ahead.elevation_deg.abs() < 1e-4);

        let right = Direction::from_local(Vec3::new(1.0, 0.0, 0.0));
        assert!((right.azimuth_deg - 90.0).abs() < 1e-4);

        let left = Direction::from_local(Vec3::new(-1.0, 0.0, 0.0));
        assert!((left.azimuth_deg - 270.0).abs() < 1e-4);

        let above = Direction::from_local(Vec3::new(0.0, 1.0, 0.0));
        assert!((above.elevation_deg - 90.0).abs() < 1e-4);
    }
}
