//! Direction-indexed HRTF database.
//!
//! Built once at context init: the KEMAR-layout grid from [`kemar`] is
//! synthesized at 44.1 kHz and, when the output rate differs, every impulse
//! response is resampled to it. Lookup snaps a listener-local direction to
//! the nearest elevation row, then the nearest azimuth in that row. Only one
//! ear is stored; the other ear reuses the response of the mirrored azimuth,
//! which makes `lookup(-az).left == lookup(az).right` exact.

pub mod kemar;

use rubato::Resampler;

use crate::error::{BinauraError, Result};
use crate::math::Direction;

/// Identifies one measurement position of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectionBin {
    pub elevation: usize,
    pub azimuth: usize,
}

struct ElevationRow {
    elevation_deg: f32,
    /// One stored-ear response per azimuth, uniformly spaced over [0, 360).
    irs: Vec<Vec<f32>>,
}

/// Process-wide read-only impulse response table.
pub struct HrtfDatabase {
    rows: Vec<ElevationRow>,
    ir_len: usize,
    sample_rate: u32,
}

impl HrtfDatabase {
    /// Builds the table for the given output rate.
    pub fn new(output_rate: u32) -> Result<Self> {
        let mut rows = Vec::with_capacity(kemar::ELEVATIONS.len());
        let mut ir_len = 0usize;
        for (row, &elevation_deg) in kemar::ELEVATIONS.iter().enumerate() {
            let count = kemar::AZIMUTH_COUNTS[row];
            let mut irs = Vec::with_capacity(count);
            for k in 0..count {
                let azimuth_deg = k as f32 * 360.0 / count as f32;
                let ir = kemar::synthesize_left_ir(elevation_deg, azimuth_deg);
                let ir = resample_ir(ir, output_rate)?;
                ir_len = ir.len();
                irs.push(ir);
            }
            rows.push(ElevationRow { elevation_deg, irs });
        }
        log::info!(
            "HRTF table ready: {} rows, {} taps per response at {} Hz",
            rows.len(),
            ir_len,
            output_rate
        );
        Ok(Self {
            rows,
            ir_len,
            sample_rate: output_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Response length in taps at the table's rate.
    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    /// Nearest measurement position for a listener-local direction.
    pub fn bin_for(&self, direction: Direction) -> DirectionBin {
        let elevation = self
            .rows
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.elevation_deg - direction.elevation_deg).abs();
                let db = (b.elevation_deg - direction.elevation_deg).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        let count = self.rows[elevation].irs.len();
        let step = 360.0 / count as f32;
        let azimuth = (direction.azimuth_deg / step).round() as usize % count;
        DirectionBin { elevation, azimuth }
    }

    /// Impulse responses `(left, right)` for a bin. The right ear is the
    /// stored response of the mirrored azimuth.
    pub fn impulse_responses(&self, bin: DirectionBin) -> (&[f32], &[f32]) {
        let row = &self.rows[bin.elevation];
        let count = row.irs.len();
        let mirrored = (count - bin.azimuth) % count;
        (&row.irs[bin.azimuth], &row.irs[mirrored])
    }
}

/// Resamples a synthesized response from the measurement rate to the output
/// rate. Identity when the rates match.
fn resample_ir(ir: Vec<f32>, output_rate: u32) -> Result<Vec<f32>> {
    if output_rate == kemar::MEASUREMENT_RATE {
        return Ok(ir);
    }

    let chunk = ir.len();
    let mut resampler = rubato::FftFixedIn::<f32>::new(
        kemar::MEASUREMENT_RATE as usize,
        output_rate as usize,
        chunk,
        2,
        1,
    )
    .map_err(|e| BinauraError::Allocation(format!("failed to create IR resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let target_len =
        (ir.len() as f64 * output_rate as f64 / kemar::MEASUREMENT_RATE as f64).round() as usize;

    let mut output = Vec::new();
    let mut input = ir;
    // Flush with zero chunks until the delayed tail is out.
    while output.len() < delay + target_len {
        input.resize(chunk, 0.0);
        let waves = resampler
            .process(&[std::mem::take(&mut input)], None)
            .map_err(|e| BinauraError::Allocation(format!("IR resampling failed: {}", e)))?;
        output.extend_from_slice(&waves[0]);
    }

    Ok(output[delay..delay + target_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    fn direction(azimuth_deg: f32, elevation_deg: f32) -> Direction {
        Direction {
            azimuth_deg: azimuth_deg.rem_euclid(360.0),
            elevation_deg,
        }
    }

    fn energy(ir: &[f32]) -> f32 {
        ir.iter().map(|v| v * v).sum()
    }

    #[test]
    fn test_native_rate_keeps_128_taps() {
        let db = HrtfDatabase::new(44100).unwrap();
        assert_eq!(db.ir_len(), kemar::IR_LEN);
    }

    #[test]
    fn test_resampled_length_scales() {
        let db = HrtfDatabase::new(22050).unwrap();
        assert_eq!(db.ir_len(), kemar::IR_LEN / 2);
        let db = HrtfDatabase::new(48000).unwrap();
        let expected = (kemar::IR_LEN as f64 * 48000.0 / 44100.0).round() as usize;
        assert_eq!(db.ir_len(), expected);
    }

    #[test]
    fn test_mirror_symmetry() {
        let db = HrtfDatabase::new(44100).unwrap();
        for az in [20.0f32, 45.0, 90.0, 135.0] {
            let (pos_left, pos_right) = db.impulse_responses(db.bin_for(direction(az, 0.0)));
            let (neg_left, neg_right) = db.impulse_responses(db.bin_for(direction(-az, 0.0)));
            assert_eq!(pos_left, neg_right, "left({}) != right(-{})", az, az);
            assert_eq!(pos_right, neg_left, "right({}) != left(-{})", az, az);
        }
    }

    #[test]
    fn test_median_plane_ears_match() {
        let db = HrtfDatabase::new(44100).unwrap();
        for az in [0.0f32, 180.0] {
            let (left, right) = db.impulse_responses(db.bin_for(direction(az, 0.0)));
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_lateral_source_favors_near_ear() {
        let db = HrtfDatabase::new(44100).unwrap();
        let (left, right) = db.impulse_responses(db.bin_for(direction(90.0, 0.0)));
        assert!(energy(right) > 4.0 * energy(left));
    }

    #[test]
    fn test_bin_snapping() {
        let db = HrtfDatabase::new(44100).unwrap();
        // Horizontal row has 72 azimuths, one every 5 degrees.
        let a = db.bin_for(direction(42.4, 1.0));
        let b = db.bin_for(direction(40.1, -3.0));
        assert_eq!(a, b);
        // Elevation snaps to the nearest 10 degree row, clamped at the ends.
        let low = db.bin_for(direction(0.0, -90.0));
        assert_eq!(low.elevation, 0);
        let top = db.bin_for(direction(0.0, 90.0));
        assert_eq!(top.elevation, kemar::ELEVATIONS.len() - 1);
        assert_eq!(top.azimuth, 0);
    }

    #[test]
    fn test_direction_from_local_vectors_agree_with_bins() {
        let db = HrtfDatabase::new(44100).unwrap();
        let right = db.bin_for(Direction::from_local(Vec3::new(1.0, 0.0, 0.0)));
        let left = db.bin_for(Direction::from_local(Vec3::new(-1.0, 0.0, 0.0)));
        let count = 72;
        assert_eq!(right.azimuth, count / 4);
        assert_eq!(left.azimuth, 3 * count / 4);
    }
}
