//! Voxel kinds and the per-voxel extraction policy

use serde::{Deserialize, Serialize};

/// TSDF voxels with weight at or below this are treated as unobserved
pub const TSDF_MIN_WEIGHT: f32 = 0.1;

/// Default TSDF acceptance band, in voxels
pub const TSDF_TRUNCATION_VOXELS: f32 = 4.0;

/// Pack RGB888 into the PCL "rgb" float layout (bits reinterpreted)
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Inverse of [`pack_rgb`]
pub fn unpack_rgb(packed: u32) -> (u8, u8, u8) {
    ((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
}

/// Which payload field a point cloud carries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    /// float32 scalar (distance, log odds, ...)
    Intensity,
    /// packed RGB, stored as the bits of a float32
    Rgb,
}

impl PayloadKind {
    /// Point cloud field name for the payload
    pub fn field_name(self) -> &'static str {
        match self {
            PayloadKind::Intensity => "intensity",
            PayloadKind::Rgb => "rgb",
        }
    }
}

/// What the extraction kernel sees of one voxel
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VoxelSample {
    /// Whether the voxel has received any measurement
    pub observed: bool,
    /// Field value the predicate and slices read
    pub value: f32,
    /// Payload bits written to the output record
    pub payload: u32,
}

/// Per-voxel acceptance test for point extraction
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "param")]
pub enum AcceptPredicate {
    /// Observed voxels
    Observed,
    /// Observed and |value| <= max
    WithinDistance(f32),
    /// Observed and value > threshold
    AboveValue(f32),
    /// Observed and value < threshold
    BelowValue(f32),
}

impl AcceptPredicate {
    pub fn accepts(&self, sample: &VoxelSample) -> bool {
        if !sample.observed {
            return false;
        }
        match *self {
            AcceptPredicate::Observed => true,
            AcceptPredicate::WithinDistance(max) => sample.value.abs() <= max,
            AcceptPredicate::AboveValue(threshold) => sample.value > threshold,
            AcceptPredicate::BelowValue(threshold) => sample.value < threshold,
        }
    }

    /// (mode, parameter) pair understood by the extraction shader
    pub fn to_gpu(&self) -> (u32, f32) {
        match *self {
            AcceptPredicate::Observed => (0, 0.0),
            AcceptPredicate::WithinDistance(max) => (1, max),
            AcceptPredicate::AboveValue(threshold) => (2, threshold),
            AcceptPredicate::BelowValue(threshold) => (3, threshold),
        }
    }
}

/// A voxel type the converter knows how to extract
pub trait ExtractableVoxel: Copy + Default + Send + Sync + 'static {
    /// Payload carried into point clouds
    const PAYLOAD: PayloadKind;

    /// Read the voxel as the kernels see it
    fn sample(&self, voxel_size: f32) -> VoxelSample;

    /// Predicate used when the caller does not supply one
    fn default_predicate(voxel_size: f32) -> AcceptPredicate;
}

/// Truncated signed distance voxel
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TsdfVoxel {
    pub distance: f32,
    pub weight: f32,
}

impl ExtractableVoxel for TsdfVoxel {
    const PAYLOAD: PayloadKind = PayloadKind::Intensity;

    fn sample(&self, _voxel_size: f32) -> VoxelSample {
        VoxelSample {
            observed: self.weight > TSDF_MIN_WEIGHT,
            value: self.distance,
            payload: self.distance.to_bits(),
        }
    }

    fn default_predicate(voxel_size: f32) -> AcceptPredicate {
        AcceptPredicate::WithinDistance(TSDF_TRUNCATION_VOXELS * voxel_size)
    }
}

/// Euclidean signed distance voxel
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EsdfVoxel {
    /// Squared distance to the nearest surface, in voxel units
    pub squared_distance_vox: f32,
    pub is_inside: bool,
    pub observed: bool,
}

impl EsdfVoxel {
    /// Signed metric distance
    pub fn distance(&self, voxel_size: f32) -> f32 {
        let d = voxel_size * self.squared_distance_vox.sqrt();
        if self.is_inside { -d } else { d }
    }
}

impl ExtractableVoxel for EsdfVoxel {
    const PAYLOAD: PayloadKind = PayloadKind::Intensity;

    fn sample(&self, voxel_size: f32) -> VoxelSample {
        let value = self.distance(voxel_size);
        VoxelSample {
            observed: self.observed,
            value,
            payload: value.to_bits(),
        }
    }

    fn default_predicate(_voxel_size: f32) -> AcceptPredicate {
        AcceptPredicate::Observed
    }
}

/// Log-odds occupancy voxel
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OccupancyVoxel {
    pub log_odds: f32,
}

impl ExtractableVoxel for OccupancyVoxel {
    const PAYLOAD: PayloadKind = PayloadKind::Intensity;

    fn sample(&self, _voxel_size: f32) -> VoxelSample {
        VoxelSample {
            observed: self.log_odds != 0.0,
            value: self.log_odds,
            payload: self.log_odds.to_bits(),
        }
    }

    fn default_predicate(_voxel_size: f32) -> AcceptPredicate {
        AcceptPredicate::AboveValue(0.0)
    }
}

/// Integrated color voxel
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColorVoxel {
    pub color: [u8; 3],
    pub weight: f32,
}

impl ExtractableVoxel for ColorVoxel {
    const PAYLOAD: PayloadKind = PayloadKind::Rgb;

    fn sample(&self, _voxel_size: f32) -> VoxelSample {
        VoxelSample {
            observed: self.weight > 0.0,
            value: self.weight,
            payload: pack_rgb(self.color[0], self.color[1], self.color[2]),
        }
    }

    fn default_predicate(_voxel_size: f32) -> AcceptPredicate {
        AcceptPredicate::Observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsdf_observation_threshold() {
        let unobserved = TsdfVoxel { distance: 0.01, weight: 0.05 };
        let observed = TsdfVoxel { distance: 0.01, weight: 1.0 };
        assert!(!unobserved.sample(0.05).observed);
        assert!(observed.sample(0.05).observed);
    }

    #[test]
    fn test_tsdf_default_predicate_band() {
        let voxel_size = 0.05;
        let predicate = TsdfVoxel::default_predicate(voxel_size);
        let near = TsdfVoxel { distance: -0.1, weight: 2.0 };
        let far = TsdfVoxel { distance: 0.5, weight: 2.0 };
        assert!(predicate.accepts(&near.sample(voxel_size)));
        assert!(!predicate.accepts(&far.sample(voxel_size)));
    }

    #[test]
    fn test_esdf_signed_distance() {
        let outside = EsdfVoxel { squared_distance_vox: 4.0, is_inside: false, observed: true };
        let inside = EsdfVoxel { squared_distance_vox: 9.0, is_inside: true, observed: true };
        assert!((outside.distance(0.1) - 0.2).abs() < 1e-6);
        assert!((inside.distance(0.1) + 0.3).abs() < 1e-6);
        assert_eq!(f32::from_bits(inside.sample(0.1).payload), inside.distance(0.1));
    }

    #[test]
    fn test_unobserved_never_accepted() {
        let sample = VoxelSample { observed: false, value: 0.0, payload: 0 };
        for predicate in [
            AcceptPredicate::Observed,
            AcceptPredicate::WithinDistance(1.0),
            AcceptPredicate::BelowValue(1.0),
        ] {
            assert!(!predicate.accepts(&sample));
        }
    }

    #[test]
    fn test_occupancy_default_is_occupied() {
        let predicate = OccupancyVoxel::default_predicate(0.1);
        assert!(predicate.accepts(&OccupancyVoxel { log_odds: 2.0 }.sample(0.1)));
        assert!(!predicate.accepts(&OccupancyVoxel { log_odds: -2.0 }.sample(0.1)));
    }

    #[test]
    fn test_rgb_packing() {
        let packed = pack_rgb(255, 128, 1);
        assert_eq!(packed, 0x00FF8001);
        assert_eq!(unpack_rgb(packed), (255, 128, 1));
        let voxel = ColorVoxel { color: [10, 20, 30], weight: 1.0 };
        assert_eq!(voxel.sample(0.1).payload, pack_rgb(10, 20, 30));
    }

    #[test]
    fn test_predicate_serde() {
        let json = serde_json::to_string(&AcceptPredicate::WithinDistance(0.2)).unwrap();
        let back: AcceptPredicate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AcceptPredicate::WithinDistance(0.2));
    }
}
