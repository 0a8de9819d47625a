//! Point readback and PointCloud2 marshaling

use layercast_msgs::{PointCloud2, PointField};

use crate::compute::stream::ComputeStream;
use crate::compute::upload::PointRecord;
use crate::core::Result;
use crate::voxel::voxel::PayloadKind;

/// Bytes per point in the marshaled cloud
pub const POINT_STEP: u32 = std::mem::size_of::<PointRecord>() as u32;

/// Wait for the stream, then copy exactly the emitted records.
///
/// `bound` is the conservative capacity the launch was sized for.
pub fn read_back_points(stream: &mut dyn ComputeStream, bound: usize) -> Result<Vec<PointRecord>> {
    stream.synchronize()?;
    let count = stream.read_point_count()?;
    debug_assert!(count <= bound, "count {} exceeds bound {}", count, bound);
    let mut records = Vec::new();
    stream.read_points(count.min(bound), &mut records)?;
    log::trace!("Read back {} of at most {} points", records.len(), bound);
    Ok(records)
}

/// x, y, z plus the payload field, all float32
pub fn point_fields(payload: PayloadKind) -> Vec<PointField> {
    vec![
        PointField::float32("x", 0),
        PointField::float32("y", 4),
        PointField::float32("z", 8),
        PointField::float32(payload.field_name(), 12),
    ]
}

/// Resize `cloud` to `records.len()` points and write them field by field
pub fn fill_point_cloud(records: &[PointRecord], payload: PayloadKind, cloud: &mut PointCloud2) {
    let count = records.len() as u32;
    cloud.height = 1;
    cloud.width = count;
    cloud.fields = point_fields(payload);
    cloud.is_bigendian = false;
    cloud.point_step = POINT_STEP;
    cloud.row_step = POINT_STEP * count;
    cloud.is_dense = true;

    cloud.data.clear();
    cloud.data.reserve(records.len() * POINT_STEP as usize);
    for record in records {
        cloud.data.extend_from_slice(&record.x.to_le_bytes());
        cloud.data.extend_from_slice(&record.y.to_le_bytes());
        cloud.data.extend_from_slice(&record.z.to_le_bytes());
        cloud.data.extend_from_slice(&record.payload.to_le_bytes());
    }
}

/// Build a fresh cloud from records
pub fn point_cloud_from_records(records: &[PointRecord], payload: PayloadKind) -> PointCloud2 {
    let mut cloud = PointCloud2::default();
    fill_point_cloud(records, payload, &mut cloud);
    cloud
}

/// Decode the records of a cloud written by [`fill_point_cloud`]
pub fn records_from_point_cloud(cloud: &PointCloud2) -> Vec<PointRecord> {
    let word = |bytes: &[u8], at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    cloud
        .data
        .chunks_exact(cloud.point_step.max(1) as usize)
        .filter(|chunk| chunk.len() >= POINT_STEP as usize)
        .map(|chunk| PointRecord {
            x: f32::from_bits(word(chunk, 0)),
            y: f32::from_bits(word(chunk, 4)),
            z: f32::from_bits(word(chunk, 8)),
            payload: word(chunk, 12),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::voxel::pack_rgb;
    use glam::Vec3;

    #[test]
    fn test_empty_cloud_is_valid() {
        let cloud = point_cloud_from_records(&[], PayloadKind::Intensity);
        assert_eq!(cloud.width, 0);
        assert_eq!(cloud.height, 1);
        assert_eq!(cloud.row_step, 0);
        assert!(cloud.data.is_empty());
        assert_eq!(cloud.fields.len(), 4);
    }

    #[test]
    fn test_layout_and_fields() {
        let records = [
            PointRecord::new(Vec3::new(1.0, 2.0, 3.0), 0.5f32.to_bits()),
            PointRecord::new(Vec3::new(-1.0, 0.0, 4.0), 0.25f32.to_bits()),
        ];
        let cloud = point_cloud_from_records(&records, PayloadKind::Intensity);
        assert_eq!(cloud.width, 2);
        assert_eq!(cloud.point_step, 16);
        assert_eq!(cloud.row_step, 32);
        assert_eq!(cloud.data.len(), 32);
        assert_eq!(cloud.field("intensity").unwrap().offset, 12);
        assert_eq!(records_from_point_cloud(&cloud), records.to_vec());
    }

    #[test]
    fn test_rgb_payload_keeps_bits() {
        let packed = pack_rgb(255, 0, 128);
        let cloud = point_cloud_from_records(&[PointRecord::new(Vec3::ZERO, packed)], PayloadKind::Rgb);
        assert!(cloud.field("rgb").is_some());
        assert_eq!(&cloud.data[12..16], &packed.to_le_bytes());
    }

    #[test]
    fn test_refill_shrinks_destination() {
        let records = vec![PointRecord::default(); 5];
        let mut cloud = point_cloud_from_records(&records, PayloadKind::Intensity);
        fill_point_cloud(&records[..2], PayloadKind::Intensity, &mut cloud);
        assert_eq!(cloud.width, 2);
        assert_eq!(cloud.data.len(), 32);
    }
}
