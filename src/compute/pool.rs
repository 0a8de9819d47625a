//! Device buffer pool for the wgpu stream

use crate::core::error::Error;

/// Storage buffer that grows on demand and never shrinks
pub struct GrowableBuffer {
    buffer: wgpu::Buffer,
    label: &'static str,
    usage: wgpu::BufferUsages,
    /// Element size in bytes
    stride: u64,
    /// Capacity in elements
    capacity: usize,
}

impl GrowableBuffer {
    /// Create with room for `capacity` elements (at least one)
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        usage: wgpu::BufferUsages,
        stride: u64,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: create(device, label, usage, stride * capacity as u64),
            label,
            usage,
            stride,
            capacity,
        }
    }

    /// Reallocate to hold `capacity` elements if needed.
    ///
    /// Grows to max(capacity, 2 × current). Contents are not preserved.
    /// Returns true when the buffer was replaced.
    pub fn ensure_capacity(
        &mut self,
        device: &wgpu::Device,
        limits: &wgpu::Limits,
        capacity: usize,
    ) -> Result<bool, Error> {
        if capacity <= self.capacity {
            return Ok(false);
        }
        let max_bytes = limits.max_buffer_size.min(limits.max_storage_buffer_binding_size as u64);
        let needed = capacity as u64 * self.stride;
        if needed > max_bytes {
            return Err(Error::Gpu(format!(
                "{} needs {}MB, device limit is {}MB",
                self.label,
                needed / 1024 / 1024,
                max_bytes / 1024 / 1024
            )));
        }
        let doubled = (self.capacity as u64 * 2 * self.stride).min(max_bytes) / self.stride;
        let new_capacity = capacity.max(doubled as usize);
        log::debug!("{} grown {} -> {} elements", self.label, self.capacity, new_capacity);
        self.buffer = create(device, self.label, self.usage, new_capacity as u64 * self.stride);
        self.capacity = new_capacity;
        Ok(true)
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size in bytes of `count` elements
    pub fn bytes(&self, count: usize) -> u64 {
        count as u64 * self.stride
    }
}

fn create(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

const STORAGE_IN: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE.union(wgpu::BufferUsages::COPY_DST);
const STORAGE_OUT: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);
const STAGING: wgpu::BufferUsages = wgpu::BufferUsages::MAP_READ.union(wgpu::BufferUsages::COPY_DST);

/// All device storage used by extraction and slicing
pub struct DeviceBufferPool {
    /// Selected block indices (vec4<i32> each)
    pub block_indices: GrowableBuffer,
    /// Packed voxels of the selected blocks
    pub voxels: GrowableBuffer,
    /// Payload buffer of point records
    pub points: GrowableBuffer,
    pub points_staging: GrowableBuffer,
    /// Single atomic<u32> count cell
    pub count: wgpu::Buffer,
    pub count_staging: wgpu::Buffer,
    /// Slice lookup table (one u32 per block column)
    pub slice_table: GrowableBuffer,
    pub slice_voxels: GrowableBuffer,
    /// One f32 per slice cell
    pub slice_output: GrowableBuffer,
    pub slice_staging: GrowableBuffer,
}

impl DeviceBufferPool {
    pub fn new(device: &wgpu::Device, initial_points: usize) -> Self {
        const RECORD: u64 = 16;
        const WORD: u64 = 4;
        let count = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("point_count"),
            size: WORD,
            usage: STORAGE_OUT,
            mapped_at_creation: false,
        });
        let count_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("point_count_staging"),
            size: WORD,
            usage: STAGING,
            mapped_at_creation: false,
        });
        Self {
            block_indices: GrowableBuffer::new(device, "block_indices", STORAGE_IN, RECORD, 1),
            voxels: GrowableBuffer::new(device, "block_voxels", STORAGE_IN, RECORD, 1),
            points: GrowableBuffer::new(device, "point_records", STORAGE_OUT, RECORD, initial_points),
            points_staging: GrowableBuffer::new(device, "point_records_staging", STAGING, RECORD, initial_points),
            count,
            count_staging,
            slice_table: GrowableBuffer::new(device, "slice_table", STORAGE_IN, WORD, 1),
            slice_voxels: GrowableBuffer::new(device, "slice_voxels", STORAGE_IN, RECORD, 1),
            slice_output: GrowableBuffer::new(device, "slice_output", STORAGE_OUT, WORD, 1),
            slice_staging: GrowableBuffer::new(device, "slice_staging", STAGING, WORD, 1),
        }
    }

    /// Grow the payload buffer and its staging copy together
    pub fn ensure_point_capacity(
        &mut self,
        device: &wgpu::Device,
        limits: &wgpu::Limits,
        capacity: usize,
    ) -> Result<(), Error> {
        self.points.ensure_capacity(device, limits, capacity)?;
        let matched = self.points.capacity();
        self.points_staging.ensure_capacity(device, limits, matched)?;
        Ok(())
    }
}
