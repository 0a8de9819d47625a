//! wgpu compute stream.
//!
//! Launches record upload, dispatch and staging copies into one submission.
//! `synchronize` waits on the device; reads then map the staging buffers.

use super::context::ComputeContext;
use super::pool::DeviceBufferPool;
use super::stream::ComputeStream;
use super::upload::{
    BlockUpload, ExtractUniform, ExtractionParams, PointRecord, SliceParams, SliceUniform, SliceUpload,
};
use crate::core::error::Error;
use crate::core::Result;

/// Threads per extraction workgroup, must match `extract_points.wgsl`
const EXTRACT_WORKGROUP_SIZE: u32 = 256;
/// Slice workgroup edge, must match `distance_slice.wgsl`
const SLICE_WORKGROUP_EDGE: u32 = 8;

/// Split a 1-D workgroup count into a 2-D grid under the per-dimension limit.
/// Returns (groups_x, groups_y).
pub fn dispatch_grid(groups: u32, max_per_dim: u32) -> (u32, u32) {
    if groups == 0 {
        return (0, 0);
    }
    let x = groups.min(max_per_dim);
    (x, groups.div_ceil(x))
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compute pipeline with its uniform buffer
struct Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
}

impl Kernel {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        source: &'static str,
        entries: &[wgpu::BindGroupLayoutEntry],
        params_size: u64,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: params_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            pipeline,
            layout,
            params,
        }
    }
}

/// What the last submission left in the staging buffers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Staged {
    Nothing,
    /// Count plus `records` payload records
    Points { records: usize },
    /// `cells` slice values
    Slice { cells: usize },
}

/// In-order stream on a wgpu queue
pub struct GpuStream {
    context: ComputeContext,
    pool: DeviceBufferPool,
    extract: Kernel,
    slice: Kernel,
    staged: Staged,
    submitted: Option<wgpu::SubmissionIndex>,
}

impl GpuStream {
    pub fn new(context: ComputeContext, initial_capacity: usize) -> Self {
        let device = &context.device;
        let extract = Kernel::new(
            device,
            "extract_points",
            include_str!("../../shaders/extract_points.wgsl"),
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
            std::mem::size_of::<ExtractUniform>() as u64,
        );
        let slice = Kernel::new(
            device,
            "distance_slice",
            include_str!("../../shaders/distance_slice.wgsl"),
            &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
            std::mem::size_of::<SliceUniform>() as u64,
        );
        let pool = DeviceBufferPool::new(device, initial_capacity);
        Self {
            context,
            pool,
            extract,
            slice,
            staged: Staged::Nothing,
            submitted: None,
        }
    }

    /// Create a device and stream, blocking on adapter selection
    pub fn new_blocking(initial_capacity: usize) -> Result<Self> {
        Ok(Self::new(ComputeContext::new_blocking()?, initial_capacity))
    }

    /// Run `record` inside validation and out-of-memory error scopes.
    ///
    /// A device error fails this launch only; nothing is left staged.
    fn with_error_scope(
        &mut self,
        stage: &str,
        record: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let out_of_memory = self.context.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.context.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = record(self);
        let validation = pollster::block_on(validation.pop());
        let out_of_memory = pollster::block_on(out_of_memory.pop());

        let result = match validation.or(out_of_memory) {
            Some(e) => Err(Error::Gpu(format!("{} launch failed: {}", stage, e))),
            None => result,
        };
        if result.is_err() {
            self.staged = Staged::Nothing;
        }
        result
    }

    fn map_read(&self, slice: wgpu::BufferSlice<'_>) -> Result<()> {
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context.wait_idle()?;
        rx.recv()
            .map_err(|_| Error::Gpu("map callback dropped".into()))?
            .map_err(|e| Error::Gpu(format!("Buffer map failed: {:?}", e)))
    }

    fn submit(&mut self, encoder: wgpu::CommandEncoder, staged: Staged) {
        self.submitted = Some(self.context.queue.submit(std::iter::once(encoder.finish())));
        self.staged = staged;
    }

    fn record_point_extraction(&mut self, upload: BlockUpload, params: &ExtractionParams) -> Result<()> {
        let block_count = upload.block_count();
        let bound = upload.max_points();
        if self.pool.points.capacity() < bound {
            return Err(Error::Stream(format!(
                "payload buffer holds {} records, launch needs {}",
                self.pool.points.capacity(),
                bound
            )));
        }
        let device = &self.context.device;
        let limits = &self.context.limits;
        self.pool.block_indices.ensure_capacity(device, limits, block_count)?;
        self.pool.voxels.ensure_capacity(device, limits, upload.voxels.len())?;

        let groups = (bound as u32).div_ceil(EXTRACT_WORKGROUP_SIZE);
        let (groups_x, groups_y) = dispatch_grid(groups, limits.max_compute_workgroups_per_dimension);
        let uniform = ExtractUniform::new(
            params,
            block_count as u32,
            self.pool.points.capacity() as u32,
            groups_x * EXTRACT_WORKGROUP_SIZE,
        );

        let queue = &self.context.queue;
        queue.write_buffer(&self.extract.params, 0, bytemuck::bytes_of(&uniform));
        if block_count > 0 {
            queue.write_buffer(self.pool.block_indices.buffer(), 0, bytemuck::cast_slice(&upload.indices));
            queue.write_buffer(self.pool.voxels.buffer(), 0, bytemuck::cast_slice(&upload.voxels));
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("extract_points_bind_group"),
            layout: &self.extract.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.extract.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.pool.block_indices.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.pool.voxels.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.pool.points.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.pool.count.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("extract_points_encoder"),
        });
        encoder.clear_buffer(&self.pool.count, 0, None);
        if groups > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("extract_points_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.extract.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&self.pool.count, 0, &self.pool.count_staging, 0, 4);
        encoder.copy_buffer_to_buffer(
            self.pool.points.buffer(),
            0,
            self.pool.points_staging.buffer(),
            0,
            self.pool.points.bytes(bound.max(1)),
        );
        self.submit(encoder, Staged::Points { records: bound });
        log::trace!(
            "Extraction launched: {} blocks, {}x{} workgroups",
            block_count,
            groups_x,
            groups_y
        );
        Ok(())
    }

    fn record_slice(&mut self, upload: SliceUpload, params: &SliceParams) -> Result<()> {
        let cells = params.cell_count();
        let device = &self.context.device;
        let limits = &self.context.limits;
        self.pool.slice_table.ensure_capacity(device, limits, upload.table.len())?;
        self.pool.slice_voxels.ensure_capacity(device, limits, upload.voxels.len())?;
        self.pool.slice_output.ensure_capacity(device, limits, cells)?;
        self.pool.slice_staging.ensure_capacity(device, limits, cells)?;

        let uniform = SliceUniform::new(params, &upload);
        let queue = &self.context.queue;
        queue.write_buffer(&self.slice.params, 0, bytemuck::bytes_of(&uniform));
        if !upload.table.is_empty() {
            queue.write_buffer(self.pool.slice_table.buffer(), 0, bytemuck::cast_slice(&upload.table));
        }
        if !upload.voxels.is_empty() {
            queue.write_buffer(self.pool.slice_voxels.buffer(), 0, bytemuck::cast_slice(&upload.voxels));
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("distance_slice_bind_group"),
            layout: &self.slice.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.slice.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.pool.slice_table.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.pool.slice_voxels.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.pool.slice_output.buffer().as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("distance_slice_encoder"),
        });
        if cells > 0 {
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("distance_slice_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.slice.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(
                    params.width.div_ceil(SLICE_WORKGROUP_EDGE),
                    params.rows.div_ceil(SLICE_WORKGROUP_EDGE),
                    1,
                );
            }
            encoder.copy_buffer_to_buffer(
                self.pool.slice_output.buffer(),
                0,
                self.pool.slice_staging.buffer(),
                0,
                self.pool.slice_output.bytes(cells),
            );
        }
        self.submit(encoder, Staged::Slice { cells });
        Ok(())
    }
}

impl ComputeStream for GpuStream {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn ensure_point_capacity(&mut self, capacity: usize) -> Result<()> {
        self.with_error_scope("payload growth", |stream| {
            stream
                .pool
                .ensure_point_capacity(&stream.context.device, &stream.context.limits, capacity)
        })
    }

    fn point_capacity(&self) -> usize {
        self.pool.points.capacity()
    }

    fn launch_point_extraction(&mut self, upload: BlockUpload, params: &ExtractionParams) -> Result<()> {
        self.with_error_scope("point extraction", |stream| stream.record_point_extraction(upload, params))
    }

    fn launch_slice(&mut self, upload: SliceUpload, params: &SliceParams) -> Result<()> {
        self.with_error_scope("slice", |stream| stream.record_slice(upload, params))
    }

    fn synchronize(&mut self) -> Result<()> {
        if self.submitted.take().is_some() {
            self.context.wait_idle()?;
        }
        Ok(())
    }

    fn read_point_count(&mut self) -> Result<usize> {
        let Staged::Points { records } = self.staged else {
            return Err(Error::Stream("no extraction has been launched".into()));
        };
        let slice = self.pool.count_staging.slice(..);
        self.map_read(slice)?;
        let count = {
            let data = slice.get_mapped_range();
            u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize
        };
        self.pool.count_staging.unmap();

        if count > records {
            log::warn!("Extraction count {} exceeds bound {}", count, records);
        }
        Ok(count.min(records))
    }

    fn read_points(&mut self, count: usize, out: &mut Vec<PointRecord>) -> Result<()> {
        out.clear();
        if count == 0 {
            return Ok(());
        }
        let staging = self.pool.points_staging.buffer();
        let slice = staging.slice(..self.pool.points_staging.bytes(count));
        self.map_read(slice)?;
        {
            let data = slice.get_mapped_range();
            out.extend_from_slice(bytemuck::cast_slice::<u8, PointRecord>(&data));
        }
        staging.unmap();
        Ok(())
    }

    fn read_slice(&mut self, out: &mut Vec<f32>) -> Result<()> {
        let Staged::Slice { cells } = self.staged else {
            return Err(Error::Stream("no slice has been launched".into()));
        };
        out.clear();
        if cells == 0 {
            return Ok(());
        }
        let staging = self.pool.slice_staging.buffer();
        let slice = staging.slice(..self.pool.slice_staging.bytes(cells));
        self.map_read(slice)?;
        {
            let data = slice.get_mapped_range();
            out.extend_from_slice(bytemuck::cast_slice::<u8, f32>(&data));
        }
        staging.unmap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::upload::GpuVoxel;
    use crate::math::Aabb;
    use crate::voxel::index::VOXELS_PER_BLOCK;
    use crate::voxel::voxel::AcceptPredicate;

    #[test]
    fn test_dispatch_grid_within_limit() {
        assert_eq!(dispatch_grid(0, 65535), (0, 0));
        assert_eq!(dispatch_grid(10, 65535), (10, 1));
        let (x, y) = dispatch_grid(200_000, 65535);
        assert_eq!(x, 65535);
        assert!(x as u64 * y as u64 >= 200_000);
        assert!(y <= 65535);
    }

    #[test]
    fn test_records_per_block_fill_whole_workgroups() {
        assert_eq!(VOXELS_PER_BLOCK as u32 % EXTRACT_WORKGROUP_SIZE, 0);
    }

    #[test]
    fn test_device_error_fails_only_its_launch() {
        crate::core::logging::try_init();
        let mut stream = match GpuStream::new_blocking(0) {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("Skipping GPU test: {}", e);
                return;
            }
        };

        let result = stream.with_error_scope("oversized buffer", |s| {
            let _buffer = s.context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("oversized"),
                size: s.context.limits.max_buffer_size.saturating_add(4),
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            });
            Ok(())
        });
        assert!(matches!(result, Err(Error::Gpu(_))), "{result:?}");

        let upload = BlockUpload {
            indices: vec![[0, 0, 0, 0]],
            voxels: vec![
                GpuVoxel {
                    value: 0.0,
                    payload: 0,
                    observed: 1,
                    _pad: 0,
                };
                VOXELS_PER_BLOCK
            ],
        };
        let params = ExtractionParams {
            aabb: Aabb::infinite(),
            predicate: AcceptPredicate::Observed,
            voxel_size: 0.1,
            block_size: 0.8,
        };
        stream.ensure_point_capacity(VOXELS_PER_BLOCK).unwrap();
        stream.launch_point_extraction(upload, &params).unwrap();
        stream.synchronize().unwrap();
        assert_eq!(stream.read_point_count().unwrap(), VOXELS_PER_BLOCK);
    }
}
