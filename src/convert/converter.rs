//! Layer conversion facade.
//!
//! A `LayerConverter` owns one compute stream and its buffer pool. Every
//! call runs selection, upload, one kernel launch, a single blocking
//! synchronize and readback, then marshals the output message.

use glam::Vec2;
use layercast_msgs::{CameraInfo, DistanceMapSlice, Image, Mesh, MeshBlock as MeshBlockMsg, PointCloud2};

use super::{image, mesh, points, selector, slice};
use crate::compute::cpu::CpuStream;
use crate::compute::gpu::GpuStream;
use crate::compute::stream::ComputeStream;
use crate::compute::upload::{ExtractionParams, SliceParams};
use crate::core::config::{BackendKind, ConverterConfig};
use crate::core::Result;
use crate::math::Aabb;
use crate::sensor::camera::Camera;
use crate::sensor::frame::{ColorImage, DepthImage};
use crate::voxel::index::BlockIndex;
use crate::voxel::layer::{MeshLayer, VoxelBlockLayer};
use crate::voxel::mesh::MeshBlock;
use crate::voxel::voxel::{AcceptPredicate, ExtractableVoxel};

/// Converts voxel layers into point clouds, slices and meshes.
///
/// Methods take `&mut self`: one call at a time per converter.
pub struct LayerConverter {
    stream: Box<dyn ComputeStream>,
    config: ConverterConfig,
}

impl LayerConverter {
    /// Create a converter on the backend named in `config`.
    ///
    /// `BackendKind::Auto` tries the GPU first and falls back to the CPU.
    pub fn new(config: ConverterConfig) -> Result<Self> {
        let stream: Box<dyn ComputeStream> = match config.backend {
            BackendKind::Cpu => Box::new(Self::cpu_stream(&config)?),
            BackendKind::Gpu => Box::new(GpuStream::new_blocking(config.initial_point_capacity)?),
            BackendKind::Auto => match GpuStream::new_blocking(config.initial_point_capacity) {
                Ok(gpu) => Box::new(gpu),
                Err(e) => {
                    log::warn!("GPU backend unavailable ({}), using CPU stream", e);
                    Box::new(Self::cpu_stream(&config)?)
                }
            },
        };
        log::info!("Layer converter using {} backend", stream.name());
        Ok(Self { stream, config })
    }

    /// Converter on the CPU stream with default settings
    pub fn new_cpu() -> Result<Self> {
        Self::new(ConverterConfig::default())
    }

    /// Converter on an existing stream
    pub fn with_stream(stream: Box<dyn ComputeStream>, config: ConverterConfig) -> Self {
        Self { stream, config }
    }

    fn cpu_stream(config: &ConverterConfig) -> Result<CpuStream> {
        CpuStream::new(config.cpu_threads, config.initial_point_capacity)
    }

    pub fn backend_name(&self) -> &'static str {
        self.stream.name()
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Payload buffer capacity in records
    pub fn point_capacity(&self) -> usize {
        self.stream.point_capacity()
    }

    // ---- Point clouds ----

    /// Every voxel of the layer accepted by the kind's default predicate
    pub fn point_cloud_from_layer<V: ExtractableVoxel>(&mut self, layer: &VoxelBlockLayer<V>) -> Result<PointCloud2> {
        let predicate = V::default_predicate(layer.voxel_size());
        self.point_cloud_with_predicate(layer, None, predicate)
    }

    /// Accepted voxels whose centers lie inside `aabb`
    pub fn point_cloud_from_layer_in_aabb<V: ExtractableVoxel>(
        &mut self,
        layer: &VoxelBlockLayer<V>,
        aabb: &Aabb,
    ) -> Result<PointCloud2> {
        let predicate = V::default_predicate(layer.voxel_size());
        self.point_cloud_with_predicate(layer, Some(aabb), predicate)
    }

    /// Extraction with an explicit predicate; `None` means no bounds
    pub fn point_cloud_with_predicate<V: ExtractableVoxel>(
        &mut self,
        layer: &VoxelBlockLayer<V>,
        aabb: Option<&Aabb>,
        predicate: AcceptPredicate,
    ) -> Result<PointCloud2> {
        let indices = selector::select_blocks(layer, aabb);
        if indices.is_empty() {
            log::debug!("Point cloud: no blocks selected");
            return Ok(points::point_cloud_from_records(&[], V::PAYLOAD));
        }

        let upload = selector::upload_blocks(layer, &indices);
        let bound = upload.max_points();
        self.stream.ensure_point_capacity(bound)?;

        let params = ExtractionParams {
            aabb: aabb.copied().unwrap_or_else(Aabb::infinite),
            predicate,
            voxel_size: layer.voxel_size(),
            block_size: layer.block_size(),
        };
        self.stream.launch_point_extraction(upload, &params)?;
        let records = points::read_back_points(self.stream.as_mut(), bound)?;

        log::debug!(
            "Point cloud: {} blocks, {} of {} voxels accepted",
            indices.len(),
            records.len(),
            bound
        );
        Ok(points::point_cloud_from_records(&records, V::PAYLOAD))
    }

    // ---- Distance slices ----

    /// Horizontal slice at `height` over the xy extent of `aabb`
    pub fn distance_map_slice_in_aabb<V: ExtractableVoxel>(
        &mut self,
        layer: &VoxelBlockLayer<V>,
        aabb: &Aabb,
        height: f32,
        resolution: f32,
    ) -> Result<DistanceMapSlice> {
        let unknown_value = self.config.slice_unknown_value;
        let grid = slice::SliceGrid::new(aabb, resolution);
        if grid.is_empty() {
            log::debug!("Slice: degenerate extent, empty grid");
            return Ok(slice::slice_message(&grid, height, unknown_value, Vec::new()));
        }

        let cells = grid.checked_cell_count(self.config.max_slice_cells)?;

        let upload = slice::build_slice_upload(layer, &grid, height);
        let params = SliceParams {
            origin: grid.origin,
            resolution: grid.resolution,
            height,
            width: grid.width,
            rows: grid.rows,
            voxel_z: slice::slice_voxel_z(height, layer.voxel_size()),
            voxel_size: layer.voxel_size(),
            unknown_value,
            interpolation: self.config.slice_interpolation,
        };
        self.stream.launch_slice(upload, &params)?;
        let data = slice::read_back_slice(self.stream.as_mut(), cells)?;

        log::debug!("Slice: {}x{} cells at z={}", grid.width, grid.rows, height);
        Ok(slice::slice_message(&grid, height, unknown_value, data))
    }

    /// Slice over the allocated extent at voxel resolution
    pub fn distance_map_slice_from_layer<V: ExtractableVoxel>(
        &mut self,
        layer: &VoxelBlockLayer<V>,
        height: f32,
    ) -> Result<DistanceMapSlice> {
        match layer.allocated_aabb() {
            Some(aabb) => self.distance_map_slice_in_aabb(layer, &aabb, height, layer.voxel_size()),
            None => {
                let grid = slice::SliceGrid {
                    origin: Vec2::ZERO,
                    resolution: layer.voxel_size(),
                    width: 0,
                    rows: 0,
                };
                Ok(slice::slice_message(&grid, height, self.config.slice_unknown_value, Vec::new()))
            }
        }
    }

    // ---- Meshes ----

    pub fn mesh_message_from_mesh_layer(&self, layer: &MeshLayer) -> Mesh {
        mesh::mesh_message_from_mesh_layer(layer)
    }

    pub fn mesh_message_from_mesh_blocks(&self, layer: &MeshLayer, indices: &[BlockIndex]) -> Mesh {
        mesh::mesh_message_from_mesh_blocks(layer, indices)
    }

    pub fn mesh_block_message_from_mesh_block(&self, block: &MeshBlock) -> MeshBlockMsg {
        mesh::mesh_block_message_from_mesh_block(block)
    }

    // ---- Frames ----

    pub fn depth_image_from_image_message(&self, msg: &Image, frame: &mut DepthImage) -> Result<()> {
        image::depth_image_from_image_message(msg, frame)
    }

    pub fn color_image_from_image_message(&self, msg: &Image, frame: &mut ColorImage) -> Result<()> {
        image::color_image_from_image_message(msg, frame)
    }

    pub fn image_message_from_depth_image(&self, frame: &DepthImage, frame_id: &str) -> Image {
        image::image_message_from_depth_image(frame, frame_id)
    }

    pub fn image_message_from_color_image(&self, frame: &ColorImage, frame_id: &str) -> Image {
        image::image_message_from_color_image(frame, frame_id)
    }

    pub fn camera_from_message(&self, info: &CameraInfo) -> Camera {
        image::camera_from_message(info)
    }
}
