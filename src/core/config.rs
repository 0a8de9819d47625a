//! Converter configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

/// Which compute backend drives the extraction kernels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Worker-thread stream with rayon kernels
    #[default]
    Cpu,
    /// wgpu compute shaders
    Gpu,
    /// GPU if an adapter is available, CPU otherwise
    Auto,
}

/// How slice cells sample the distance field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceInterpolation {
    /// Value of the voxel containing the cell center
    #[default]
    Nearest,
    /// Bilinear blend of the four surrounding in-plane voxel centers
    Bilinear,
}

impl SliceInterpolation {
    /// Mode id shared with the slice shader
    pub fn gpu_mode(self) -> u32 {
        match self {
            SliceInterpolation::Nearest => 0,
            SliceInterpolation::Bilinear => 1,
        }
    }
}

/// Configuration for a [`LayerConverter`](crate::convert::LayerConverter)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Compute backend
    pub backend: BackendKind,
    /// Sentinel written to slice cells without observed data
    pub slice_unknown_value: f32,
    /// Slice sampling policy
    pub slice_interpolation: SliceInterpolation,
    /// Worker threads for the CPU backend (None = one per core)
    pub cpu_threads: Option<usize>,
    /// Point records to preallocate in the payload buffer
    pub initial_point_capacity: usize,
    /// Largest slice grid accepted, in cells
    pub max_slice_cells: usize,
}

/// Default slice size limit: 8192 x 8192 cells, 256 MiB of f32
pub const DEFAULT_MAX_SLICE_CELLS: usize = 1 << 26;

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Cpu,
            slice_unknown_value: 1000.0,
            slice_interpolation: SliceInterpolation::Nearest,
            cpu_threads: None,
            initial_point_capacity: 0,
            max_slice_cells: DEFAULT_MAX_SLICE_CELLS,
        }
    }
}

impl ConverterConfig {
    /// Parse from a JSON string. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if !self.slice_unknown_value.is_finite() {
            return Err(Error::Config("slice_unknown_value must be finite".into()));
        }
        if self.max_slice_cells == 0 {
            return Err(Error::Config("max_slice_cells must be at least 1".into()));
        }
        if self.cpu_threads == Some(0) {
            return Err(Error::Config("cpu_threads must be at least 1".into()));
        }
        Ok(())
    }
}
