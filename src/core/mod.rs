//! Core types: errors, configuration and logging

pub mod types;
pub mod error;
pub mod config;
pub mod logging;

pub use types::*;
pub use error::Error;
pub use config::{BackendKind, ConverterConfig, SliceInterpolation};
