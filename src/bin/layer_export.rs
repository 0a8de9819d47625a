//! Layer export binary: runs every conversion on synthetic sphere layers.
//!
//! Usage: cargo run --release --bin layer_export -- [OPTIONS]
//!
//! Options:
//!   --radius <METERS>     Sphere radius (default: 2.0)
//!   --block-size <M>      Block edge length (default: 0.8)
//!   --height <METERS>     Slice height (default: 0.0)
//!   --resolution <M>      Slice cell size (default: voxel size)
//!   --config <PATH>       Converter config JSON (default: built-in defaults)
//!   --output <DIR>        Write each message as JSON into DIR (default: none)
//!
//! Output structure (with --output):
//!   <dir>/
//!     tsdf_points.json     # PointCloud2 of the TSDF surface band
//!     esdf_points.json     # PointCloud2 of the observed ESDF
//!     esdf_slice.json      # DistanceMapSlice at --height
//!     mesh.json            # Concatenated Mesh

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use layercast::core::{ConverterConfig, Result};
use layercast::voxel::synthetic::{sphere_esdf, sphere_mesh, sphere_tsdf};
use layercast::LayerConverter;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    if let Err(e) = run() {
        log::error!("Layer export failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let radius = parse_f32_arg(&args, "--radius").unwrap_or(2.0);
    let block_size = parse_f32_arg(&args, "--block-size").unwrap_or(0.8);
    let height = parse_f32_arg(&args, "--height").unwrap_or(0.0);
    let resolution = parse_f32_arg(&args, "--resolution");
    let output = parse_str_arg(&args, "--output").map(PathBuf::from);

    let config = match parse_str_arg(&args, "--config") {
        Some(path) => ConverterConfig::from_json_file(Path::new(&path))?,
        None => ConverterConfig::default(),
    };

    println!("=== Layer Export ===");
    println!("Sphere radius: {}m, block size: {}m", radius, block_size);

    let start = Instant::now();
    let tsdf = sphere_tsdf(radius, block_size);
    let esdf = sphere_esdf(radius, block_size);
    let mesh_layer = sphere_mesh(radius, block_size);
    log::info!(
        "Built layers in {:.1}ms: {} TSDF, {} ESDF, {} mesh blocks",
        start.elapsed().as_secs_f64() * 1000.0,
        tsdf.num_allocated_blocks(),
        esdf.num_allocated_blocks(),
        mesh_layer.num_allocated_blocks()
    );

    let mut converter = LayerConverter::new(config)?;

    let start = Instant::now();
    let tsdf_points = converter.point_cloud_from_layer(&tsdf)?;
    let tsdf_ms = start.elapsed().as_secs_f64() * 1000.0;

    let start = Instant::now();
    let esdf_points = converter.point_cloud_from_layer(&esdf)?;
    let esdf_ms = start.elapsed().as_secs_f64() * 1000.0;

    let start = Instant::now();
    let slice = match (resolution, esdf.allocated_aabb()) {
        (Some(res), Some(aabb)) => converter.distance_map_slice_in_aabb(&esdf, &aabb, height, res)?,
        _ => converter.distance_map_slice_from_layer(&esdf, height)?,
    };
    let slice_ms = start.elapsed().as_secs_f64() * 1000.0;

    let mesh = converter.mesh_message_from_mesh_layer(&mesh_layer);

    if let Some(dir) = &output {
        std::fs::create_dir_all(dir)?;
        write_json(&dir.join("tsdf_points.json"), &tsdf_points)?;
        write_json(&dir.join("esdf_points.json"), &esdf_points)?;
        write_json(&dir.join("esdf_slice.json"), &slice)?;
        write_json(&dir.join("mesh.json"), &mesh)?;
        log::info!("Wrote messages to {}", dir.display());
    }

    let known = slice
        .data
        .iter()
        .filter(|&&d| d != slice.unknown_value)
        .count();
    let summary = json!({
        "backend": converter.backend_name(),
        "radius": radius,
        "block_size": block_size,
        "voxel_size": tsdf.voxel_size(),
        "tsdf_points": {
            "count": tsdf_points.point_count(),
            "ms": tsdf_ms,
        },
        "esdf_points": {
            "count": esdf_points.point_count(),
            "ms": esdf_ms,
        },
        "slice": {
            "width": slice.width,
            "height": slice.height,
            "resolution": slice.resolution,
            "known_cells": known,
            "ms": slice_ms,
        },
        "mesh": {
            "blocks": mesh.block_indices.len(),
            "vertices": mesh.vertex_count(),
            "triangles": mesh.triangle_count(),
        },
    });

    println!();
    println!("=== Export Complete ===");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string(value)?)?;
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
