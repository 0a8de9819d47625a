//! Headless wgpu context for compute work

use std::sync::Arc;

use super::failure::FailureSlot;
use crate::core::error::Error;

/// Device and queue without a surface
pub struct ComputeContext {
    pub adapter_info: wgpu::AdapterInfo,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub limits: wgpu::Limits,
    /// Device errors raised outside an error scope
    failure: FailureSlot,
}

impl ComputeContext {
    /// Request an adapter and device suitable for compute
    pub async fn new() -> Result<Self, Error> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::Gpu(format!("No suitable adapter found: {:?}", e)))?;

        let adapter_limits = adapter.limits();

        let device_desc = wgpu::DeviceDescriptor {
            label: Some("layercast_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits {
                max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                max_buffer_size: adapter_limits.max_buffer_size,
                ..wgpu::Limits::downlevel_defaults()
            },
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: Default::default(),
            trace: Default::default(),
        };

        let (device, queue) = adapter
            .request_device(&device_desc)
            .await
            .map_err(|e| Error::Gpu(e.to_string()))?;

        // Errors outside an error scope are reported at the next wait, not panicked on
        let failure = FailureSlot::new();
        let reporter = failure.clone();
        device.on_uncaptured_error(Arc::new(move |e: wgpu::Error| {
            log::error!("Uncaptured device error: {}", e);
            reporter.record(e.to_string());
        }));

        let adapter_info = adapter.get_info();
        let limits = device.limits();
        log::info!(
            "Compute adapter: {} ({:?}), max_storage_binding={}MB",
            adapter_info.name,
            adapter_info.backend,
            limits.max_storage_buffer_binding_size / 1024 / 1024
        );

        Ok(Self {
            adapter_info,
            device,
            queue,
            limits,
            failure,
        })
    }

    /// Blocking variant of [`ComputeContext::new`]
    pub fn new_blocking() -> Result<Self, Error> {
        pollster::block_on(Self::new())
    }

    /// Wait for all submitted work, then report any uncaptured device error
    pub fn wait_idle(&self) -> Result<(), Error> {
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| Error::Gpu(format!("Device poll failed: {:?}", e)))?;
        self.take_failure()
    }

    /// Pending uncaptured device error, if any
    pub fn take_failure(&self) -> Result<(), Error> {
        match self.failure.take() {
            Some(message) => Err(Error::Gpu(message)),
            None => Ok(()),
        }
    }
}
