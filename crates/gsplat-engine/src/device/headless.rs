use anyhow::{Context, Result};

use super::init::{create_instance, request_device};
use super::{DeviceHealth, GpuInit};

/// Device and queue without a presentation surface.
///
/// Used for offscreen rendering into textures and for tests.
pub struct HeadlessGpu {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub health: DeviceHealth,
}

impl HeadlessGpu {
    pub async fn new(init: GpuInit) -> Result<Self> {
        let instance = create_instance();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;

        let adapter = match adapter {
            Ok(adapter) => adapter,
            Err(_) if init.allow_fallback_adapter => instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface: None,
                    force_fallback_adapter: true,
                })
                .await
                .context("no hardware or fallback GPU adapter available")?,
            Err(err) => return Err(err).context("failed to find a suitable GPU adapter"),
        };

        let (device, queue) = request_device(&adapter, &init, "gsplat headless device").await?;
        let health = DeviceHealth::watch(&device);

        Ok(Self {
            adapter,
            device,
            queue,
            health,
        })
    }

    /// Blocking wrapper around [`HeadlessGpu::new`].
    pub fn new_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    /// Creates a render-attachment texture that can also be copied out.
    pub fn create_target(
        &self,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gsplat offscreen target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }
}
