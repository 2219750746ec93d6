//! Per-renderer GPU buffers: sizes, usages and initial contents.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::cloud::{sh_stride, GAUSSIAN_STRIDE};
use crate::error::{SplatError, SplatResult};

/// Bytes per projected splat: six `u32`, each holding two packed `f16`.
pub const SPLAT_STRIDE: u64 = 24;

/// Two triangles per splat quad.
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Byte offset of `instance_count` inside [`DrawIndirectArgs`].
pub const DRAW_INSTANCE_COUNT_OFFSET: u64 = 4;

/// `draw_indirect` arguments.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl Default for DrawIndirectArgs {
    fn default() -> Self {
        Self {
            vertex_count: QUAD_VERTEX_COUNT,
            instance_count: 0,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Settings uniform (`Settings` in `preprocess.wgsl`).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SettingsUniform {
    pub scale_factor: f32,
    /// Stored as float to match the shader-side layout.
    pub sh_degree: f32,
}

impl SettingsUniform {
    pub fn new(scale_factor: f32, sh_degree: u32) -> Self {
        Self {
            scale_factor,
            sh_degree: sh_degree as f32,
        }
    }
}

/// Workgroups needed to cover `point_count` threads.
///
/// `workgroup_size` is validated non-zero by the renderer.
pub fn dispatch_count(point_count: u32, workgroup_size: u32) -> u32 {
    point_count.div_ceil(workgroup_size.max(1))
}

/// Size and usage of one buffer, computed before anything touches the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferSpec {
    pub label: &'static str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

/// Every buffer the renderer allocates, plus the storage bindings it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    pub point_count: u32,
    pub splats: BufferSpec,
    pub nulling: BufferSpec,
    pub draw_args: BufferSpec,
    pub settings: BufferSpec,
    /// Bytes of the point-cloud buffers bound as storage.
    pub gaussian_binding: u64,
    pub sh_binding: u64,
}

impl BufferLayout {
    pub fn new(point_count: u32, sh_degree: u32) -> Self {
        // An empty cloud still binds one record: zero-sized storage bindings are invalid.
        let records = u64::from(point_count.max(1));

        Self {
            point_count,
            splats: BufferSpec {
                label: "gsplat splat buffer",
                size: records * SPLAT_STRIDE,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            },
            nulling: BufferSpec {
                label: "gsplat nulling buffer",
                size: 4,
                usage: wgpu::BufferUsages::COPY_SRC,
            },
            draw_args: BufferSpec {
                label: "gsplat draw indirect buffer",
                size: std::mem::size_of::<DrawIndirectArgs>() as u64,
                usage: wgpu::BufferUsages::INDIRECT
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            },
            settings: BufferSpec {
                label: "gsplat settings buffer",
                size: std::mem::size_of::<SettingsUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            },
            gaussian_binding: records * GAUSSIAN_STRIDE,
            sh_binding: records * sh_stride(sh_degree),
        }
    }

    /// Rejects layouts the device cannot hold or bind.
    pub fn check_limits(&self, limits: &wgpu::Limits) -> SplatResult<()> {
        let storage_limit =
            u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);

        for (buffer, required) in [
            ("splat", self.splats.size),
            ("gaussian", self.gaussian_binding),
            ("spherical-harmonic", self.sh_binding),
        ] {
            if required > storage_limit {
                return Err(SplatError::ExceedsDeviceLimit {
                    buffer,
                    required,
                    limit: storage_limit,
                });
            }
        }
        Ok(())
    }
}

/// Buffers owned by one renderer. Allocated once, never resized.
#[derive(Debug)]
pub struct RendererBuffers {
    pub splats: wgpu::Buffer,
    /// Four zero bytes; source of the per-frame counter resets.
    pub nulling: wgpu::Buffer,
    pub draw_args: wgpu::Buffer,
    pub settings: wgpu::Buffer,
}

impl RendererBuffers {
    /// Allocates `layout`; call [`BufferLayout::check_limits`] first.
    pub fn allocate(
        device: &wgpu::Device,
        layout: &BufferLayout,
        settings: SettingsUniform,
    ) -> Self {
        let splats = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(layout.splats.label),
            size: layout.splats.size,
            usage: layout.splats.usage,
            mapped_at_creation: false,
        });

        let nulling = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(layout.nulling.label),
            contents: &[0u8; 4],
            usage: layout.nulling.usage,
        });

        let draw_args = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(layout.draw_args.label),
            contents: bytemuck::bytes_of(&DrawIndirectArgs::default()),
            usage: layout.draw_args.usage,
        });

        let settings = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(layout.settings.label),
            contents: bytemuck::bytes_of(&settings),
            usage: layout.settings.usage,
        });

        log::debug!(
            "allocated renderer buffers: splats {} B, draw args {} B, settings {} B",
            layout.splats.size,
            layout.draw_args.size,
            layout.settings.size
        );

        Self {
            splats,
            nulling,
            draw_args,
            settings,
        }
    }

    pub fn write_settings(&self, queue: &wgpu::Queue, settings: SettingsUniform) {
        queue.write_buffer(&self.settings, 0, bytemuck::bytes_of(&settings));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splat_buffer_is_point_count_times_stride() {
        for n in [1u32, 2, 255, 256, 257, 100_000] {
            assert_eq!(BufferLayout::new(n, 0).splats.size, u64::from(n) * SPLAT_STRIDE);
        }
    }

    #[test]
    fn empty_cloud_keeps_one_placeholder_record() {
        let layout = BufferLayout::new(0, 3);
        assert_eq!(layout.splats.size, SPLAT_STRIDE);
        assert_eq!(layout.sh_binding, sh_stride(3));
    }

    #[test]
    fn dispatch_rounds_up() {
        assert_eq!(dispatch_count(0, 256), 0);
        assert_eq!(dispatch_count(1, 256), 1);
        assert_eq!(dispatch_count(256, 256), 1);
        assert_eq!(dispatch_count(257, 256), 2);
        assert_eq!(dispatch_count(1000, 64), 16);
    }

    #[test]
    fn draw_args_start_with_six_vertices_and_no_instances() {
        let args = DrawIndirectArgs::default();
        assert_eq!(bytemuck::cast::<_, [u32; 4]>(args), [6, 0, 0, 0]);
        assert_eq!(
            std::mem::offset_of!(DrawIndirectArgs, instance_count) as u64,
            DRAW_INSTANCE_COUNT_OFFSET
        );
    }

    #[test]
    fn settings_are_two_floats() {
        let s = SettingsUniform::new(1.5, 3);
        assert_eq!(std::mem::size_of::<SettingsUniform>(), 8);
        assert_eq!(bytemuck::cast::<_, [f32; 2]>(s), [1.5, 3.0]);
    }

    #[test]
    fn usages_match_buffer_roles() {
        let layout = BufferLayout::new(10, 0);
        assert!(layout.nulling.usage.contains(wgpu::BufferUsages::COPY_SRC));
        assert!(layout.draw_args.usage.contains(
            wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST
        ));
        assert!(layout.settings.usage.contains(wgpu::BufferUsages::UNIFORM));
        assert!(layout.splats.usage.contains(wgpu::BufferUsages::STORAGE));
    }

    #[test]
    fn oversized_layout_is_rejected_before_allocation() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1024,
            ..wgpu::Limits::default()
        };
        let err = BufferLayout::new(100, 0).check_limits(&limits).unwrap_err();
        assert!(matches!(
            err,
            SplatError::ExceedsDeviceLimit {
                buffer: "splat",
                required: 2400,
                limit: 1024
            }
        ));
        assert!(BufferLayout::new(10, 0).check_limits(&limits).is_ok());
    }
}
