//! Per-frame splat pipeline.
//!
//! One frame records, into a single encoder:
//! 1. counter resets (sort-info key count, sorter dispatch `x`)
//! 2. the projection compute pass
//! 3. the sorter's passes
//! 4. a copy of the key count into the draw arguments' instance count
//! 5. one indirect draw over the sorted slot
//!
//! Counts never come back to the CPU; each stage reads what the previous one
//! wrote because it was recorded later in the same encoder.

pub mod frame;
mod preprocess;
pub mod resources;
mod splat_pass;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::camera::CameraUniform;
use crate::cloud::PointCloud;
use crate::config::RendererConfig;
use crate::device::DeviceHealth;
use crate::error::{SplatError, SplatResult};
use crate::sort::{
    BitonicSorter, DepthSorter, DISPATCH_X_OFFSET, SORT_COUNT_OFFSET, SORT_COUNT_SIZE,
};

use self::frame::{FrameOp, FramePlan};
use self::preprocess::ProjectionStage;
use self::resources::{
    dispatch_count, BufferLayout, RendererBuffers, SettingsUniform, DRAW_INSTANCE_COUNT_OFFSET,
};
use self::splat_pass::SplatPass;

pub use self::frame::{FrameOrderViolation, FrameStage};

const MAX_WORKGROUP_SIZE: u32 = 256;

fn check_workgroup_size(size: u32, limits: &wgpu::Limits) -> SplatResult<()> {
    let fits_device = size <= limits.max_compute_invocations_per_workgroup
        && size <= limits.max_compute_workgroup_size_x;
    if !size.is_power_of_two() || size > MAX_WORKGROUP_SIZE || !fits_device {
        return Err(SplatError::InvalidWorkgroupSize(size));
    }
    Ok(())
}

/// Everything that can be rejected without touching the device.
fn check_inputs(
    limits: &wgpu::Limits,
    cloud: &PointCloud,
    camera_buffer: &wgpu::Buffer,
    config: &RendererConfig,
) -> SplatResult<BufferLayout> {
    cloud.validate()?;
    check_workgroup_size(config.workgroup_size, limits)?;

    if camera_buffer.size() < CameraUniform::SIZE {
        return Err(SplatError::CameraBufferTooSmall {
            required: CameraUniform::SIZE,
            actual: camera_buffer.size(),
        });
    }

    let workgroups = dispatch_count(cloud.point_count(), config.workgroup_size);
    if workgroups > limits.max_compute_workgroups_per_dimension {
        return Err(SplatError::DispatchTooLarge {
            workgroups,
            limit: limits.max_compute_workgroups_per_dimension,
        });
    }

    let layout = BufferLayout::new(cloud.point_count(), cloud.sh_degree());
    layout.check_limits(limits)?;
    Ok(layout)
}

/// Orchestrates projection, depth sort and the indirect splat draw.
///
/// Owns every per-frame buffer exclusively. `render` takes `&self`; all
/// mutation happens on the GPU timeline. Submit one frame before encoding the
/// next: the buffers are not double-buffered.
pub struct GaussianRenderer {
    config: RendererConfig,
    point_count: u32,
    sh_degree: u32,

    buffers: RendererBuffers,
    sorter: Box<dyn DepthSorter>,
    projection: ProjectionStage,
    splat_pass: SplatPass,

    health: DeviceHealth,
    last_plan: Mutex<Option<FramePlan>>,
    logged_empty: AtomicBool,
}

impl GaussianRenderer {
    /// Builds a renderer with a [`BitonicSorter`] sized for `cloud`.
    ///
    /// `health` must track `device`; once it reports loss, `render` fails with
    /// `SplatError::DeviceLost`.
    pub fn new(
        device: &wgpu::Device,
        health: DeviceHealth,
        cloud: &PointCloud,
        camera_buffer: &wgpu::Buffer,
        config: RendererConfig,
    ) -> SplatResult<Self> {
        let layout = check_inputs(&device.limits(), cloud, camera_buffer, &config)?;
        let sorter = BitonicSorter::new(device, cloud.point_count())?;
        Self::build(device, health, cloud, camera_buffer, config, layout, Box::new(sorter))
    }

    /// Builds a renderer around any sorter honoring the [`DepthSorter`] contract.
    pub fn with_sorter(
        device: &wgpu::Device,
        health: DeviceHealth,
        cloud: &PointCloud,
        camera_buffer: &wgpu::Buffer,
        config: RendererConfig,
        sorter: Box<dyn DepthSorter>,
    ) -> SplatResult<Self> {
        let layout = check_inputs(&device.limits(), cloud, camera_buffer, &config)?;
        Self::build(device, health, cloud, camera_buffer, config, layout, sorter)
    }

    fn build(
        device: &wgpu::Device,
        health: DeviceHealth,
        cloud: &PointCloud,
        camera_buffer: &wgpu::Buffer,
        config: RendererConfig,
        layout: BufferLayout,
        sorter: Box<dyn DepthSorter>,
    ) -> SplatResult<Self> {
        if sorter.capacity() < cloud.point_count() {
            return Err(SplatError::SorterCapacity {
                capacity: sorter.capacity(),
                point_count: cloud.point_count(),
            });
        }

        let buffers = RendererBuffers::allocate(
            device,
            &layout,
            SettingsUniform::new(config.scale_factor, cloud.sh_degree()),
        );
        let projection = ProjectionStage::new(
            device,
            cloud,
            camera_buffer,
            &buffers,
            sorter.as_ref(),
            config.workgroup_size,
        );
        let splat_pass = SplatPass::new(
            device,
            camera_buffer,
            &buffers,
            sorter.as_ref(),
            config.color_format,
        );

        log::info!(
            "gaussian renderer ready: {} points, sh degree {}, {} projection workgroups, sort capacity {}",
            cloud.point_count(),
            cloud.sh_degree(),
            projection.workgroups(),
            sorter.capacity()
        );

        Ok(Self {
            point_count: cloud.point_count(),
            sh_degree: cloud.sh_degree(),
            config,
            buffers,
            sorter,
            projection,
            splat_pass,
            health,
            last_plan: Mutex::new(None),
            logged_empty: AtomicBool::new(false),
        })
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn sorter(&self) -> &dyn DepthSorter {
        self.sorter.as_ref()
    }

    /// `{scale_factor, sh_degree}` uniform; may be rewritten between frames.
    pub fn settings_buffer(&self) -> &wgpu::Buffer {
        &self.buffers.settings
    }

    pub fn write_settings(&self, queue: &wgpu::Queue, settings: SettingsUniform) {
        self.buffers.write_settings(queue, settings);
    }

    /// Rewrites the Gaussian scale multiplier; takes effect from the next submitted frame.
    pub fn set_scale_factor(&mut self, queue: &wgpu::Queue, scale_factor: f32) {
        self.config.scale_factor = scale_factor;
        self.write_settings(queue, SettingsUniform::new(scale_factor, self.sh_degree));
    }

    /// Plan of the most recently encoded frame.
    pub fn last_plan(&self) -> Option<FramePlan> {
        self.last_plan.lock().ok().and_then(|plan| plan.clone())
    }

    /// Records one frame into `encoder`, drawing into `target`.
    ///
    /// The camera buffer must already hold this frame's camera. On a
    /// `FrameOrder` error the encoder holds a partial frame and must be dropped.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) -> SplatResult<()> {
        self.health.check()?;

        let plan = self.encode_frame(encoder, target).inspect_err(|err| {
            log::error!("frame plan rejected: {err}");
        })?;

        if plan.project_workgroups() == Some(0) && !self.logged_empty.swap(true, Ordering::Relaxed) {
            log::debug!("point cloud is empty; frames only clear the target");
        }

        if let Ok(mut last) = self.last_plan.lock() {
            *last = Some(plan);
        }
        Ok(())
    }

    fn encode_frame(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) -> Result<FramePlan, FrameOrderViolation> {
        let sorter = self.sorter.as_ref();
        let mut plan = FramePlan::new();

        // ── preprocessing ──────────────────────────────────────────────────
        plan.push(FrameOp::ResetSortCount)?;
        encoder.copy_buffer_to_buffer(
            &self.buffers.nulling,
            0,
            sorter.sort_info_buffer(),
            SORT_COUNT_OFFSET,
            SORT_COUNT_SIZE,
        );

        plan.push(FrameOp::ResetSortDispatch)?;
        encoder.copy_buffer_to_buffer(
            &self.buffers.nulling,
            0,
            sorter.dispatch_indirect_buffer(),
            DISPATCH_X_OFFSET,
            4,
        );

        plan.push(FrameOp::Project {
            workgroups: self.projection.workgroups(),
        })?;
        self.projection.encode(encoder);

        // ── sorting ────────────────────────────────────────────────────────
        plan.push(FrameOp::Sort)?;
        let outcome = sorter.sort(encoder);
        plan.record_sort(outcome)?;

        // ── rendering ──────────────────────────────────────────────────────
        let copy = FrameOp::count_copy();
        plan.push(copy)?;
        encoder.copy_buffer_to_buffer(
            sorter.sort_info_buffer(),
            SORT_COUNT_OFFSET,
            &self.buffers.draw_args,
            DRAW_INSTANCE_COUNT_OFFSET,
            SORT_COUNT_SIZE,
        );

        plan.push(FrameOp::Draw {
            slot: outcome.final_slot,
        })?;
        self.splat_pass.encode(
            encoder,
            target,
            self.config.clear_color,
            &self.buffers.draw_args,
            outcome.final_slot,
        );

        plan.finish()?;
        Ok(plan)
    }
}
