use crate::cloud::PointCloud;
use crate::renderer::resources::{dispatch_count, RendererBuffers};
use crate::shader;
use crate::sort::{DepthSorter, PingPongSlot};

/// Projection compute stage.
///
/// Reads the camera, settings and point cloud; writes one splat per point and
/// appends survivors to the sorter's first ping-pong slot.
pub(crate) struct ProjectionStage {
    pipeline: wgpu::ComputePipeline,
    /// `{camera, settings}`, `{sh, gaussians, splats}`, `{sort_info, keys, indices, dispatch}`.
    bind_groups: [wgpu::BindGroup; 3],
    workgroups: u32,
}

fn layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn buffer_entry(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

impl ProjectionStage {
    pub(crate) fn new(
        device: &wgpu::Device,
        cloud: &PointCloud,
        camera_buffer: &wgpu::Buffer,
        buffers: &RendererBuffers,
        sorter: &dyn DepthSorter,
        workgroup_size: u32,
    ) -> Self {
        let module = shader::create_module(
            device,
            "gsplat preprocess shader",
            include_str!("shaders/preprocess.wgsl"),
            &[
                ("WORKGROUP_SIZE", workgroup_size),
                ("POINT_COUNT", cloud.point_count()),
                ("SORT_WORKGROUP_SIZE", sorter.workgroup_size()),
                ("SORT_KEYS_PER_THREAD", sorter.keys_per_thread()),
            ],
        );

        let uniform = wgpu::BufferBindingType::Uniform;
        let read = wgpu::BufferBindingType::Storage { read_only: true };
        let write = wgpu::BufferBindingType::Storage { read_only: false };

        let frame_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gsplat preprocess frame bgl"),
            entries: &[layout_entry(0, uniform), layout_entry(1, uniform)],
        });
        let cloud_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gsplat preprocess cloud bgl"),
            entries: &[
                layout_entry(0, read),
                layout_entry(1, read),
                layout_entry(2, write),
            ],
        });
        let sort_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gsplat preprocess sort bgl"),
            entries: &[
                layout_entry(0, write),
                layout_entry(1, write),
                layout_entry(2, write),
                layout_entry(3, write),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gsplat preprocess pipeline layout"),
            bind_group_layouts: &[&frame_bgl, &cloud_bgl, &sort_bgl],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gsplat preprocess pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("preprocess"),
            compilation_options: Default::default(),
            cache: None,
        });

        let unsorted = &sorter.ping_pong()[PingPongSlot::First.index()];
        let bind_groups = [
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("gsplat preprocess frame bind group"),
                layout: &frame_bgl,
                entries: &[
                    buffer_entry(0, camera_buffer),
                    buffer_entry(1, &buffers.settings),
                ],
            }),
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("gsplat preprocess cloud bind group"),
                layout: &cloud_bgl,
                entries: &[
                    buffer_entry(0, cloud.sh_buffer()),
                    buffer_entry(1, cloud.gaussian_buffer()),
                    buffer_entry(2, &buffers.splats),
                ],
            }),
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("gsplat preprocess sort bind group"),
                layout: &sort_bgl,
                entries: &[
                    buffer_entry(0, sorter.sort_info_buffer()),
                    buffer_entry(1, &unsorted.depth_keys),
                    buffer_entry(2, &unsorted.indices),
                    buffer_entry(3, sorter.dispatch_indirect_buffer()),
                ],
            }),
        ];

        Self {
            pipeline,
            bind_groups,
            workgroups: dispatch_count(cloud.point_count(), workgroup_size),
        }
    }

    pub(crate) fn workgroups(&self) -> u32 {
        self.workgroups
    }

    /// Records the projection pass; records nothing for an empty cloud.
    pub(crate) fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        if self.workgroups == 0 {
            return;
        }

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("gsplat preprocess"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        for (i, bind_group) in self.bind_groups.iter().enumerate() {
            pass.set_bind_group(i as u32, bind_group, &[]);
        }
        pass.dispatch_workgroups(self.workgroups, 1, 1);
    }
}
