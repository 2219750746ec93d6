use crate::renderer::resources::RendererBuffers;
use crate::shader;
use crate::sort::{DepthSorter, PingPongSlot};

fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Indirect draw of the sorted splats as blended quads.
pub(crate) struct SplatPass {
    pipeline: wgpu::RenderPipeline,
    camera_bind_group: wgpu::BindGroup,
    /// `{splats, sorted indices}` per ping-pong slot.
    splat_bind_groups: [wgpu::BindGroup; 2],
}

impl SplatPass {
    pub(crate) fn new(
        device: &wgpu::Device,
        camera_buffer: &wgpu::Buffer,
        buffers: &RendererBuffers,
        sorter: &dyn DepthSorter,
        color_format: wgpu::TextureFormat,
    ) -> Self {
        let module = shader::create_module(
            device,
            "gsplat splat shader",
            include_str!("shaders/splat.wgsl"),
            &[],
        );

        let camera_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gsplat splat camera bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let splat_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gsplat splat data bgl"),
            entries: &[storage_entry(0), storage_entry(1)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gsplat splat pipeline layout"),
            bind_group_layouts: &[&camera_bgl, &splat_bgl],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gsplat splat pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gsplat splat camera bind group"),
            layout: &camera_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let splat_bind_groups = PingPongSlot::ALL.map(|slot| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(match slot {
                    PingPongSlot::First => "gsplat splat bind group (slot 0)",
                    PingPongSlot::Second => "gsplat splat bind group (slot 1)",
                }),
                layout: &splat_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.splats.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: sorter.ping_pong()[slot.index()].indices.as_entire_binding(),
                    },
                ],
            })
        });

        Self {
            pipeline,
            camera_bind_group,
            splat_bind_groups,
        }
    }

    /// Clears `target` and issues the single indirect draw over `slot`'s indices.
    ///
    /// The instance count must already have been copied into `draw_args`.
    pub(crate) fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        clear_color: wgpu::Color,
        draw_args: &wgpu::Buffer,
        slot: PingPongSlot,
    ) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gsplat splat pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.camera_bind_group, &[]);
        rpass.set_bind_group(1, &self.splat_bind_groups[slot.index()], &[]);
        rpass.draw_indirect(draw_args, 0);
    }
}
