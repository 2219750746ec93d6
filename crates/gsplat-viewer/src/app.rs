use std::sync::Arc;

use anyhow::{Context, Result};
use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use gsplat_engine::device::{Gpu, GpuInit, SurfaceErrorAction};
use gsplat_engine::{Camera, CameraBuffer, GaussianRenderer, PointCloud, RendererConfig};

use crate::scene;

/// What the viewer shows and how.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub points: usize,
    pub sh_degree: u32,
    pub scale_factor: f32,
}

/// Everything that only exists once the window does.
struct ViewerState {
    window: Arc<Window>,
    gpu: Gpu,
    camera: Camera,
    camera_buffer: CameraBuffer,
    renderer: GaussianRenderer,
    dragging: bool,
    cursor: Option<Vec2>,
}

pub struct ViewerApp {
    config: ViewerConfig,
    gpu_init: GpuInit,
    state: Option<ViewerState>,
    error: Option<anyhow::Error>,
}

impl ViewerApp {
    pub fn new(config: ViewerConfig, gpu_init: GpuInit) -> Self {
        Self {
            config,
            gpu_init,
            state: None,
            error: None,
        }
    }

    /// Error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn create_state(&self, event_loop: &ActiveEventLoop) -> Result<ViewerState> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let gpu = pollster::block_on(Gpu::new(Arc::clone(&window), self.gpu_init.clone()))
            .context("GPU initialization failed")?;

        let (gaussians, sh) = scene::golden_sphere(self.config.points, self.config.sh_degree);
        let cloud = PointCloud::upload(gpu.device(), &gaussians, self.config.sh_degree, &sh)
            .context("failed to upload point cloud")?;

        let size = gpu.size();
        let camera = Camera::new(Vec2::new(size.width as f32, size.height as f32));
        let camera_buffer = CameraBuffer::new(gpu.device(), &camera);

        let renderer_config = RendererConfig {
            scale_factor: self.config.scale_factor,
            ..RendererConfig::default()
        }
        .with_format(gpu.surface_format());
        let renderer = GaussianRenderer::new(
            gpu.device(),
            gpu.health().clone(),
            &cloud,
            camera_buffer.buffer(),
            renderer_config,
        )
        .context("failed to build renderer")?;

        Ok(ViewerState {
            window,
            gpu,
            camera,
            camera_buffer,
            renderer,
            dragging: false,
            cursor: None,
        })
    }
}

/// Camera viewport for a window size; `None` while minimized.
fn viewport_for(size: PhysicalSize<u32>) -> Option<Vec2> {
    (size.width > 0 && size.height > 0).then(|| Vec2::new(size.width as f32, size.height as f32))
}

impl ViewerState {
    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.gpu.resize(new_size);
        // A zero viewport would zero the focal length; keep the last one.
        let Some(viewport) = viewport_for(self.gpu.size()) else {
            return;
        };
        self.camera.viewport = viewport;
        self.window.request_redraw();
    }

    /// Returns `false` when the viewer must stop.
    fn redraw(&mut self) -> bool {
        if viewport_for(self.gpu.size()).is_none() {
            return true;
        }
        self.camera_buffer.update(self.gpu.queue(), &self.camera);

        let mut frame = match self.gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => {
                return match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => {
                        log::error!("surface lost beyond recovery");
                        false
                    }
                    SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => true,
                };
            }
        };

        match self.renderer.render(&mut frame.encoder, &frame.view) {
            Ok(()) => {
                self.gpu.submit(frame);
                true
            }
            Err(err) if err.is_fatal() => {
                log::error!("renderer stopped: {err}");
                false
            }
            Err(err) => {
                log::warn!("frame skipped: {err}");
                true
            }
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw.
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => state.resize(new_size),

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = state.window.inner_size();
                state.resize(size);
            }

            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                state.dragging = button_state == ElementState::Pressed;
            }

            WindowEvent::CursorMoved { position, .. } => {
                let pos = Vec2::new(position.x as f32, position.y as f32);
                if let (true, Some(last)) = (state.dragging, state.cursor) {
                    state.camera.orbit(pos - last);
                }
                state.cursor = Some(pos);
            }

            WindowEvent::CursorLeft { .. } => state.cursor = None,

            WindowEvent::MouseWheel { delta, .. } => {
                let amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 50.0,
                };
                state.camera.zoom(amount);
            }

            WindowEvent::RedrawRequested => {
                if !state.redraw() {
                    self.fail(event_loop, anyhow::anyhow!("rendering stopped"));
                }
            }

            _ => {}
        }
    }
}
