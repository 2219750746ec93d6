//! Camera collaborator: the uniform layout the projection and splat shaders
//! read, an orbit camera that produces it, and a buffer owner for it.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;

/// GPU layout of the camera uniform (`CameraUniforms` in the WGSL kernels).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: [[f32; 4]; 4],
    pub view_inv: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub proj_inv: [[f32; 4]; 4],
    /// Output size in physical pixels.
    pub viewport: [f32; 2],
    /// Focal lengths in pixels.
    pub focal: [f32; 2],
}

impl CameraUniform {
    pub const SIZE: u64 = std::mem::size_of::<CameraUniform>() as u64;
}

/// Right-handed perspective camera looking at `target`.
#[derive(Debug, Clone)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
    /// Output size in physical pixels.
    pub viewport: Vec2,
}

impl Camera {
    pub fn new(viewport: Vec2) -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fovy: 45.0f32.to_radians(),
            znear: 0.1,
            zfar: 1000.0,
            viewport,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.x.max(1.0) / self.viewport.y.max(1.0)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fovy, self.aspect(), self.znear, self.zfar)
    }

    /// Focal lengths in pixels for the current viewport and field of view.
    pub fn focal(&self) -> Vec2 {
        let fy = 0.5 * self.viewport.y / (0.5 * self.fovy).tan();
        // Square pixels: the horizontal focal length equals the vertical one.
        Vec2::splat(fy)
    }

    pub fn uniform(&self) -> CameraUniform {
        let view = self.view_matrix();
        let proj = self.projection_matrix();
        CameraUniform {
            view: view.to_cols_array_2d(),
            view_inv: view.inverse().to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            proj_inv: proj.inverse().to_cols_array_2d(),
            viewport: self.viewport.to_array(),
            focal: self.focal().to_array(),
        }
    }

    /// Rotates the eye around the target; `delta` is in pixels of pointer travel.
    pub fn orbit(&mut self, delta: Vec2) {
        let offset = self.eye - self.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }

        let mut theta = offset.z.atan2(offset.x);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        theta -= delta.x * 0.01;
        phi = (phi - delta.y * 0.01).clamp(0.01, std::f32::consts::PI - 0.01);

        self.eye = self.target
            + Vec3::new(
                radius * theta.cos() * phi.sin(),
                radius * phi.cos(),
                radius * theta.sin() * phi.sin(),
            );
    }

    /// Moves the eye towards (positive) or away from the target.
    pub fn zoom(&mut self, amount: f32) {
        let offset = self.eye - self.target;
        let radius = (offset.length() * (1.0 - amount * 0.1)).clamp(self.znear * 2.0, self.zfar * 0.5);
        self.eye = self.target + offset.normalize_or(Vec3::Z) * radius;
    }
}

/// Owns the uniform buffer the renderer binds as its camera.
pub struct CameraBuffer {
    buffer: wgpu::Buffer,
}

impl CameraBuffer {
    pub fn new(device: &wgpu::Device, camera: &Camera) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gsplat camera buffer"),
            contents: bytemuck::bytes_of(&camera.uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self { buffer }
    }

    /// Uploads `camera`; must happen before the frame that should see it is encoded.
    pub fn update(&self, queue: &wgpu::Queue, camera: &Camera) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&camera.uniform()));
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_matches_wgsl_layout() {
        // Four mat4x4<f32> plus two vec2<f32>.
        assert_eq!(CameraUniform::SIZE, 4 * 64 + 16);
        assert_eq!(CameraUniform::SIZE % 16, 0);
    }

    #[test]
    fn focal_is_half_height_over_tan_half_fov() {
        let mut camera = Camera::new(Vec2::new(200.0, 100.0));
        camera.fovy = 90.0f32.to_radians();
        let focal = camera.focal();
        assert!((focal.y - 50.0).abs() < 1e-3);
        assert_eq!(focal.x, focal.y);
    }

    #[test]
    fn orbit_preserves_distance_to_target() {
        let mut camera = Camera::new(Vec2::new(64.0, 64.0));
        let before = (camera.eye - camera.target).length();
        camera.orbit(Vec2::new(37.0, -12.0));
        let after = (camera.eye - camera.target).length();
        assert!((before - after).abs() < 1e-4);
    }

    #[test]
    fn target_projects_to_screen_center() {
        let camera = Camera::new(Vec2::new(64.0, 48.0));
        let clip = camera.projection_matrix() * camera.view_matrix() * camera.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
