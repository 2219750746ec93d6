//! Point-cloud contract between the asset loader and the renderer.
//!
//! The loader owns parsing; this module fixes the GPU record layouts the
//! projection kernel reads and validates buffers against them.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::{SplatError, SplatResult};

/// Highest spherical-harmonic degree accepted.
pub const MAX_SH_DEGREE: u32 = 4;

/// Zeroth-order SH basis constant (`1 / (2 * sqrt(pi))`).
pub const SH_C0: f32 = 0.282_094_8;

/// Bytes per point in the Gaussian-parameter buffer.
pub const GAUSSIAN_STRIDE: u64 = std::mem::size_of::<GaussianRecord>() as u64;

/// One 3D Gaussian as stored on the GPU (`Gaussian` in `preprocess.wgsl`).
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct GaussianRecord {
    pub position: [f32; 3],
    /// Opacity before the sigmoid.
    pub opacity_logit: f32,
    /// Unit quaternion `(w, x, y, z)`.
    pub rotation: [f32; 4],
    /// Per-axis scale before `exp`.
    pub log_scale: [f32; 3],
    pub _pad: f32,
}

impl GaussianRecord {
    /// Builds a record from linear scale and opacity in `(0, 1)`.
    pub fn new(position: [f32; 3], scale: [f32; 3], rotation: [f32; 4], opacity: f32) -> Self {
        let o = opacity.clamp(1e-6, 1.0 - 1e-6);
        Self {
            position,
            opacity_logit: (o / (1.0 - o)).ln(),
            rotation,
            log_scale: scale.map(|s| s.max(f32::MIN_POSITIVE).ln()),
            _pad: 0.0,
        }
    }

    /// Isotropic, axis-aligned Gaussian.
    pub fn isotropic(position: [f32; 3], radius: f32, opacity: f32) -> Self {
        Self::new(position, [radius; 3], [1.0, 0.0, 0.0, 0.0], opacity)
    }
}

/// Number of SH coefficients per color channel for `degree`.
pub const fn sh_coefficients(degree: u32) -> u32 {
    (degree + 1) * (degree + 1)
}

/// Bytes per point in the SH buffer: coefficient-major RGB triplets of `f32`.
pub const fn sh_stride(degree: u32) -> u64 {
    sh_coefficients(degree) as u64 * 3 * 4
}

/// DC coefficients that evaluate to `rgb` regardless of view direction.
pub fn dc_from_color(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(|c| (c - 0.5) / SH_C0)
}

pub(crate) fn check_sh_degree(degree: u32) -> SplatResult<()> {
    if degree > MAX_SH_DEGREE {
        return Err(SplatError::ShDegreeOutOfRange(degree));
    }
    Ok(())
}

pub(crate) fn check_point_count(count: usize) -> SplatResult<u32> {
    u32::try_from(count).map_err(|_| SplatError::InvalidPointCount(count as u64))
}

/// GPU-resident point cloud handed over by the loader.
///
/// Cheap to clone: wgpu buffers are reference-counted handles.
#[derive(Debug, Clone)]
pub struct PointCloud {
    point_count: u32,
    sh_degree: u32,
    sh_buffer: wgpu::Buffer,
    gaussian_buffer: wgpu::Buffer,
}

impl PointCloud {
    /// Wraps buffers produced elsewhere, checking them against the record layouts.
    ///
    /// Both buffers need `STORAGE` usage.
    pub fn new(
        point_count: u32,
        sh_degree: u32,
        sh_buffer: wgpu::Buffer,
        gaussian_buffer: wgpu::Buffer,
    ) -> SplatResult<Self> {
        let cloud = Self {
            point_count,
            sh_degree,
            sh_buffer,
            gaussian_buffer,
        };
        cloud.validate()?;
        Ok(cloud)
    }

    /// Uploads CPU-side records.
    ///
    /// `sh_coeffs` holds `sh_coefficients(sh_degree) * 3` floats per point.
    pub fn upload(
        device: &wgpu::Device,
        gaussians: &[GaussianRecord],
        sh_degree: u32,
        sh_coeffs: &[f32],
    ) -> SplatResult<Self> {
        check_sh_degree(sh_degree)?;
        let point_count = check_point_count(gaussians.len())?;

        let floats_per_point = sh_coefficients(sh_degree) as usize * 3;
        let expected = gaussians.len() * floats_per_point;
        if sh_coeffs.len() != expected {
            return Err(SplatError::BufferTooSmall {
                buffer: "spherical-harmonic",
                required: (expected * 4) as u64,
                actual: (sh_coeffs.len() * 4) as u64,
            });
        }

        // Zero-sized storage bindings are invalid; keep one placeholder record.
        let gaussian_bytes: Vec<u8> = if gaussians.is_empty() {
            bytemuck::bytes_of(&GaussianRecord::default()).to_vec()
        } else {
            bytemuck::cast_slice(gaussians).to_vec()
        };
        let sh_bytes: Vec<u8> = if sh_coeffs.is_empty() {
            vec![0; sh_stride(sh_degree) as usize]
        } else {
            bytemuck::cast_slice(sh_coeffs).to_vec()
        };

        let gaussian_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gsplat gaussian buffer"),
            contents: &gaussian_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let sh_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gsplat sh buffer"),
            contents: &sh_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        log::debug!(
            "uploaded point cloud: {point_count} points, sh degree {sh_degree}, {} + {} bytes",
            gaussian_bytes.len(),
            sh_bytes.len()
        );

        Self::new(point_count, sh_degree, sh_buffer, gaussian_buffer)
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn sh_degree(&self) -> u32 {
        self.sh_degree
    }

    pub fn sh_buffer(&self) -> &wgpu::Buffer {
        &self.sh_buffer
    }

    pub fn gaussian_buffer(&self) -> &wgpu::Buffer {
        &self.gaussian_buffer
    }

    /// Checks degree range and that both buffers cover `point_count` records.
    pub fn validate(&self) -> SplatResult<()> {
        check_sh_degree(self.sh_degree)?;
        check_buffer(
            "gaussian",
            u64::from(self.point_count) * GAUSSIAN_STRIDE,
            self.gaussian_buffer.size(),
        )?;
        check_buffer(
            "spherical-harmonic",
            u64::from(self.point_count) * sh_stride(self.sh_degree),
            self.sh_buffer.size(),
        )
    }
}

fn check_buffer(buffer: &'static str, required: u64, actual: u64) -> SplatResult<()> {
    if actual < required {
        return Err(SplatError::BufferTooSmall {
            buffer,
            required,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_record_is_three_vec4() {
        assert_eq!(GAUSSIAN_STRIDE, 48);
    }

    #[test]
    fn sh_stride_grows_with_degree() {
        assert_eq!(sh_stride(0), 12);
        assert_eq!(sh_stride(1), 48);
        assert_eq!(sh_stride(3), 16 * 12);
        assert_eq!(sh_stride(4), 25 * 12);
    }

    #[test]
    fn degree_above_four_is_rejected() {
        assert!(check_sh_degree(4).is_ok());
        assert!(matches!(
            check_sh_degree(5),
            Err(SplatError::ShDegreeOutOfRange(5))
        ));
    }

    #[test]
    fn short_buffer_reports_sizes() {
        let err = check_buffer("gaussian", 96, 48).unwrap_err();
        assert!(matches!(
            err,
            SplatError::BufferTooSmall {
                buffer: "gaussian",
                required: 96,
                actual: 48
            }
        ));
    }

    #[test]
    fn record_helpers_invert_activation() {
        let g = GaussianRecord::isotropic([1.0, 2.0, 3.0], 0.5, 0.5);
        assert!(g.opacity_logit.abs() < 1e-6);
        assert!((g.log_scale[0].exp() - 0.5).abs() < 1e-6);
        assert_eq!(g.rotation, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn dc_color_round_trips_through_basis() {
        let dc = dc_from_color([1.0, 0.5, 0.0]);
        let back = dc.map(|c| c * SH_C0 + 0.5);
        for (a, b) in back.iter().zip([1.0, 0.5, 0.0]) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
