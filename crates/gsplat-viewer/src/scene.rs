//! Procedural point clouds for the viewer.

use gsplat_engine::cloud::{dc_from_color, sh_coefficients};
use gsplat_engine::GaussianRecord;

/// Gaussians on a golden-angle spiral over a sphere, colored by direction.
///
/// Returns the records and `sh_coefficients(sh_degree) * 3` SH floats per point;
/// only the DC band is non-zero.
pub fn golden_sphere(points: usize, sh_degree: u32) -> (Vec<GaussianRecord>, Vec<f32>) {
    let golden_angle = std::f32::consts::PI * (3.0 - 5f32.sqrt());
    let floats_per_point = sh_coefficients(sh_degree) as usize * 3;

    let mut gaussians = Vec::with_capacity(points);
    let mut sh = vec![0.0f32; points * floats_per_point];

    for i in 0..points {
        let y = if points > 1 {
            1.0 - 2.0 * i as f32 / (points - 1) as f32
        } else {
            0.0
        };
        let ring = (1.0 - y * y).max(0.0).sqrt();
        let theta = golden_angle * i as f32;
        let dir = [ring * theta.cos(), y, ring * theta.sin()];

        gaussians.push(GaussianRecord::new(
            dir.map(|c| c * 1.5),
            [0.03, 0.03, 0.012],
            [1.0, 0.0, 0.0, 0.0],
            0.85,
        ));

        let color = dir.map(|c| 0.5 + 0.5 * c);
        let base = i * floats_per_point;
        sh[base..base + 3].copy_from_slice(&dc_from_color(color));
    }

    (gaussians, sh)
}
