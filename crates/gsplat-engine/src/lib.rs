//! gsplat engine crate.
//!
//! Owns the per-frame GPU pipeline that turns a Gaussian point cloud into
//! depth-sorted, alpha-blended splats: projection compute pass, depth sort,
//! and one indirect draw, all threaded together through GPU-side buffers.

pub mod camera;
pub mod cloud;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod renderer;
mod shader;
pub mod sort;

pub use camera::{Camera, CameraBuffer, CameraUniform};
pub use cloud::{GaussianRecord, PointCloud};
pub use config::RendererConfig;
pub use error::{SplatError, SplatResult};
pub use renderer::frame::{FrameOp, FramePlan};
pub use renderer::resources::SettingsUniform;
pub use renderer::GaussianRenderer;
pub use sort::{BitonicSorter, DepthSorter, PingPongSlot, SortOutcome};
