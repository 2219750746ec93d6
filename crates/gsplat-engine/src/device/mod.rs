//! GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue, with or without a surface
//! - configuring the surface and acquiring frames for windowed rendering
//! - tracking device loss so renderers can refuse to encode against a dead device

mod frame;
mod gpu;
mod headless;
mod health;
mod init;
mod surface;

#[cfg(test)]
pub(crate) mod readback;

pub use frame::GpuFrame;
pub use gpu::Gpu;
pub use headless::HeadlessGpu;
pub use health::DeviceHealth;
pub use init::GpuInit;
pub use surface::SurfaceErrorAction;
