use thiserror::Error;

use crate::renderer::frame::FrameOrderViolation;

pub type SplatResult<T> = std::result::Result<T, SplatError>;

/// Errors surfaced by renderer construction and frame encoding.
///
/// Everything except `DeviceLost` and `FrameOrder` is a configuration error and
/// is reported by `GaussianRenderer::new` before any frame is encoded.
#[derive(Debug, Error)]
pub enum SplatError {
    #[error("point count {0} does not fit the 32-bit index space")]
    InvalidPointCount(u64),

    #[error("spherical-harmonic degree {0} is outside 0..=4")]
    ShDegreeOutOfRange(u32),

    #[error("{buffer} buffer holds {actual} bytes, {required} required")]
    BufferTooSmall {
        buffer: &'static str,
        required: u64,
        actual: u64,
    },

    #[error("{buffer} buffer needs {required} bytes, device allows {limit}")]
    ExceedsDeviceLimit {
        buffer: &'static str,
        required: u64,
        limit: u64,
    },

    #[error("camera buffer holds {actual} bytes, {required} required")]
    CameraBufferTooSmall { required: u64, actual: u64 },

    #[error("sorter capacity {capacity} cannot hold {point_count} keys")]
    SorterCapacity { capacity: u32, point_count: u32 },

    #[error("workgroup size {0} must be a non-zero power of two no larger than 256")]
    InvalidWorkgroupSize(u32),

    #[error("projection needs {workgroups} workgroups, device allows {limit} per dimension")]
    DispatchTooLarge { workgroups: u32, limit: u32 },

    #[error("GPU device lost: {reason}")]
    DeviceLost { reason: String },

    #[error("frame plan rejected: {0}")]
    FrameOrder(#[from] FrameOrderViolation),
}

impl SplatError {
    /// Whether the renderer instance must be rebuilt from scratch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SplatError::DeviceLost { .. } | SplatError::FrameOrder(_))
    }
}
