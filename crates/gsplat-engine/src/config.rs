/// Renderer construction parameters.
///
/// Keep this structure small; buffer sizes are derived from the point cloud and
/// are not configurable.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Threads per workgroup for the projection pass.
    ///
    /// Must be a power of two in `1..=256`. The dispatch count is
    /// `ceil(point_count / workgroup_size)`.
    pub workgroup_size: u32,

    /// Color the output target is cleared to before the splats are drawn.
    pub clear_color: wgpu::Color,

    /// Format of the output target the render pipeline is built for.
    pub color_format: wgpu::TextureFormat,

    /// Initial Gaussian scale multiplier written to the settings buffer.
    pub scale_factor: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 256,
            clear_color: wgpu::Color::BLACK,
            color_format: wgpu::TextureFormat::Bgra8Unorm,
            scale_factor: 1.0,
        }
    }
}

impl RendererConfig {
    /// Returns a copy targeting `format`.
    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_format = format;
        self
    }
}
