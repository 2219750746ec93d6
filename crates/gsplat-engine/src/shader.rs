//! WGSL module creation with compile-time constants prepended.

use std::fmt::Write as _;

/// Prepends `const NAME: u32 = value;` declarations to `source`.
pub(crate) fn specialize(source: &str, constants: &[(&str, u32)]) -> String {
    let mut out = String::with_capacity(source.len() + constants.len() * 40);
    for (name, value) in constants {
        let _ = writeln!(out, "const {name}: u32 = {value}u;");
    }
    out.push_str(source);
    out
}

pub(crate) fn create_module(
    device: &wgpu::Device,
    label: &'static str,
    source: &str,
    constants: &[(&str, u32)],
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(specialize(source, constants).into()),
    })
}
