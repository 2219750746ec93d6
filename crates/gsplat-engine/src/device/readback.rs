//! Blocking GPU → CPU copies for tests. Never used on the frame path.

use super::HeadlessGpu;

fn map_blocking(gpu: &HeadlessGpu, staging: &wgpu::Buffer) -> Vec<u8> {
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = gpu.device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    });

    rx.recv()
        .expect("map callback dropped")
        .expect("buffer mapping failed");

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    bytes
}

/// Copies `size` bytes at `offset` of `buffer` (which needs `COPY_SRC`) to the CPU.
pub(crate) fn read_buffer(
    gpu: &HeadlessGpu,
    buffer: &wgpu::Buffer,
    offset: u64,
    size: u64,
) -> Vec<u8> {
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gsplat readback staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gsplat readback encoder"),
        });
    encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
    gpu.queue.submit(std::iter::once(encoder.finish()));

    map_blocking(gpu, &staging)
}

pub(crate) fn read_u32s(
    gpu: &HeadlessGpu,
    buffer: &wgpu::Buffer,
    offset: u64,
    count: usize,
) -> Vec<u32> {
    let bytes = read_buffer(gpu, buffer, offset, (count * 4) as u64);
    bytemuck::pod_collect_to_vec(&bytes)
}

/// Reads an RGBA8/BGRA8 texture back as tightly packed rows of 4-byte texels.
pub(crate) fn read_texture_rgba8(gpu: &HeadlessGpu, texture: &wgpu::Texture) -> Vec<[u8; 4]> {
    let width = texture.width();
    let height = texture.height();
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("gsplat texture readback staging"),
        size: u64::from(padded * height),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gsplat texture readback encoder"),
        });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        texture.size(),
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let bytes = map_blocking(gpu, &staging);
    bytes
        .chunks(padded as usize)
        .flat_map(|row| row[..unpadded as usize].chunks_exact(4))
        .map(|px| [px[0], px[1], px[2], px[3]])
        .collect()
}
