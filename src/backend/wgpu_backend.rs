//! wgpu call-through helpers.
//!
//! wgpu tracks image layouts and most hazards internally, so the barrier
//! path on this backend only advances the host-side state tables and
//! emits no native command.

use crate::types::{BufferCopy, Extent3d, Offset3d, SubresourceLayers};

pub fn extent_3d(extent: Extent3d) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: extent.width,
        height: extent.height,
        depth_or_array_layers: extent.depth,
    }
}

pub fn origin_3d(offset: Offset3d) -> wgpu::Origin3d {
    wgpu::Origin3d {
        x: offset.x as u32,
        y: offset.y as u32,
        z: offset.z as u32,
    }
}

pub fn image_copy_texture<'a>(
    texture: &'a wgpu::Texture,
    layers: &SubresourceLayers,
    offset: Offset3d,
) -> wgpu::ImageCopyTexture<'a> {
    wgpu::ImageCopyTexture {
        texture,
        mip_level: layers.mip_level,
        origin: origin_3d(offset),
        aspect: wgpu::TextureAspect::All,
    }
}

/// Record one batch of buffer copies.
pub fn copy_buffer_regions(
    encoder: &mut wgpu::CommandEncoder,
    source: &wgpu::Buffer,
    destination: &wgpu::Buffer,
    regions: &[BufferCopy],
) {
    for region in regions {
        encoder.copy_buffer_to_buffer(
            source,
            region.source_offset,
            destination,
            region.destination_offset,
            region.size,
        );
    }
}
