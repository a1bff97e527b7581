//! Copy and blit region descriptions consumed by the blit encoder.

use super::range::SubresourceLayers;

/// 3D offset in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Offset3d {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Offset3d {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// 3D extent in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3d {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }
}

/// Buffer-to-buffer copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferCopy {
    pub source_offset: u64,
    pub destination_offset: u64,
    pub size: u64,
}

impl BufferCopy {
    pub fn new(source_offset: u64, destination_offset: u64, size: u64) -> Self {
        Self {
            source_offset,
            destination_offset,
            size,
        }
    }
}

/// Image-to-image copy region, no format conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageCopy {
    pub source_subresource: SubresourceLayers,
    pub source_offset: Offset3d,
    pub destination_subresource: SubresourceLayers,
    pub destination_offset: Offset3d,
    pub extent: Extent3d,
}

/// Buffer-image copy region, either direction.
///
/// `buffer_row_length`/`buffer_image_height` of zero mean tightly packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub buffer_row_length: u32,
    pub buffer_image_height: u32,
    pub image_subresource: SubresourceLayers,
    pub image_offset: Offset3d,
    pub image_extent: Extent3d,
}

/// Image blit region: source and destination bounds may differ in size,
/// the backend scales and may convert formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBlit {
    pub source_subresource: SubresourceLayers,
    /// Opposite corners of the source region.
    pub source_bounds: [Offset3d; 2],
    pub destination_subresource: SubresourceLayers,
    /// Opposite corners of the destination region.
    pub destination_bounds: [Offset3d; 2],
}
