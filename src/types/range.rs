//! Subresource addressing: mip/array ranges and layer selections.

use super::flags::ImageAspectFlags;

/// Inclusive-start, exclusive-end range of mip levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MipRange {
    pub base_level: u32,
    pub level_count: u32,
}

impl MipRange {
    pub fn new(base_level: u32, level_count: u32) -> Self {
        Self {
            base_level,
            level_count,
        }
    }

    /// Single mip level.
    pub fn single(level: u32) -> Self {
        Self::new(level, 1)
    }

    pub fn end(&self) -> u32 {
        self.base_level + self.level_count
    }

    pub fn contains(&self, other: &MipRange) -> bool {
        other.base_level >= self.base_level && other.end() <= self.end()
    }
}

/// Inclusive-start, exclusive-end range of array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRange {
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ArrayRange {
    pub fn new(base_layer: u32, layer_count: u32) -> Self {
        Self {
            base_layer,
            layer_count,
        }
    }

    /// Single array layer.
    pub fn single(layer: u32) -> Self {
        Self::new(layer, 1)
    }

    pub fn end(&self) -> u32 {
        self.base_layer + self.layer_count
    }

    pub fn contains(&self, other: &ArrayRange) -> bool {
        other.base_layer >= self.base_layer && other.end() <= self.end()
    }
}

/// Full subresource range of an image: aspects x mips x array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSubresourceRange {
    pub aspects: ImageAspectFlags,
    pub mip_range: MipRange,
    pub array_range: ArrayRange,
}

impl ImageSubresourceRange {
    pub fn new(aspects: ImageAspectFlags, mip_range: MipRange, array_range: ArrayRange) -> Self {
        Self {
            aspects,
            mip_range,
            array_range,
        }
    }

    /// Range covering one color subresource, the common case.
    pub fn single_color() -> Self {
        Self::new(
            ImageAspectFlags::COLOR,
            MipRange::single(0),
            ArrayRange::single(0),
        )
    }

    /// Number of individual (aspect, mip, layer) subresources addressed.
    pub fn subresource_count(&self) -> u32 {
        self.aspects.plane_count() as u32 * self.mip_range.level_count * self.array_range.layer_count
    }

    pub fn contains(&self, other: &ImageSubresourceRange) -> bool {
        self.aspects.contains(other.aspects)
            && self.mip_range.contains(&other.mip_range)
            && self.array_range.contains(&other.array_range)
    }
}

/// One mip level's worth of layers, used by copy and blit regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceLayers {
    pub aspects: ImageAspectFlags,
    pub mip_level: u32,
    pub array_range: ArrayRange,
}

impl SubresourceLayers {
    pub fn new(aspects: ImageAspectFlags, mip_level: u32, array_range: ArrayRange) -> Self {
        Self {
            aspects,
            mip_level,
            array_range,
        }
    }

    pub fn single_color() -> Self {
        Self::new(ImageAspectFlags::COLOR, 0, ArrayRange::single(0))
    }
}
