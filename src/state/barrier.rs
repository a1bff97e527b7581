//! Memory barrier descriptions.

use crate::backend::{BufferView, ImageView};
use crate::types::{
    supported_access_flags, AccessFlags, ImageLayout, ImageSubresourceRange, PipelineStageFlags,
    QueueFamilyIndex, QUEUE_FAMILY_IGNORED,
};

/// Layout transition and access dependency for an image subresource range.
///
/// Distinct source/destination queue family indices encode a queue
/// ownership transfer.
#[derive(Debug, Clone)]
pub struct ImageMemoryBarrier {
    pub image: ImageView,
    pub subresource_range: ImageSubresourceRange,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub source_access_flags: AccessFlags,
    pub destination_access_flags: AccessFlags,
    pub source_pipeline_stage_flags: PipelineStageFlags,
    pub destination_pipeline_stage_flags: PipelineStageFlags,
    pub source_queue_family_index: QueueFamilyIndex,
    pub destination_queue_family_index: QueueFamilyIndex,
}

impl ImageMemoryBarrier {
    /// Build a barrier. Both access masks must be within their layout's
    /// support set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image: ImageView,
        subresource_range: ImageSubresourceRange,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        source_access_flags: AccessFlags,
        destination_access_flags: AccessFlags,
        source_pipeline_stage_flags: PipelineStageFlags,
        destination_pipeline_stage_flags: PipelineStageFlags,
    ) -> Self {
        assert!(
            supported_access_flags(old_layout).contains(source_access_flags),
            "source access {source_access_flags:?} not supported by layout {old_layout:?}"
        );
        assert!(
            supported_access_flags(new_layout).contains(destination_access_flags),
            "destination access {destination_access_flags:?} not supported by layout {new_layout:?}"
        );
        Self {
            image,
            subresource_range,
            old_layout,
            new_layout,
            source_access_flags,
            destination_access_flags,
            source_pipeline_stage_flags,
            destination_pipeline_stage_flags,
            source_queue_family_index: QUEUE_FAMILY_IGNORED,
            destination_queue_family_index: QUEUE_FAMILY_IGNORED,
        }
    }

    /// Mark this barrier as a queue ownership transfer.
    pub fn with_queue_family_transfer(
        mut self,
        source: QueueFamilyIndex,
        destination: QueueFamilyIndex,
    ) -> Self {
        self.source_queue_family_index = source;
        self.destination_queue_family_index = destination;
        self
    }

    pub fn is_queue_family_transfer(&self) -> bool {
        self.source_queue_family_index != self.destination_queue_family_index
    }
}

/// Access dependency for a buffer range.
#[derive(Debug, Clone)]
pub struct BufferMemoryBarrier {
    pub buffer: BufferView,
    pub offset: u64,
    pub size: u64,
    pub source_access_flags: AccessFlags,
    pub destination_access_flags: AccessFlags,
    pub source_pipeline_stage_flags: PipelineStageFlags,
    pub destination_pipeline_stage_flags: PipelineStageFlags,
    pub source_queue_family_index: QueueFamilyIndex,
    pub destination_queue_family_index: QueueFamilyIndex,
}

impl BufferMemoryBarrier {
    pub fn new(
        buffer: BufferView,
        offset: u64,
        size: u64,
        source_access_flags: AccessFlags,
        destination_access_flags: AccessFlags,
        source_pipeline_stage_flags: PipelineStageFlags,
        destination_pipeline_stage_flags: PipelineStageFlags,
    ) -> Self {
        Self {
            buffer,
            offset,
            size,
            source_access_flags,
            destination_access_flags,
            source_pipeline_stage_flags,
            destination_pipeline_stage_flags,
            source_queue_family_index: QUEUE_FAMILY_IGNORED,
            destination_queue_family_index: QUEUE_FAMILY_IGNORED,
        }
    }

    pub fn is_queue_family_transfer(&self) -> bool {
        self.source_queue_family_index != self.destination_queue_family_index
    }
}
