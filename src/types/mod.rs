//! Common GPU types shared by every backend.
//!
//! These types mirror the native APIs' vocabulary (layouts, access masks,
//! pipeline stages, subresource ranges) but are backend-neutral: the
//! encoders translate them into whichever native API is active.

mod flags;
mod layout;
mod range;
mod region;

pub use flags::{AccessFlags, ImageAspectFlags, PipelineStageFlags};
pub use layout::{supported_access_flags, supported_pipeline_stage_flags, ImageLayout};
pub use range::{ArrayRange, ImageSubresourceRange, MipRange, SubresourceLayers};
pub use region::{BufferCopy, BufferImageCopy, Extent3d, ImageBlit, ImageCopy, Offset3d};

/// Index of a stage description within a framegraph's tables.
pub type StageIndex = u16;

/// Sentinel meaning "no stage".
pub const INVALID_STAGE_INDEX: StageIndex = u16::MAX;

/// Index of an attachment description within a framegraph's tables.
pub type AttachmentIndex = u8;

/// Sentinel meaning "no attachment".
pub const INVALID_ATTACHMENT_INDEX: AttachmentIndex = u8::MAX;

/// Index of a queue family on the logical device.
pub type QueueFamilyIndex = u32;

/// Sentinel meaning "no queue family ownership transfer".
pub const QUEUE_FAMILY_IGNORED: QueueFamilyIndex = u32::MAX;

/// The queue family a stage records its commands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueFamily {
    /// Graphics queue (also supports compute and transfer).
    #[default]
    Graphics,
    /// Dedicated async compute queue.
    Compute,
    /// Dedicated transfer/DMA queue.
    Transfer,
}

impl QueueFamily {
    /// Pipeline stages this queue family can execute.
    pub fn supported_pipeline_stage_flags(self) -> PipelineStageFlags {
        match self {
            Self::Graphics => PipelineStageFlags::all(),
            Self::Compute => {
                PipelineStageFlags::TOP_OF_PIPE
                    | PipelineStageFlags::COMPUTE_SHADER
                    | PipelineStageFlags::TRANSFER
                    | PipelineStageFlags::BOTTOM_OF_PIPE
            }
            Self::Transfer => {
                PipelineStageFlags::TOP_OF_PIPE
                    | PipelineStageFlags::TRANSFER
                    | PipelineStageFlags::BOTTOM_OF_PIPE
            }
        }
    }
}
