//! Image layouts and the access/stage masks each layout supports.
//!
//! The support tables drive the barrier layer's construction-time checks:
//! a barrier whose access mask falls outside the support set of its layout
//! is a producer/consumer declaration bug, not a runtime condition.

use super::flags::{AccessFlags, PipelineStageFlags};

/// Layout an image subresource can be in.
///
/// Layouts correspond to the native APIs' image layout states; backends
/// without explicit layouts (wgpu) track these internally and the mapping
/// collapses to a usage hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Initial state, contents undefined. Can transition to any layout.
    #[default]
    Undefined,
    /// Most flexible layout, supports all access at reduced efficiency.
    General,
    /// Optimal for color attachment writes.
    ColorAttachmentOptimal,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachmentOptimal,
    /// Optimal for depth/stencil reads (sampling + depth testing).
    DepthStencilReadOnlyOptimal,
    /// Optimal for shader sampling.
    ShaderReadOnlyOptimal,
    /// Optimal for transfer source operations.
    TransferSourceOptimal,
    /// Optimal for transfer destination operations.
    TransferDestinationOptimal,
    /// Presentable to the output surface.
    PresentSource,
}

/// Access masks that are legal while an image is in `layout`.
pub fn supported_access_flags(layout: ImageLayout) -> AccessFlags {
    match layout {
        ImageLayout::Undefined => AccessFlags::empty(),
        ImageLayout::General => AccessFlags::all(),
        ImageLayout::ColorAttachmentOptimal => {
            AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        ImageLayout::DepthStencilAttachmentOptimal => {
            AccessFlags::DEPTH_STENCIL_READ | AccessFlags::DEPTH_STENCIL_WRITE
        }
        ImageLayout::DepthStencilReadOnlyOptimal => {
            AccessFlags::DEPTH_STENCIL_READ | AccessFlags::SHADER_READ
        }
        ImageLayout::ShaderReadOnlyOptimal => {
            AccessFlags::SHADER_READ | AccessFlags::INPUT_ATTACHMENT_READ
        }
        ImageLayout::TransferSourceOptimal => AccessFlags::TRANSFER_READ,
        ImageLayout::TransferDestinationOptimal => AccessFlags::TRANSFER_WRITE,
        // Presentation engines access the image outside the pipeline.
        ImageLayout::PresentSource => AccessFlags::empty(),
    }
}

/// Pipeline stages that can legally touch an image in `layout`.
pub fn supported_pipeline_stage_flags(layout: ImageLayout) -> PipelineStageFlags {
    match layout {
        ImageLayout::Undefined => PipelineStageFlags::TOP_OF_PIPE,
        ImageLayout::General => PipelineStageFlags::all(),
        ImageLayout::ColorAttachmentOptimal => PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ImageLayout::DepthStencilAttachmentOptimal => {
            PipelineStageFlags::EARLY_FRAGMENT_TESTS | PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        ImageLayout::DepthStencilReadOnlyOptimal => {
            PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | PipelineStageFlags::LATE_FRAGMENT_TESTS
                | PipelineStageFlags::VERTEX_SHADER
                | PipelineStageFlags::FRAGMENT_SHADER
                | PipelineStageFlags::COMPUTE_SHADER
        }
        ImageLayout::ShaderReadOnlyOptimal => {
            PipelineStageFlags::VERTEX_SHADER
                | PipelineStageFlags::FRAGMENT_SHADER
                | PipelineStageFlags::COMPUTE_SHADER
                | PipelineStageFlags::RAY_TRACING_SHADER
        }
        ImageLayout::TransferSourceOptimal | ImageLayout::TransferDestinationOptimal => {
            PipelineStageFlags::TRANSFER
        }
        ImageLayout::PresentSource => PipelineStageFlags::BOTTOM_OF_PIPE,
    }
}

impl ImageLayout {
    /// Whether commands may write to the image while in this layout.
    pub fn is_writable(self) -> bool {
        supported_access_flags(self).has_writes()
    }
}
