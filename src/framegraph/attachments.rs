//! Attachment descriptions and their load/store flag algebra.

use bitflags::bitflags;

use crate::types::{Extent3d, ImageLayout, ImageSubresourceRange};

bitflags! {
    /// Load/store behavior of an attachment.
    ///
    /// The must-bits imply their can-bits, so testing `CAN_READ` is
    /// sufficient for both "may read" and "must read".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttachmentFlags: u8 {
        const CAN_READ = 0b0000_0001;
        const MUST_READ = 0b0000_0011;
        const CAN_STORE = 0b0000_0100;
        const MUST_STORE = 0b0000_1100;
        const CLEAR = 0b0001_0000;
    }
}

/// Value an attachment is cleared to when its flags carry `CLEAR`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Render target written by a stage's subpasses.
#[derive(Debug, Clone)]
pub struct ColorAttachmentDescription {
    pub identifier: u64,
    pub extent: Extent3d,
    pub subresource_range: ImageSubresourceRange,
    pub flags: AttachmentFlags,
    pub clear_value: Option<ClearValue>,
}

impl ColorAttachmentDescription {
    /// `CLEAR` is derived from the presence of a clear value.
    pub fn new(
        identifier: u64,
        extent: Extent3d,
        subresource_range: ImageSubresourceRange,
        flags: AttachmentFlags,
        clear_value: Option<ClearValue>,
    ) -> Self {
        debug_assert!(
            clear_value.map_or(true, |v| matches!(v, ClearValue::Color(_))),
            "color attachment with a depth/stencil clear value"
        );
        let flags = if clear_value.is_some() {
            flags | AttachmentFlags::CLEAR
        } else {
            flags
        };
        Self {
            identifier,
            extent,
            subresource_range,
            flags,
            clear_value,
        }
    }
}

/// Depth/stencil target of a stage.
#[derive(Debug, Clone)]
pub struct DepthStencilAttachmentDescription {
    pub identifier: u64,
    pub extent: Extent3d,
    pub subresource_range: ImageSubresourceRange,
    pub flags: AttachmentFlags,
    pub clear_value: Option<ClearValue>,
}

impl DepthStencilAttachmentDescription {
    pub fn new(
        identifier: u64,
        extent: Extent3d,
        subresource_range: ImageSubresourceRange,
        flags: AttachmentFlags,
        clear_value: Option<ClearValue>,
    ) -> Self {
        debug_assert!(
            clear_value.map_or(true, |v| matches!(v, ClearValue::DepthStencil { .. })),
            "depth/stencil attachment with a color clear value"
        );
        let flags = if clear_value.is_some() {
            flags | AttachmentFlags::CLEAR
        } else {
            flags
        };
        Self {
            identifier,
            extent,
            subresource_range,
            flags,
            clear_value,
        }
    }
}

/// Attachment produced by an earlier stage and read in this one.
#[derive(Debug, Clone)]
pub struct InputAttachmentDescription {
    pub identifier: u64,
    pub subresource_range: ImageSubresourceRange,
    pub layout: ImageLayout,
}

/// Attachment both read and written within the stage.
#[derive(Debug, Clone)]
pub struct InputOutputAttachmentDescription {
    pub identifier: u64,
    pub subresource_range: ImageSubresourceRange,
    pub flags: AttachmentFlags,
}

/// Attachment handed off to later stages, with the layout it leaves the
/// stage in.
#[derive(Debug, Clone)]
pub struct OutputAttachmentDescription {
    pub identifier: u64,
    pub subresource_range: ImageSubresourceRange,
    pub final_layout: ImageLayout,
}
