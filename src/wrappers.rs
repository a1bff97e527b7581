//! Render pass and framebuffer owners.
//!
//! Thin owners around the native pass objects a render stage records
//! into. Like buffers, they require an explicit `destroy` before drop
//! and tolerate repeated destroys.

use crate::backend::ImageMappingView;
use crate::types::Extent3d;

/// Native render pass handle, backend-tagged.
#[derive(Debug, Clone, Default)]
pub enum RenderPassView {
    #[default]
    Null,
    Dummy,
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        render_pass: ash::vk::RenderPass,
    },
}

impl RenderPassView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Owner of a native render pass.
#[derive(Debug)]
pub struct RenderPass {
    view: RenderPassView,
}

impl RenderPass {
    pub fn new(view: RenderPassView) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &RenderPassView {
        &self.view
    }

    pub fn is_valid(&self) -> bool {
        self.view.is_valid()
    }

    /// Release the native pass. Safe to call on an already-null handle.
    pub fn destroy(&mut self) {
        match std::mem::take(&mut self.view) {
            RenderPassView::Null | RenderPassView::Dummy => {}
            #[cfg(feature = "vulkan-backend")]
            RenderPassView::Vulkan {
                device,
                render_pass,
            } => unsafe {
                device.destroy_render_pass(render_pass, None);
            },
        }
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        debug_assert!(!self.view.is_valid(), "render pass dropped without destroy()");
    }
}

/// Owner of a framebuffer: the attachment views bound to one render
/// pass at one extent.
#[derive(Debug)]
pub struct Framebuffer {
    attachments: Vec<ImageMappingView>,
    extent: Extent3d,
    valid: bool,
}

impl Framebuffer {
    pub fn new(attachments: Vec<ImageMappingView>, extent: Extent3d) -> Self {
        debug_assert!(attachments.iter().all(|a| a.is_valid()));
        Self {
            attachments,
            extent,
            valid: true,
        }
    }

    pub fn attachments(&self) -> &[ImageMappingView] {
        &self.attachments
    }

    pub fn extent(&self) -> Extent3d {
        self.extent
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Release the attachment views. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.attachments.clear();
        self.valid = false;
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        debug_assert!(!self.valid, "framebuffer dropped without destroy()");
    }
}
