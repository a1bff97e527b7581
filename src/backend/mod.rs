//! Backend-tagged resource views.
//!
//! Views are thin, non-owning handles around exactly one native object.
//! Exactly one native backend is expected per build; the enums carry
//! cfg-gated variants so there is no dynamic dispatch on the hot path.
//!
//! # Available Backends
//!
//! - `dummy` (default): recording backend backed by host memory, used by
//!   the test suite and headless runs
//! - `wgpu-backend`: cross-platform backend using wgpu
//! - `vulkan-backend`: native Vulkan backend using ash
//!
//! A `Null` variant stands for "no resource"; `is_valid()` distinguishes
//! it and is the vehicle for reporting resource exhaustion without panics.

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

use std::sync::Arc;

#[cfg(feature = "vulkan-backend")]
use ash::vk;

/// Non-owning view of a device buffer.
#[derive(Debug, Clone, Default)]
pub enum BufferView {
    #[default]
    Null,
    /// Dummy backend buffer backed by host memory.
    Dummy(dummy::DummyBuffer),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Buffer>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::Buffer),
}

impl BufferView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }

    #[cfg(feature = "vulkan-backend")]
    pub fn vulkan(&self) -> vk::Buffer {
        match self {
            Self::Vulkan(buffer) => *buffer,
            _ => vk::Buffer::null(),
        }
    }
}

/// Non-owning view of a device image.
#[derive(Debug, Clone, Default)]
pub enum ImageView {
    #[default]
    Null,
    Dummy(dummy::DummyImage),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Texture>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::Image),
}

impl ImageView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }

    #[cfg(feature = "vulkan-backend")]
    pub fn vulkan(&self) -> vk::Image {
        match self {
            Self::Vulkan(image) => *image,
            _ => vk::Image::null(),
        }
    }
}

/// Non-owning view of a native image view (a mapping of an image's
/// subresources usable as an attachment or shader resource).
#[derive(Debug, Clone, Default)]
pub enum ImageMappingView {
    #[default]
    Null,
    Dummy(dummy::DummyImage),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::TextureView>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::ImageView),
}

impl ImageMappingView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Non-owning view of a sampler.
#[derive(Debug, Clone, Default)]
pub enum SamplerView {
    #[default]
    Null,
    Dummy,
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Sampler>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::Sampler),
}

impl SamplerView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Non-owning view of a compute pipeline.
#[derive(Debug, Clone, Default)]
pub enum PipelineView {
    #[default]
    Null,
    Dummy {
        id: u64,
    },
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::ComputePipeline>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::Pipeline),
}

impl PipelineView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Non-owning view of an acceleration structure.
///
/// wgpu has no acceleration structures, so only the dummy and Vulkan
/// backends can produce a valid view.
#[derive(Debug, Clone, Default)]
pub enum AccelerationStructureView {
    #[default]
    Null,
    Dummy,
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vk::AccelerationStructureKHR),
}

impl AccelerationStructureView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Non-owning view of a GPU-GPU synchronization semaphore.
///
/// Submission planning is a host-side concern, so semaphores carry no
/// native handle yet; a queue layer that consumes `SubmissionPlan`s
/// would add its backend variants here.
#[derive(Debug, Clone, Default)]
pub enum SemaphoreView {
    #[default]
    Null,
    Dummy,
}

impl SemaphoreView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Non-owning view of a CPU-GPU synchronization fence.
///
/// Like [`SemaphoreView`], fences are host-side planning state until a
/// queue layer submits the plans natively.
#[derive(Debug, Clone, Default)]
pub enum FenceView {
    #[default]
    Null,
    /// Dummy fences signal on submission.
    Dummy(Arc<std::sync::atomic::AtomicBool>),
}

impl FenceView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Non-owning view of a command encoder (native command buffer).
///
/// This is the entry point for recording: `begin_*` methods in the
/// `encoder` module produce the per-purpose encoders.
#[derive(Debug, Clone, Default)]
pub enum CommandEncoderView {
    #[default]
    Null,
    /// Dummy encoder records commands into a shared list and executes
    /// buffer copies immediately against host memory.
    Dummy(dummy::DummyEncoder),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<parking_lot::Mutex<wgpu::CommandEncoder>>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        command_buffer: vk::CommandBuffer,
    },
}

impl CommandEncoderView {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Null)
    }
}

static_assertions::assert_impl_all!(BufferView: Send, Sync);
static_assertions::assert_impl_all!(ImageView: Send, Sync);
static_assertions::assert_impl_all!(SemaphoreView: Send, Sync);
static_assertions::assert_impl_all!(FenceView: Send, Sync);
