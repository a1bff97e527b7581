//! Render-graph scheduler and cross-backend GPU command layer.
//!
//! The crate sits between a renderer's description of what to draw and
//! the native graphics API. A caller describes render/compute stages
//! with dependencies, attachments and resource bindings through the
//! [`framegraph`] builder; the [`stage`] graph schedules them per frame
//! with the fewest necessary semaphore waits; stage bodies record
//! through the [`encoder`] views, which consult the [`state`] tables to
//! emit minimal barriers.
//!
//! The active backend is chosen at compile time through cargo features
//! (`dummy`, `vulkan-backend`, `wgpu-backend`); view types carry one
//! variant per enabled backend so recording never branches per call.

pub mod backend;
pub mod descriptors;
pub mod encoder;
pub mod error;
pub mod framegraph;
pub mod memory;
pub mod stage;
pub mod state;
pub mod types;
pub mod wrappers;

pub use error::GraphicsError;

/// Crate version, for logs and capture-tool labels.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the backend this build records against.
pub fn active_backend_name() -> &'static str {
    if cfg!(feature = "vulkan-backend") {
        "vulkan"
    } else if cfg!(feature = "wgpu-backend") {
        "wgpu"
    } else {
        "dummy"
    }
}
