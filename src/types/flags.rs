//! Access, pipeline-stage and image-aspect flag sets.

use bitflags::bitflags;

bitflags! {
    /// Memory access kinds a command may perform on a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
        const SHADER_WRITE = 1 << 6;
        const COLOR_ATTACHMENT_READ = 1 << 7;
        const COLOR_ATTACHMENT_WRITE = 1 << 8;
        const DEPTH_STENCIL_READ = 1 << 9;
        const DEPTH_STENCIL_WRITE = 1 << 10;
        const TRANSFER_READ = 1 << 11;
        const TRANSFER_WRITE = 1 << 12;
        const HOST_READ = 1 << 13;
        const HOST_WRITE = 1 << 14;
        const ACCELERATION_STRUCTURE_READ = 1 << 15;
        const ACCELERATION_STRUCTURE_WRITE = 1 << 16;
    }
}

impl AccessFlags {
    /// Whether any flag in the set implies a write.
    pub fn has_writes(self) -> bool {
        self.intersects(
            Self::SHADER_WRITE
                | Self::COLOR_ATTACHMENT_WRITE
                | Self::DEPTH_STENCIL_WRITE
                | Self::TRANSFER_WRITE
                | Self::HOST_WRITE
                | Self::ACCELERATION_STRUCTURE_WRITE,
        )
    }
}

bitflags! {
    /// Pipeline stages used as barrier scopes and semaphore wait masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStageFlags: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const GEOMETRY_SHADER = 1 << 4;
        const FRAGMENT_SHADER = 1 << 5;
        const EARLY_FRAGMENT_TESTS = 1 << 6;
        const LATE_FRAGMENT_TESTS = 1 << 7;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 8;
        const COMPUTE_SHADER = 1 << 9;
        const TRANSFER = 1 << 10;
        const HOST = 1 << 11;
        const ACCELERATION_STRUCTURE_BUILD = 1 << 12;
        const RAY_TRACING_SHADER = 1 << 13;
        const BOTTOM_OF_PIPE = 1 << 14;
    }
}

bitflags! {
    /// Aspects of an image a subresource range addresses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspectFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl ImageAspectFlags {
    pub const DEPTH_STENCIL: Self = Self::DEPTH.union(Self::STENCIL);

    /// Number of distinct aspect planes in the set.
    pub fn plane_count(self) -> u8 {
        self.bits().count_ones() as u8
    }
}
