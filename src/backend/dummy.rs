//! Dummy backend: host-memory resources and a recording command encoder.
//!
//! Buffers are backed by real host memory and copy commands execute
//! immediately at record time, so host-readback round trips are testable
//! without a GPU. Everything else records into a command list the tests
//! can inspect.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::state::{BufferMemoryBarrier, ImageMemoryBarrier};
use crate::types::{BufferCopy, BufferImageCopy, Extent3d, ImageBlit, ImageCopy};

/// Host-memory buffer standing in for a device buffer.
#[derive(Clone)]
pub struct DummyBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl DummyBuffer {
    pub fn new(size: u64) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0; size as usize])),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }

    /// Copy bytes out of the buffer.
    pub fn read(&self, offset: u64, length: u64) -> Vec<u8> {
        let data = self.data.lock();
        data[offset as usize..(offset + length) as usize].to_vec()
    }

    /// Copy bytes into the buffer.
    pub fn write(&self, offset: u64, bytes: &[u8]) {
        let mut data = self.data.lock();
        data[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
    }

    /// Run `f` over a mutable window of the buffer, as a host mapping would.
    pub fn with_mapped<R>(&self, offset: u64, length: u64, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.data.lock();
        f(&mut data[offset as usize..(offset + length) as usize])
    }
}

impl std::fmt::Debug for DummyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBuffer")
            .field("size", &self.size())
            .finish()
    }
}

/// Host-side stand-in for a device image. Carries only the metadata the
/// encoders validate against.
#[derive(Debug, Clone)]
pub struct DummyImage {
    pub extent: Extent3d,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl DummyImage {
    pub fn new(extent: Extent3d, mip_levels: u32, array_layers: u32) -> Self {
        Self {
            extent,
            mip_levels,
            array_layers,
        }
    }
}

/// One recorded encoder command, inspectable by tests.
#[derive(Debug, Clone)]
pub enum RecordedCommand {
    BindComputePipeline {
        pipeline_id: u64,
    },
    BindDescriptorSets {
        first_set: u32,
        set_count: usize,
    },
    Dispatch {
        groups: [u32; 3],
    },
    DispatchIndirect {
        offset: u64,
    },
    CopyBuffer {
        regions: Vec<BufferCopy>,
    },
    CopyImage {
        regions: Vec<ImageCopy>,
    },
    CopyBufferToImage {
        regions: Vec<BufferImageCopy>,
    },
    CopyImageToBuffer {
        regions: Vec<BufferImageCopy>,
    },
    BlitImage {
        regions: Vec<ImageBlit>,
    },
    PipelineBarrier {
        image_barriers: Vec<ImageMemoryBarrier>,
        buffer_barriers: Vec<BufferMemoryBarrier>,
    },
    BuildAccelerationStructure {
        primitive_count: u32,
    },
    SetDebugName {
        name: String,
    },
    BeginDebugMarker {
        label: String,
    },
    EndDebugMarker,
}

/// Recording command encoder. Cloning shares the underlying command list.
#[derive(Debug, Clone, Default)]
pub struct DummyEncoder {
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
}

impl DummyEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: RecordedCommand) {
        self.commands.lock().push(command);
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().len()
    }

    /// Drain the recorded commands, leaving the encoder empty.
    pub fn take_commands(&self) -> Vec<RecordedCommand> {
        std::mem::take(&mut *self.commands.lock())
    }
}

/// Execute one buffer copy region against host memory.
pub(crate) fn execute_buffer_copy(source: &DummyBuffer, destination: &DummyBuffer, region: &BufferCopy) {
    let bytes = source.read(region.source_offset, region.size);
    destination.write(region.destination_offset, &bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_read_write() {
        let buffer = DummyBuffer::new(16);
        buffer.write(4, &[1, 2, 3, 4]);
        assert_eq!(buffer.read(4, 4), vec![1, 2, 3, 4]);
        assert_eq!(buffer.read(0, 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_execute_buffer_copy() {
        let source = DummyBuffer::new(8);
        let destination = DummyBuffer::new(8);
        source.write(0, &[9, 8, 7, 6]);
        execute_buffer_copy(&source, &destination, &BufferCopy::new(0, 4, 4));
        assert_eq!(destination.read(4, 4), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_encoder_records_in_order() {
        let encoder = DummyEncoder::new();
        encoder.push(RecordedCommand::Dispatch { groups: [1, 1, 1] });
        encoder.push(RecordedCommand::EndDebugMarker);
        let commands = encoder.take_commands();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], RecordedCommand::Dispatch { .. }));
        assert_eq!(encoder.command_count(), 0);
    }
}
