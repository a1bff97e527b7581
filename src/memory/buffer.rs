//! Buffer ownership and host mapping.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::{dummy::DummyBuffer, BufferView};
use crate::memory::pool::{DeviceMemoryAllocation, DeviceMemoryPool, MemoryFlags};

bitflags! {
    /// Declared uses of a buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsageFlags: u32 {
        const TRANSFER_SOURCE = 1 << 0;
        const TRANSFER_DESTINATION = 1 << 1;
        const VERTEX = 1 << 2;
        const INDEX = 1 << 3;
        const UNIFORM = 1 << 4;
        const STORAGE = 1 << 5;
        const INDIRECT = 1 << 6;
    }
}

bitflags! {
    /// Runtime state bits, updated atomically.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferStateFlags: u32 {
        const HOST_MAPPABLE = 1 << 0;
        const MAPPING_IN_FLIGHT = 1 << 1;
    }
}

/// Outcome reported to a host-mapping callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMemoryStatus {
    Success,
    MapFailed,
}

/// Owner of a device buffer and its pool allocation.
///
/// Buffers are move-only. `destroy` must be called before drop; calling
/// it again once the handle is null is a safe no-op. Native backends
/// create the underlying view through their device and hand it to
/// [`Buffer::from_parts`]; the typed constructors build host-memory
/// buffers for the recording backend.
pub struct Buffer {
    view: BufferView,
    allocation: DeviceMemoryAllocation,
    pool: Arc<DeviceMemoryPool>,
    size: u64,
    usage: BufferUsageFlags,
    state: AtomicU32,
}

impl Buffer {
    /// Wrap an already-created backend buffer.
    pub fn from_parts(
        pool: &Arc<DeviceMemoryPool>,
        view: BufferView,
        allocation: DeviceMemoryAllocation,
        size: u64,
        usage: BufferUsageFlags,
    ) -> Self {
        let host_mappable = allocation
            .memory_flags
            .contains(MemoryFlags::HOST_VISIBLE);
        let state = if host_mappable {
            BufferStateFlags::HOST_MAPPABLE.bits()
        } else {
            0
        };
        Self {
            view,
            allocation,
            pool: pool.clone(),
            size,
            usage,
            state: AtomicU32::new(state),
        }
    }

    /// Create a host-memory buffer on the recording backend. Returns a
    /// buffer with an invalid view when the pool is exhausted.
    pub fn new(
        pool: &Arc<DeviceMemoryPool>,
        size: u64,
        usage: BufferUsageFlags,
        memory_flags: MemoryFlags,
    ) -> Self {
        let allocation = pool.allocate(memory_flags, size, 256);
        let view = if allocation.is_valid() {
            BufferView::Dummy(DummyBuffer::new(size))
        } else {
            BufferView::Null
        };
        Self::from_parts(pool, view, allocation, size, usage)
    }

    /// Host-visible staging buffer for uploads.
    pub fn new_staging(pool: &Arc<DeviceMemoryPool>, size: u64) -> Self {
        Self::new(
            pool,
            size,
            BufferUsageFlags::TRANSFER_SOURCE,
            MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
        )
    }

    pub fn new_vertex(pool: &Arc<DeviceMemoryPool>, size: u64) -> Self {
        Self::new(
            pool,
            size,
            BufferUsageFlags::VERTEX | BufferUsageFlags::TRANSFER_DESTINATION,
            MemoryFlags::DEVICE_LOCAL,
        )
    }

    pub fn new_index(pool: &Arc<DeviceMemoryPool>, size: u64) -> Self {
        Self::new(
            pool,
            size,
            BufferUsageFlags::INDEX | BufferUsageFlags::TRANSFER_DESTINATION,
            MemoryFlags::DEVICE_LOCAL,
        )
    }

    pub fn new_uniform(pool: &Arc<DeviceMemoryPool>, size: u64) -> Self {
        Self::new(
            pool,
            size,
            BufferUsageFlags::UNIFORM | BufferUsageFlags::TRANSFER_DESTINATION,
            MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
        )
    }

    pub fn new_storage(pool: &Arc<DeviceMemoryPool>, size: u64) -> Self {
        Self::new(
            pool,
            size,
            BufferUsageFlags::STORAGE
                | BufferUsageFlags::TRANSFER_SOURCE
                | BufferUsageFlags::TRANSFER_DESTINATION,
            MemoryFlags::DEVICE_LOCAL | MemoryFlags::HOST_VISIBLE,
        )
    }

    pub fn view(&self) -> &BufferView {
        &self.view
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsageFlags {
        self.usage
    }

    pub fn state(&self) -> BufferStateFlags {
        BufferStateFlags::from_bits_truncate(self.state.load(Ordering::Acquire))
    }

    pub fn is_valid(&self) -> bool {
        self.view.is_valid()
    }

    /// Release the backend buffer and return the allocation to the pool.
    /// Safe to call more than once.
    pub fn destroy(&mut self) {
        if !self.view.is_valid() {
            return;
        }
        log::trace!("destroying buffer of {} bytes", self.size);
        self.pool.free(self.allocation);
        self.allocation = DeviceMemoryAllocation::INVALID;
        self.view = BufferView::Null;
    }

    /// Map `[offset, offset + size)` for host access and run `callback`
    /// over the mapped bytes.
    ///
    /// Returns whether the callback ran asynchronously; failure is
    /// reported through the callback as [`MapMemoryStatus::MapFailed`]
    /// with an empty slice. A second mapping while one is in flight
    /// fails. Only host-backed views map today; native backends fail the
    /// callback until their mapping paths are wired.
    pub fn map_to_host_memory_async<F>(&self, offset: u64, size: u64, callback: F) -> bool
    where
        F: FnOnce(MapMemoryStatus, &mut [u8], bool),
    {
        debug_assert!(offset + size <= self.size, "mapping range out of bounds");
        if !self.view.is_valid() || !self.state().contains(BufferStateFlags::HOST_MAPPABLE) {
            callback(MapMemoryStatus::MapFailed, &mut [], false);
            return false;
        }
        if !self.try_begin_mapping() {
            callback(MapMemoryStatus::MapFailed, &mut [], false);
            return false;
        }
        let executed_asynchronously = match &self.view {
            // Host memory maps immediately.
            BufferView::Dummy(buffer) => {
                buffer.with_mapped(offset, size, |bytes| {
                    callback(MapMemoryStatus::Success, bytes, false);
                });
                false
            }
            _ => {
                log::warn!("host mapping is not wired on this backend");
                callback(MapMemoryStatus::MapFailed, &mut [], false);
                false
            }
        };
        self.end_mapping();
        executed_asynchronously
    }

    /// Map and copy `bytes` to `destination_offset`. Returns whether the
    /// copy ran asynchronously.
    pub fn map_and_copy_from(&self, bytes: &[u8], destination_offset: u64) -> bool {
        debug_assert!(
            destination_offset + bytes.len() as u64 <= self.size,
            "copy range out of bounds"
        );
        self.map_to_host_memory_async(
            destination_offset,
            bytes.len() as u64,
            |status, mapped, _| {
                if status == MapMemoryStatus::Success {
                    mapped.copy_from_slice(bytes);
                }
            },
        )
    }

    /// Typed variant of [`map_and_copy_from`].
    ///
    /// [`map_and_copy_from`]: Self::map_and_copy_from
    pub fn map_and_copy_slice<T: bytemuck::NoUninit>(
        &self,
        items: &[T],
        destination_offset: u64,
    ) -> bool {
        self.map_and_copy_from(bytemuck::cast_slice(items), destination_offset)
    }

    fn try_begin_mapping(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if BufferStateFlags::from_bits_truncate(current)
                .contains(BufferStateFlags::MAPPING_IN_FLIGHT)
            {
                return false;
            }
            let next = current | BufferStateFlags::MAPPING_IN_FLIGHT.bits();
            if self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn end_mapping(&self) {
        self.state
            .fetch_and(!BufferStateFlags::MAPPING_IN_FLIGHT.bits(), Ordering::AcqRel);
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        debug_assert!(
            !self.view.is_valid(),
            "buffer dropped without destroy()"
        );
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size)
            .field("usage", &self.usage)
            .field("valid", &self.is_valid())
            .finish()
    }
}

static_assertions::assert_impl_all!(Buffer: Send, Sync);
