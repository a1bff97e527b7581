//! Block-based device memory pool.
//!
//! One sub-pool per memory flag set. Sub-pool lookup happens under the
//! shared lock; the first allocation for a new flag set escalates to the
//! exclusive lock with a second lookup, so concurrent first allocations
//! cannot create the sub-pool twice.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use bitflags::bitflags;

bitflags! {
    /// Memory placement and visibility requirements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryFlags: u32 {
        const DEVICE_LOCAL = 1 << 0;
        const HOST_VISIBLE = 1 << 1;
        const HOST_COHERENT = 1 << 2;
    }
}

/// A slice of a memory block handed out by the pool.
///
/// `INVALID` (zero size) reports exhaustion; the pool never panics on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemoryAllocation {
    pub memory_flags: MemoryFlags,
    pub block_index: u32,
    pub offset: u64,
    pub size: u64,
}

impl DeviceMemoryAllocation {
    pub const INVALID: Self = Self {
        memory_flags: MemoryFlags::empty(),
        block_index: 0,
        offset: 0,
        size: 0,
    };

    pub fn is_valid(&self) -> bool {
        self.size != 0
    }
}

#[derive(Debug)]
struct Block {
    cursor: u64,
    freed_bytes: u64,
}

#[derive(Debug, Default)]
struct SubPool {
    blocks: Vec<Block>,
}

/// Pool of device memory blocks, bump-allocated per block. A block is
/// recycled once every byte allocated from it has been freed.
pub struct DeviceMemoryPool {
    block_size: u64,
    max_blocks: usize,
    sub_pools: RwLock<HashMap<MemoryFlags, Arc<Mutex<SubPool>>>>,
}

impl DeviceMemoryPool {
    pub fn new(block_size: u64, max_blocks: usize) -> Self {
        assert!(block_size > 0 && max_blocks > 0);
        Self {
            block_size,
            max_blocks,
            sub_pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    fn sub_pool(&self, memory_flags: MemoryFlags) -> Arc<Mutex<SubPool>> {
        if let Some(pool) = self.sub_pools.read().get(&memory_flags) {
            return pool.clone();
        }
        let mut pools = self.sub_pools.write();
        // Second lookup: another thread may have inserted while we waited.
        pools
            .entry(memory_flags)
            .or_insert_with(|| Arc::new(Mutex::new(SubPool::default())))
            .clone()
    }

    /// Allocate `size` bytes at `alignment`. Returns
    /// [`DeviceMemoryAllocation::INVALID`] when the request exceeds the
    /// block size or every block is full and the block budget is spent.
    pub fn allocate(
        &self,
        memory_flags: MemoryFlags,
        size: u64,
        alignment: u64,
    ) -> DeviceMemoryAllocation {
        debug_assert!(alignment.is_power_of_two());
        if size == 0 || size > self.block_size {
            return DeviceMemoryAllocation::INVALID;
        }
        let sub_pool = self.sub_pool(memory_flags);
        let mut sub_pool = sub_pool.lock();
        for (block_index, block) in sub_pool.blocks.iter_mut().enumerate() {
            let offset = align_up(block.cursor, alignment);
            if offset + size <= self.block_size {
                block.cursor = offset + size;
                return DeviceMemoryAllocation {
                    memory_flags,
                    block_index: block_index as u32,
                    offset,
                    size,
                };
            }
        }
        if sub_pool.blocks.len() >= self.max_blocks {
            log::warn!(
                "memory pool exhausted: {} blocks of {} bytes in use for {:?}",
                sub_pool.blocks.len(),
                self.block_size,
                memory_flags
            );
            return DeviceMemoryAllocation::INVALID;
        }
        sub_pool.blocks.push(Block {
            cursor: size,
            freed_bytes: 0,
        });
        DeviceMemoryAllocation {
            memory_flags,
            block_index: (sub_pool.blocks.len() - 1) as u32,
            offset: 0,
            size,
        }
    }

    /// Return an allocation to its block. Recycles the block when all of
    /// its bytes are back.
    pub fn free(&self, allocation: DeviceMemoryAllocation) {
        if !allocation.is_valid() {
            return;
        }
        let sub_pool = self.sub_pool(allocation.memory_flags);
        let mut sub_pool = sub_pool.lock();
        let block = &mut sub_pool.blocks[allocation.block_index as usize];
        block.freed_bytes += allocation.size;
        debug_assert!(block.freed_bytes <= block.cursor);
        if block.freed_bytes == block.cursor {
            block.cursor = 0;
            block.freed_bytes = 0;
        }
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

static_assertions::assert_impl_all!(DeviceMemoryPool: Send, Sync);
