//! Device memory pooling and buffer ownership.

mod buffer;
mod pool;

pub use buffer::{Buffer, BufferStateFlags, BufferUsageFlags, MapMemoryStatus};
pub use pool::{DeviceMemoryAllocation, DeviceMemoryPool, MemoryFlags};
