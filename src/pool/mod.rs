//! Memory pool management
//!
//! Pre-allocated session buffers for the request/response hot path.

mod buffer;

pub use buffer::{Buffer, BufferPool, BufferPoolStats, DEFAULT_BUFFER_SIZE};
