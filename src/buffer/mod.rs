mod memory;
mod redis_list;
mod traits;

pub use memory::MemoryBuffer;
pub use redis_list::RedisBuffer;
pub use traits::{BufferError, BufferResult, SharedBuffer};
