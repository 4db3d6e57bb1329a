//! Coordination store adapters.
//!
//! Each adapter implements [`Backend`](crate::ratelimit::Backend) for one
//! kind of store client.

mod memory;
mod redis_store;
pub mod script;

pub use memory::MemoryBackend;
pub use redis_store::RedisBackend;
