//! Join state storage
//!
//! The shared join topology stores partial joins as lists in an external
//! store reached through [`ListStore`].

pub mod backend;
pub mod memory;
pub mod redis_backend;

pub use backend::ListStore;
pub use memory::MemoryListStore;
pub use redis_backend::{RedisConfig, RedisListStore};
