//! Stores included with `hub_storage`.

mod memory_store;

pub use memory_store::MemoryStore;
