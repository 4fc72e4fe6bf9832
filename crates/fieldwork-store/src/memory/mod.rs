mod store;

pub use store::{MemoryCollection, MemoryStore};
