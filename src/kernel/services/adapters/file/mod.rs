//! File-system providers.

pub mod local;
pub mod memory;

pub use local::LocalFsProvider;
pub use memory::MemoryFsProvider;
