//! Output store backends
//!
//! - [`MemoryOutputStore`]: in-process, for tests and single-run tools
//! - [`FileOutputStore`]: one JSON file per record under a root directory

mod file;
mod memory;

pub use file::FileOutputStore;
pub use memory::MemoryOutputStore;
