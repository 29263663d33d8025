//! Fatbox keeps a small file store inside one ordinary host file (the container).
//! Files live in a flat namespace; "directories" are just shared name prefixes.
//!
//! Container layout (all integers big-endian):
//! - Superblock: 160 bytes of geometry at offset 0
//! - Allocation table: one i32 per data block
//! - Data blocks: `BLOCK_SIZE` bytes each, block 0 holding the root directory
//!
//! Each data block is free, the end of a chain, or points at the next block of
//! its chain. Every file (and the directory itself) is one such chain.
//!
//! Layers (from bottom to top):
//! 1. Block Device: byte-range I/O and the whole-container lock.   | `FileDevice`, or user implemented
//! 2. Superblock / Allocation table: geometry and block chains.     | Fs implemented
//! 3. Directory: name to metadata catalog, stored as a chain.       | Fs implemented
//! 4. FileSystem: create/append/overwrite/read/delete/move/compact. | Fs implemented
//!
//! There is no journal: a failure in the middle of an operation can leave the
//! on-disk table and directory disagreeing.

extern crate alloc;

mod config;
mod block_dev;
mod file_dev;
mod structs;
mod superblock;
mod fat;
mod directory;
mod fs;
mod error;

pub use block_dev::BlockDevice;
pub use file_dev::FileDevice;
pub use config::*;
pub use superblock::*;
pub use structs::*;
pub use fat::*;
pub use directory::*;
pub use fs::*;
pub use error::FsError as Error;
pub use error::Result;
