//! # On-disk data structure layer
//!
//! The disk carries four kinds of sectors, each with exactly one owner at
//! any time: free-map/file data, chain nodes, file headers, and directory
//! blocks. Sectors 0 and 1 hold the headers of the free-map file and the
//! root directory file.

mod bitmap;
pub use bitmap::FreeMap;

mod chain;
pub use chain::{SectorChain, CHAIN_SLOTS};

mod header;
pub use header::FileHeader;

/// Directory slot record, also part of the on-disk format
mod dir_entry;
pub use dir_entry::{DirEntry, NAME_MAX_LEN};
