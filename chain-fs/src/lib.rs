//! Linked-chain file system: every file is a header sector plus a singly
//! linked chain of pointer sectors, each naming the data sectors that hold
//! the file's bytes. Free space is a one-bit-per-sector map; both the map
//! and the root directory live in ordinary files whose headers sit at
//! well-known sectors so they can be found at mount time.

#![no_std]

extern crate alloc;

/* overall architecture, top down */

// file system service: path resolution plus create/open/remove/list
mod fs;
pub use fs::{FileSystem, DIRECTORY_SECTOR, DIR_ENTRY_COUNT, FREE_MAP_SECTOR};

// open-file layer: byte-granular cursor over a header's sector chain
mod open_file;
pub use open_file::OpenFile;

// directory layer: fixed-capacity name -> header-sector tables
mod directory;
pub use directory::{Directory, ListEntry};

// on-disk data structures: free map, chain nodes, headers, entries
mod layout;
pub use layout::{DirEntry, FileHeader, FreeMap, SectorChain, CHAIN_SLOTS, NAME_MAX_LEN};

// sector cache: in-memory staging of device sectors
mod sector_cache;
pub use sector_cache::{flush, sync_all};

mod error;
pub use error::Error;

pub const SECTOR_SIZE: usize = 512;
pub const NUM_SECTORS: usize = 4096;

/// On-disk "no sector here" sentinel, used for chain links and vacant
/// chain slots.
pub const NULL_SECTOR: u32 = u32::MAX;

type SectorBuf = [u8; SECTOR_SIZE];
