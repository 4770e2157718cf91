//! File headers (the i-node analog): the per-file record of byte length
//! and chain head, persisted in exactly one sector. Only a fixed prefix
//! of the sector is meaningful; the rest is reserved.
//!
//! A header comes into memory one of two ways: [`FileHeader::allocate`]
//! for a brand-new file, or [`FileHeader::fetch_from`] for one already
//! on disk.

use alloc::sync::Arc;
use core::mem;

use block_dev::BlockDevice;

use crate::error::Error;
use crate::layout::{FreeMap, SectorChain};
use crate::sector_cache;
use crate::{NUM_SECTORS, SECTOR_SIZE};

/// The serialized prefix of a header sector.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawHeader {
    num_bytes: u32,
    num_sectors: u32,
    chain_head: u32,
}

const _: () = assert!(mem::size_of::<RawHeader>() <= SECTOR_SIZE);

pub struct FileHeader {
    num_bytes: u32,
    num_sectors: u32,
    chain: SectorChain,
}

impl FileHeader {
    /// Builds a header for a new `num_bytes`-long file, drawing its data
    /// chain from `free_map`. Nothing is claimed on failure.
    pub fn allocate(free_map: &mut FreeMap, num_bytes: u32) -> Result<Self, Error> {
        let num_sectors = (num_bytes as usize).div_ceil(SECTOR_SIZE);
        let mut chain = SectorChain::empty();
        chain.allocate(free_map, num_sectors)?;

        Ok(Self {
            num_bytes,
            num_sectors: num_sectors as u32,
            chain,
        })
    }

    /// Releases the file's chain back to `free_map`. The header's own
    /// sector stays claimed; clearing it is the caller's explicit step.
    pub fn deallocate(&mut self, free_map: &mut FreeMap) -> Result<(), Error> {
        self.chain.deallocate(free_map)?;
        self.num_bytes = 0;
        self.num_sectors = 0;
        Ok(())
    }

    /// Reads the header stored at `sector` and rebuilds its chain.
    pub fn fetch_from(sector: u32, device: &Arc<dyn BlockDevice>) -> Result<Self, Error> {
        if sector as usize >= NUM_SECTORS {
            return Err(Error::Corrupted);
        }

        let raw = sector_cache::get(sector as usize, device.clone())
            .lock()
            .map(0, |raw: &RawHeader| *raw);
        if raw.num_sectors as usize != (raw.num_bytes as usize).div_ceil(SECTOR_SIZE) {
            return Err(Error::Corrupted);
        }

        let chain = SectorChain::fetch(raw.chain_head, device)?;
        if chain.len() != raw.num_sectors as usize {
            return Err(Error::Corrupted);
        }

        Ok(Self {
            num_bytes: raw.num_bytes,
            num_sectors: raw.num_sectors,
            chain,
        })
    }

    /// Writes the header prefix into `sector` and each chain node into
    /// its own sector.
    pub fn write_back(&self, sector: u32, device: &Arc<dyn BlockDevice>) {
        sector_cache::get(sector as usize, device.clone())
            .lock()
            .map_mut(0, |raw: &mut RawHeader| {
                *raw = RawHeader {
                    num_bytes: self.num_bytes,
                    num_sectors: self.num_sectors,
                    chain_head: self.chain.head(),
                }
            });
        self.chain.write_back(device);
    }

    /// Data sector holding the byte at `offset`. Offsets at or past the
    /// file length report [`Error::Corrupted`].
    pub fn sector_of(&self, offset: usize) -> Result<u32, Error> {
        if offset >= self.num_bytes as usize {
            return Err(Error::Corrupted);
        }
        self.chain.sector_at(offset / SECTOR_SIZE)
    }

    /// File length in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.num_bytes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bytes == 0
    }

    /// Data sectors backing the file.
    #[inline]
    pub fn sectors(&self) -> u32 {
        self.num_sectors
    }

    #[inline]
    pub fn chain(&self) -> &SectorChain {
        &self.chain
    }
}
