//! Sector chains: a file's data sectors are named by a singly linked
//! list of pointer sectors. Each node fills exactly one sector with a
//! link to its successor followed by [`CHAIN_SLOTS`] data-sector slots.
//!
//! In memory a chain is an owned arena of nodes mirroring the on-disk
//! list; the "pointer" between nodes is always a sector number, so
//! teardown is an explicit walk, never recursive ownership.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;

use crate::error::Error;
use crate::layout::FreeMap;
use crate::sector_cache;
use crate::{NULL_SECTOR, NUM_SECTORS, SECTOR_SIZE};

/// Data-sector slots per node; the link pointer takes the rest.
pub const CHAIN_SLOTS: usize = (SECTOR_SIZE - mem::size_of::<u32>()) / mem::size_of::<u32>();

/// One on-disk unit of a chain.
///
/// Slots fill left to right with no gaps; every node except the last is
/// full, and only the last node carries `link == NULL_SECTOR`.
#[repr(C)]
#[derive(Clone)]
struct ChainNode {
    link: u32,
    slots: [u32; CHAIN_SLOTS],
}

// a node must occupy its sector exactly
const _: () = assert!(mem::size_of::<ChainNode>() == SECTOR_SIZE);

impl ChainNode {
    fn vacant() -> Self {
        Self {
            link: NULL_SECTOR,
            slots: [NULL_SECTOR; CHAIN_SLOTS],
        }
    }

    fn filled(&self) -> usize {
        self.slots
            .iter()
            .take_while(|&&slot| slot != NULL_SECTOR)
            .count()
    }
}

/// A file's linked sequence of pointer sectors.
pub struct SectorChain {
    /// Sector storing the first node, or `NULL_SECTOR` for a chain
    /// holding no data.
    head: u32,
    nodes: Vec<ChainNode>,
}

impl SectorChain {
    pub const fn empty() -> Self {
        Self {
            head: NULL_SECTOR,
            nodes: Vec::new(),
        }
    }

    #[inline]
    pub fn head(&self) -> u32 {
        self.head
    }

    /// Number of data sectors the chain points at.
    pub fn len(&self) -> usize {
        self.nodes.iter().map(ChainNode::filled).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == NULL_SECTOR
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Draws `num_sectors` data sectors plus the pointer sectors to hold
    /// them from `free_map`, strictly sequentially: a node's own storage
    /// first, then its slots, then the successor's storage.
    ///
    /// Fails with [`Error::NoSpace`] before claiming anything if the map
    /// cannot cover data and pointer sectors both.
    pub fn allocate(&mut self, free_map: &mut FreeMap, num_sectors: usize) -> Result<(), Error> {
        if self.head != NULL_SECTOR {
            return Err(Error::Corrupted);
        }
        if num_sectors == 0 {
            return Ok(());
        }

        let node_count = num_sectors.div_ceil(CHAIN_SLOTS);
        if free_map.num_clear() < num_sectors + node_count {
            return Err(Error::NoSpace);
        }

        // the count check above guarantees every claim below succeeds
        let mut remaining = num_sectors;
        let mut node = ChainNode::vacant();
        self.head = free_map.find_and_set().ok_or(Error::Corrupted)?;
        loop {
            let take = remaining.min(CHAIN_SLOTS);
            for slot in &mut node.slots[..take] {
                *slot = free_map.find_and_set().ok_or(Error::Corrupted)?;
            }
            remaining -= take;

            if remaining == 0 {
                self.nodes.push(node);
                break;
            }
            node.link = free_map.find_and_set().ok_or(Error::Corrupted)?;
            self.nodes.push(node);
            node = ChainNode::vacant();
        }

        log::trace!(
            "chain: {} data sectors over {} nodes from head {}",
            num_sectors,
            self.nodes.len(),
            self.head
        );
        Ok(())
    }

    /// Releases every data and pointer sector back to `free_map`,
    /// leaving the chain empty. A no-op on an already-empty chain.
    pub fn deallocate(&mut self, free_map: &mut FreeMap) -> Result<(), Error> {
        let mut storage = self.head;
        for node in &self.nodes {
            for slot in node.slots.iter().copied().take_while(|&s| s != NULL_SECTOR) {
                free_map.clear(slot)?;
            }
            free_map.clear(storage)?;
            storage = node.link;
        }

        self.head = NULL_SECTOR;
        self.nodes.clear();
        Ok(())
    }

    /// Rebuilds the in-memory arena by walking link pointers from
    /// `head`. Links out of range, or more nodes than the disk has
    /// sectors, mean a damaged image.
    pub fn fetch(head: u32, device: &Arc<dyn BlockDevice>) -> Result<Self, Error> {
        let mut nodes = Vec::new();
        let mut sector = head;
        while sector != NULL_SECTOR {
            if sector as usize >= NUM_SECTORS || nodes.len() >= NUM_SECTORS {
                return Err(Error::Corrupted);
            }
            let node = sector_cache::get(sector as usize, device.clone())
                .lock()
                .map(0, |node: &ChainNode| node.clone());
            sector = node.link;
            nodes.push(node);
        }

        Ok(Self { head, nodes })
    }

    /// Writes each node into its own sector.
    pub fn write_back(&self, device: &Arc<dyn BlockDevice>) {
        let mut sector = self.head;
        for node in &self.nodes {
            sector_cache::get(sector as usize, device.clone())
                .lock()
                .map_mut(0, |on_disk: &mut ChainNode| *on_disk = node.clone());
            sector = node.link;
        }
    }

    /// Data sector holding the `index`-th sector's worth of the file.
    /// An index past the chain's end is an invariant violation, never a
    /// silent wrong answer.
    pub fn sector_at(&self, index: usize) -> Result<u32, Error> {
        let node = self.nodes.get(index / CHAIN_SLOTS).ok_or(Error::Corrupted)?;
        let sector = node.slots[index % CHAIN_SLOTS];
        if sector == NULL_SECTOR || sector as usize >= NUM_SECTORS {
            return Err(Error::Corrupted);
        }
        Ok(sector)
    }
}
