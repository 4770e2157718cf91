//! Free-sector map: one bit per sector, set while the sector is owned by
//! a header, chain node or data block. The map itself persists as an
//! ordinary file (its header at a well-known sector), so snapshots are
//! fetched and written back through an [`OpenFile`].

use alloc::vec;
use alloc::vec::Vec;

use crate::error::Error;
use crate::open_file::OpenFile;

/// One group of 64 allocation bits.
type BitGroup = u64;

const GROUP_BITS: usize = BitGroup::BITS as usize;

/// In-memory snapshot of the free-sector map.
#[derive(Debug, Clone)]
pub struct FreeMap {
    groups: Vec<BitGroup>,
    /// Number of sectors tracked; bit `i` covers sector `i`.
    sectors: usize,
}

impl FreeMap {
    /// Fresh map with every sector free.
    pub fn new(sectors: usize) -> Self {
        Self {
            groups: vec![0; sectors.div_ceil(GROUP_BITS)],
            sectors,
        }
    }

    /// Loads a snapshot from the map's backing file. The file length
    /// defines the tracked range: one bit per sector, packed
    /// little-endian.
    pub fn fetch_from(file: &OpenFile) -> Result<Self, Error> {
        let mut bytes = vec![0u8; file.len() as usize];
        if file.read_at(0, &mut bytes)? != bytes.len() {
            return Err(Error::Corrupted);
        }

        let groups = bytes
            .chunks(GROUP_BITS / 8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw[..chunk.len()].copy_from_slice(chunk);
                BitGroup::from_le_bytes(raw)
            })
            .collect();

        Ok(Self {
            groups,
            sectors: bytes.len() * 8,
        })
    }

    /// Persists the snapshot into the map's backing file.
    pub fn write_back(&self, file: &mut OpenFile) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(self.groups.len() * 8);
        for group in &self.groups {
            bytes.extend_from_slice(&group.to_le_bytes());
        }

        if file.write_at(0, &bytes)? != bytes.len() {
            return Err(Error::Corrupted);
        }
        Ok(())
    }

    pub fn is_free(&self, sector: u32) -> bool {
        if sector as usize >= self.sectors {
            return false;
        }
        let (group, bit) = self.position(sector);
        self.groups[group] & (1 << bit) == 0
    }

    /// Claims a specific sector.
    pub fn mark(&mut self, sector: u32) -> Result<(), Error> {
        if sector as usize >= self.sectors {
            return Err(Error::Corrupted);
        }
        let (group, bit) = self.position(sector);
        self.groups[group] |= 1 << bit;
        Ok(())
    }

    /// Releases a sector. The sector must currently be marked used.
    pub fn clear(&mut self, sector: u32) -> Result<(), Error> {
        if sector as usize >= self.sectors {
            return Err(Error::Corrupted);
        }
        let (group, bit) = self.position(sector);
        if self.groups[group] & (1 << bit) == 0 {
            return Err(Error::Corrupted);
        }
        self.groups[group] -= 1 << bit;
        Ok(())
    }

    /// Claims the lowest-numbered free sector, or returns `None` when
    /// the map is exhausted.
    pub fn find_and_set(&mut self) -> Option<u32> {
        let (group_index, ingroup_index) =
            self.groups
                .iter()
                .enumerate()
                .find_map(|(group_index, &bits)| {
                    (bits != BitGroup::MAX).then_some((group_index, bits.trailing_ones() as usize))
                })?;

        let sector = group_index * GROUP_BITS + ingroup_index;
        if sector >= self.sectors {
            return None;
        }

        self.groups[group_index] |= 1 << ingroup_index;
        Some(sector as u32)
    }

    /// Number of sectors still free.
    pub fn num_clear(&self) -> usize {
        let used: u32 = self.groups.iter().map(|bits| bits.count_ones()).sum();
        self.sectors - used as usize
    }

    #[inline]
    fn position(&self, sector: u32) -> (usize, usize) {
        (sector as usize / GROUP_BITS, sector as usize % GROUP_BITS)
    }
}
