//! # Directory layer
//!
//! A [`Directory`] is a fixed-capacity table of `(name, header sector,
//! is-directory)` slots, persisted wholesale as the byte contents of an
//! ordinary file. Capacity is set when the directory's file is sized and
//! never changes; removal vacates a slot in place.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use crate::error::Error;
use crate::layout::{DirEntry, FreeMap};
use crate::open_file::OpenFile;
use crate::NUM_SECTORS;

pub struct Directory {
    entries: Vec<DirEntry>,
}

/// One row of a recursive listing.
#[derive(Debug)]
pub struct ListEntry {
    pub name: String,
    /// Nesting level; root entries are at 0.
    pub depth: usize,
    pub is_dir: bool,
    /// Sector of the entry's file header.
    pub sector: u32,
    /// Whether that sector is marked used in the free map. A live entry
    /// over a free sector points at damage.
    pub allocated: bool,
}

impl Directory {
    /// Empty table with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![DirEntry::default(); capacity],
        }
    }

    /// Loads the whole entry array from the directory's backing file;
    /// the file length fixes the capacity.
    pub fn fetch_from(file: &OpenFile) -> Result<Self, Error> {
        let capacity = file.len() as usize / DirEntry::SIZE;
        let mut entries = vec![DirEntry::default(); capacity];

        for (index, entry) in entries.iter_mut().enumerate() {
            if file.read_at(index * DirEntry::SIZE, entry.as_bytes_mut())? != DirEntry::SIZE {
                return Err(Error::Corrupted);
            }
        }

        Ok(Self { entries })
    }

    /// Stores the whole entry array into the directory's backing file.
    pub fn write_back(&self, file: &mut OpenFile) -> Result<(), Error> {
        for (index, entry) in self.entries.iter().enumerate() {
            if file.write_at(index * DirEntry::SIZE, entry.as_bytes())? != DirEntry::SIZE {
                return Err(Error::Corrupted);
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&DirEntry> {
        self.entries
            .iter()
            .find(|entry| !entry.is_vacant() && entry.name() == name)
    }

    /// Fills a vacant slot with a new entry.
    pub fn add(&mut self, name: &str, sector: u32, is_dir: bool) -> Result<(), Error> {
        if self.find(name).is_some() {
            return Err(Error::AlreadyExists);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|entry| entry.is_vacant())
            .ok_or(Error::DirectoryFull)?;

        *slot = DirEntry::new(name, sector, is_dir);
        Ok(())
    }

    /// Vacates the named slot without compacting the table.
    pub fn remove(&mut self, name: &str) -> Result<(), Error> {
        self.entries
            .iter_mut()
            .find(|entry| !entry.is_vacant() && entry.name() == name)
            .map(DirEntry::vacate)
            .ok_or(Error::NotFound)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(DirEntry::is_vacant)
    }

    /// Occupied entries, in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|entry| !entry.is_vacant())
    }

    /// Appends this table's entries to `out` and descends into
    /// subdirectories, annotating each row with the free-map status of
    /// its header sector.
    pub fn list_recursively(
        &self,
        free_map: &FreeMap,
        depth: usize,
        device: &Arc<dyn BlockDevice>,
        out: &mut Vec<ListEntry>,
    ) -> Result<(), Error> {
        // a directory graph deeper than the sector count must be cyclic
        if depth > NUM_SECTORS {
            return Err(Error::Corrupted);
        }

        for entry in self.entries() {
            out.push(ListEntry {
                name: String::from(entry.name()),
                depth,
                is_dir: entry.is_dir(),
                sector: entry.sector(),
                allocated: !free_map.is_free(entry.sector()),
            });

            if entry.is_dir() {
                let file = OpenFile::open(entry.sector(), device.clone())?;
                Self::fetch_from(&file)?.list_recursively(free_map, depth + 1, device, out)?;
            }
        }

        Ok(())
    }
}
