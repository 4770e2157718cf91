//! # File system service
//!
//! Maps textual paths onto headers, chains, directories and the free
//! map. Every file on disk is a header sector, a chain of data sectors,
//! and an entry in some directory table.
//!
//! The free map and the root directory are themselves ordinary files;
//! their headers sit at [`FREE_MAP_SECTOR`] and [`DIRECTORY_SECTOR`] and
//! both files stay open for the service's whole lifetime. Mutating
//! operations fetch a snapshot of the structures they touch, apply every
//! change in memory, and write everything back only on the success path;
//! a failed operation leaves the disk as it was. The one exception is
//! lazy directory creation during path resolution, where each new
//! directory persists immediately even if a later component fails.
//!
//! The service hands itself out behind a single `Mutex`; that lock is
//! the only concurrency protection, exactly one operation runs at a
//! time.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use log::debug;
use spin::Mutex;

use crate::directory::{Directory, ListEntry};
use crate::error::Error;
use crate::layout::{FileHeader, FreeMap, NAME_MAX_LEN};
use crate::open_file::OpenFile;
use crate::sector_cache;
use crate::{DirEntry, NUM_SECTORS};

/// Header sector of the free-map file, fixed so mount-time code can
/// find it without any lookup.
pub const FREE_MAP_SECTOR: u32 = 0;
/// Header sector of the root directory file.
pub const DIRECTORY_SECTOR: u32 = 1;

/// Slots per directory table, fixed when a directory's file is sized.
pub const DIR_ENTRY_COUNT: usize = 64;

const FREE_MAP_FILE_SIZE: usize = NUM_SECTORS / 8;
const DIRECTORY_FILE_SIZE: usize = DIR_ENTRY_COUNT * DirEntry::SIZE;

pub struct FileSystem {
    device: Arc<dyn BlockDevice>,
    free_map_file: OpenFile,
    directory_file: OpenFile,
}

impl FileSystem {
    /// Initializes an empty file system on `device`: claims the two
    /// well-known header sectors, allocates the free-map and root
    /// directory files, and writes both images out.
    pub fn format(device: Arc<dyn BlockDevice>) -> Result<Arc<Mutex<Self>>, Error> {
        debug!("formatting the file system");

        for sector in 0..NUM_SECTORS {
            sector_cache::get(sector, device.clone())
                .lock()
                .map_mut(0, |buf: &mut crate::SectorBuf| buf.fill(0));
        }

        let mut free_map = FreeMap::new(NUM_SECTORS);
        free_map.mark(FREE_MAP_SECTOR)?;
        free_map.mark(DIRECTORY_SECTOR)?;

        let map_header = FileHeader::allocate(&mut free_map, FREE_MAP_FILE_SIZE as u32)?;
        let dir_header = FileHeader::allocate(&mut free_map, DIRECTORY_FILE_SIZE as u32)?;

        // headers must hit the disk before the files can be opened
        map_header.write_back(FREE_MAP_SECTOR, &device);
        dir_header.write_back(DIRECTORY_SECTOR, &device);

        let mut free_map_file = OpenFile::open(FREE_MAP_SECTOR, device.clone())?;
        let mut directory_file = OpenFile::open(DIRECTORY_SECTOR, device.clone())?;

        free_map.write_back(&mut free_map_file)?;
        Directory::new(DIR_ENTRY_COUNT).write_back(&mut directory_file)?;
        sector_cache::sync_all();

        Ok(Arc::new(Mutex::new(Self {
            device,
            free_map_file,
            directory_file,
        })))
    }

    /// Opens an already-formatted device.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Arc<Mutex<Self>>, Error> {
        debug!("mounting the file system");

        let free_map_file = OpenFile::open(FREE_MAP_SECTOR, device.clone())?;
        let directory_file = OpenFile::open(DIRECTORY_SECTOR, device.clone())?;
        if free_map_file.len() as usize != FREE_MAP_FILE_SIZE {
            return Err(Error::Corrupted);
        }

        Ok(Arc::new(Mutex::new(Self {
            device,
            free_map_file,
            directory_file,
        })))
    }

    /// Creates a `num_bytes`-long file at `path`, lazily creating
    /// missing directories along the way. The size is final; files do
    /// not grow.
    pub fn create(&mut self, path: &str, num_bytes: u32) -> Result<(), Error> {
        let (dir_path, name) = split_path(path)?;
        debug!("create {path:?} ({num_bytes} bytes)");

        let dir_sector = self.resolve(dir_path, true)?;
        let mut dir_file = OpenFile::open(dir_sector, self.device.clone())?;
        let mut directory = Directory::fetch_from(&dir_file)?;

        if directory.find(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let mut free_map = FreeMap::fetch_from(&self.free_map_file)?;
        let header_sector = free_map.find_and_set().ok_or(Error::NoSpace)?;
        directory.add(name, header_sector, false)?;
        let header = FileHeader::allocate(&mut free_map, num_bytes)?;

        // success: persist header, table, then map
        header.write_back(header_sector, &self.device);
        directory.write_back(&mut dir_file)?;
        free_map.write_back(&mut self.free_map_file)?;
        sector_cache::sync_all();

        debug!("created {path:?} with header at sector {header_sector}");
        Ok(())
    }

    /// Opens the file at `path`. Missing intermediate directories are
    /// reported, not created.
    pub fn open(&mut self, path: &str) -> Result<OpenFile, Error> {
        let (dir_path, name) = split_path(path)?;

        let dir_sector = self.resolve(dir_path, false)?;
        let dir_file = OpenFile::open(dir_sector, self.device.clone())?;
        let directory = Directory::fetch_from(&dir_file)?;

        let sector = directory.find(name).ok_or(Error::NotFound)?.sector();
        debug!("open {path:?}: header at sector {sector}");
        OpenFile::open(sector, self.device.clone())
    }

    /// Deletes the file or empty directory at `path`, releasing its
    /// chain and header sectors.
    pub fn remove(&mut self, path: &str) -> Result<(), Error> {
        let (dir_path, name) = split_path(path)?;
        debug!("remove {path:?}");

        let dir_sector = self.resolve(dir_path, false)?;
        let mut dir_file = OpenFile::open(dir_sector, self.device.clone())?;
        let mut directory = Directory::fetch_from(&dir_file)?;

        let (sector, is_dir) = directory
            .find(name)
            .map(|entry| (entry.sector(), entry.is_dir()))
            .ok_or(Error::NotFound)?;

        if is_dir {
            let file = OpenFile::open(sector, self.device.clone())?;
            if !Directory::fetch_from(&file)?.is_empty() {
                return Err(Error::DirectoryNotEmpty);
            }
        }

        let mut header = FileHeader::fetch_from(sector, &self.device)?;
        let mut free_map = FreeMap::fetch_from(&self.free_map_file)?;
        header.deallocate(&mut free_map)?;
        free_map.clear(sector)?;
        directory.remove(name)?;

        free_map.write_back(&mut self.free_map_file)?;
        directory.write_back(&mut dir_file)?;
        sector_cache::sync_all();
        Ok(())
    }

    /// Names in the root directory, in slot order.
    pub fn list(&self) -> Result<Vec<String>, Error> {
        let directory = Directory::fetch_from(&self.directory_file)?;
        Ok(directory.entries().map(|e| String::from(e.name())).collect())
    }

    /// Full tree walk from the root, each row annotated with the
    /// free-map status of its header sector.
    pub fn list_recursively(&self) -> Result<Vec<ListEntry>, Error> {
        let free_map = FreeMap::fetch_from(&self.free_map_file)?;
        let directory = Directory::fetch_from(&self.directory_file)?;

        let mut rows = Vec::new();
        directory.list_recursively(&free_map, 0, &self.device, &mut rows)?;
        Ok(rows)
    }
}

impl FileSystem {
    /// Walks `dir_path` component by component from the root directory
    /// and returns the sector of the directory reached.
    ///
    /// With `create_missing`, absent components are created on the spot:
    /// one free-map snapshot is threaded through the whole walk, and
    /// each new directory (header, parent table, map, empty table image)
    /// is persisted immediately. Without it, an absent component is
    /// `NotFound`.
    fn resolve(&mut self, dir_path: &str, create_missing: bool) -> Result<u32, Error> {
        let mut free_map = if create_missing {
            Some(FreeMap::fetch_from(&self.free_map_file)?)
        } else {
            None
        };

        let mut current = DIRECTORY_SECTOR;
        for component in dir_path.split('/').filter(|c| !c.is_empty()) {
            if component.len() > NAME_MAX_LEN {
                return Err(Error::InvalidPath);
            }

            let mut dir_file = OpenFile::open(current, self.device.clone())?;
            let mut directory = Directory::fetch_from(&dir_file)?;
            let found = directory
                .find(component)
                .map(|entry| (entry.sector(), entry.is_dir()));

            current = match found {
                Some((sector, true)) => sector,
                // a plain file cannot be descended into
                Some((_, false)) => return Err(Error::InvalidPath),
                None => {
                    let Some(free_map) = free_map.as_mut() else {
                        return Err(Error::NotFound);
                    };

                    let sector = free_map.find_and_set().ok_or(Error::NoSpace)?;
                    let header = FileHeader::allocate(free_map, DIRECTORY_FILE_SIZE as u32)?;
                    directory.add(component, sector, true)?;

                    header.write_back(sector, &self.device);
                    directory.write_back(&mut dir_file)?;
                    free_map.write_back(&mut self.free_map_file)?;

                    // the fresh file still holds stale bytes; stamp an
                    // empty table over it
                    let mut new_dir_file = OpenFile::open(sector, self.device.clone())?;
                    Directory::new(DIR_ENTRY_COUNT).write_back(&mut new_dir_file)?;
                    sector_cache::sync_all();

                    debug!("created directory {component:?} at sector {sector}");
                    sector
                }
            };
        }

        Ok(current)
    }
}

/// Splits a path into its directory portion (through the last `/`) and
/// leaf name. Paths must be absolute and carry a non-empty leaf no
/// longer than [`NAME_MAX_LEN`] bytes.
fn split_path(path: &str) -> Result<(&str, &str), Error> {
    if !path.starts_with('/') {
        return Err(Error::InvalidPath);
    }

    // cannot miss: the path starts with '/'
    let cut = path.rfind('/').ok_or(Error::InvalidPath)?;
    let (dir_path, name) = path.split_at(cut + 1);
    if name.is_empty() || name.len() > NAME_MAX_LEN {
        return Err(Error::InvalidPath);
    }

    Ok((dir_path, name))
}
