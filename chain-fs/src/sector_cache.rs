//! # Sector cache layer
//!
//! Device I/O is slow next to memory, so sectors about to be touched are
//! staged in in-memory buffers first. Repeated requests for the same
//! sector return the already-cached copy.
//!
//! The cache is transparent to its users: all sector access goes through
//! it, and a sector being operated on is always resident. Syncing a
//! buffer back to the device does not evict it; eviction is scheduled by
//! the cache manager.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::SECTOR_SIZE;

static SECTOR_CACHE_MANAGER: Mutex<SectorCacheManager> = Mutex::new(SectorCacheManager::new());

/// Global cache bookkeeping: which sectors are resident, and which one
/// to evict when the cache is full.
struct SectorCacheManager {
    queue: Vec<(usize, Arc<Mutex<SectorCache>>)>,
}

#[inline]
pub(crate) fn get(sector: usize, device: Arc<dyn BlockDevice>) -> Arc<Mutex<SectorCache>> {
    SECTOR_CACHE_MANAGER.lock().get(sector, device)
}

/// Write every dirty cached sector back to its device.
pub fn sync_all() {
    SECTOR_CACHE_MANAGER
        .lock()
        .queue
        .iter()
        .for_each(|(_, cache)| cache.lock().sync());
}

/// Write every dirty cached sector back and drop the cached copies.
pub fn flush() {
    let mut manager = SECTOR_CACHE_MANAGER.lock();
    for (_, cache) in manager.queue.drain(..) {
        cache.lock().sync();
    }
}

/// One in-memory sector.
#[repr(C)]
pub(crate) struct SectorCache {
    /// Cached bytes. Kept as the first field so sector-resident types
    /// handed out by [`get`](SectorCache::get) see full alignment.
    data: [u8; SECTOR_SIZE],
    /// The sector this buffer mirrors.
    sector: usize,
    /// Backing device.
    device: Arc<dyn BlockDevice>,
    /// Diverges from the on-device copy.
    modified: bool,
}

impl SectorCache {
    pub fn new(sector: usize, device: Arc<dyn BlockDevice>) -> Self {
        let mut data = [0; SECTOR_SIZE];
        device.read_sector(sector, &mut data);

        Self {
            data,
            sector,
            device,
            modified: false,
        }
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.device.write_sector(self.sector, &self.data);
        }
    }

    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        let addr = self.offset(offset).cast();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        self.modified = true;
        let addr = self.offset(offset).cast_mut().cast();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl SectorCache {
    #[inline]
    fn offset(&self, count: usize) -> *const u8 {
        &self.data[count]
    }
}

impl Drop for SectorCache {
    fn drop(&mut self) {
        self.sync();
    }
}

impl SectorCacheManager {
    /// Upper bound on resident sectors.
    const CAPACITY: usize = 16;

    const fn new() -> Self {
        Self { queue: Vec::new() }
    }

    // Eviction policy: kick out an idle sector.
    fn get(&mut self, sector: usize, device: Arc<dyn BlockDevice>) -> Arc<Mutex<SectorCache>> {
        if let Some(cache) = self
            .queue
            .iter()
            .find_map(|(id, cache)| (sector == *id).then_some(cache))
        {
            return Arc::clone(cache);
        };

        // Full: drop one resident sector, syncing it on the way out.
        if self.queue.len() == Self::CAPACITY {
            let index = self
                .queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1) // only unreferenced buffers may go
                .expect("run out of sector cache");
            self.queue.remove(index);
        }

        let cache = Arc::new(Mutex::new(SectorCache::new(sector, device)));
        self.queue.push((sector, cache.clone()));

        cache
    }
}
