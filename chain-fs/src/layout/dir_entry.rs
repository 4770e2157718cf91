use core::{mem, ptr, slice};

pub const NAME_MAX_LEN: usize = 25;

/// One slot of a directory table as stored on disk; 32 bytes. Vacant
/// slots are zeroed in place rather than compacted away, so a slot keeps
/// its position in the fixed-size array for the directory's lifetime.
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    in_use: u8,
    is_dir: u8,
    // the last byte stays \0
    name: [u8; NAME_MAX_LEN + 1],
    sector: u32,
}

const _: () = assert!(mem::size_of::<DirEntry>() == DirEntry::SIZE);

impl DirEntry {
    /// Record size is fixed at 32 bytes.
    pub const SIZE: usize = 32;

    /// `name` must be at most [`NAME_MAX_LEN`] bytes.
    pub(crate) fn new(name: &str, sector: u32, is_dir: bool) -> Self {
        let bytes = name.as_bytes();
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self {
            in_use: 1,
            is_dir: is_dir as u8,
            name,
            sector,
        }
    }

    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.in_use == 0
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(0);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Sector of the entry's file header.
    #[inline]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    pub(crate) fn vacate(&mut self) {
        *self = Self::default();
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}
