//! # Open-file layer
//!
//! An [`OpenFile`] binds a fetched [`FileHeader`] to its device and
//! offers byte-granular access on top of the sector chain: positioned
//! `read_at`/`write_at` plus a seekable cursor.
//!
//! Files never grow after creation, so writes past the allocated length
//! are clamped and the short count reported.

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::error::Error;
use crate::layout::FileHeader;
use crate::sector_cache;
use crate::{SectorBuf, SECTOR_SIZE};

pub struct OpenFile {
    header: FileHeader,
    /// Sector the header was fetched from.
    header_sector: u32,
    /// Cursor for [`read`](OpenFile::read) / [`write`](OpenFile::write).
    pos: usize,
    device: Arc<dyn BlockDevice>,
}

impl OpenFile {
    /// Opens the file whose header lives at `sector`.
    pub fn open(sector: u32, device: Arc<dyn BlockDevice>) -> Result<Self, Error> {
        let header = FileHeader::fetch_from(sector, &device)?;
        Ok(Self {
            header,
            header_sector: sector,
            pos: 0,
            device,
        })
    }

    /// File length in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.header.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    #[inline]
    pub fn header_sector(&self) -> u32 {
        self.header_sector
    }

    #[inline]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Reads from the cursor, advancing it by the bytes read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let count = self.read_at(self.pos, buf)?;
        self.pos += count;
        Ok(count)
    }

    /// Writes at the cursor, advancing it by the bytes written.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let count = self.write_at(self.pos, buf)?;
        self.pos += count;
        Ok(count)
    }

    /// Fills `buf` starting at byte `offset`, clamped to the file
    /// length. Returns the bytes read.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, Error> {
        let mut start = offset;
        let end = (offset + buf.len()).min(self.len() as usize);
        if start >= end {
            return Ok(0);
        }

        let mut read = 0;
        loop {
            // last byte of the current sector, or of the transfer
            let sector_end = (start / SECTOR_SIZE + 1) * SECTOR_SIZE;
            let sector_end = sector_end.min(end);
            let count = sector_end - start;

            let sector = self.header.sector_of(start)?;
            let dest = &mut buf[read..read + count];
            sector_cache::get(sector as usize, self.device.clone())
                .lock()
                .map(0, |data: &SectorBuf| {
                    let begin = start % SECTOR_SIZE;
                    dest.copy_from_slice(&data[begin..begin + count]);
                });

            read += count;
            if sector_end == end {
                break;
            }
            start = sector_end;
        }

        Ok(read)
    }

    /// Stores `buf` starting at byte `offset`, clamped to the file
    /// length. Returns the bytes written.
    pub fn write_at(&mut self, offset: usize, buf: &[u8]) -> Result<usize, Error> {
        let mut start = offset;
        let end = (offset + buf.len()).min(self.len() as usize);
        if start >= end {
            return Ok(0);
        }

        let mut written = 0;
        loop {
            let sector_end = (start / SECTOR_SIZE + 1) * SECTOR_SIZE;
            let sector_end = sector_end.min(end);
            let count = sector_end - start;

            let sector = self.header.sector_of(start)?;
            let src = &buf[written..written + count];
            sector_cache::get(sector as usize, self.device.clone())
                .lock()
                .map_mut(0, |data: &mut SectorBuf| {
                    let begin = start % SECTOR_SIZE;
                    data[begin..begin + count].copy_from_slice(src);
                });

            written += count;
            if sector_end == end {
                break;
            }
            start = sector_end;
        }

        Ok(written)
    }
}
