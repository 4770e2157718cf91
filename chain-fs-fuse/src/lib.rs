#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::BlockDevice;
use chain_fs::{NUM_SECTORS, SECTOR_SIZE};

/// A host file posing as a sector device.
pub struct BlockFile(pub Mutex<File>);

impl BlockDevice for BlockFile {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.read(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.write(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }
}

/// RAM-backed disk image, mainly for the test suite.
pub struct MemDisk(Mutex<Vec<u8>>);

impl MemDisk {
    pub fn new() -> Self {
        Self(Mutex::new(vec![0; NUM_SECTORS * SECTOR_SIZE]))
    }
}

impl Default for MemDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for MemDisk {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        let image = self.0.lock().unwrap();
        let start = sector * SECTOR_SIZE;
        buf.copy_from_slice(&image[start..start + SECTOR_SIZE]);
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) {
        let mut image = self.0.lock().unwrap();
        let start = sector * SECTOR_SIZE;
        image[start..start + SECTOR_SIZE].copy_from_slice(buf);
    }
}
