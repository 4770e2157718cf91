//! # Sector device interface layer
//!
//! A block device stores data in fixed-size sectors; [`BlockDevice`] is
//! the abstraction over reading and writing them. Both operations move
//! one whole sector and complete before returning, so a call either
//! transfers the full sector or does not return at all.

#![no_std]

/// Synchronous, sector-atomic storage driver.
pub trait BlockDevice: Send + Sync {
    fn read_sector(&self, sector: usize, buf: &mut [u8]);
    fn write_sector(&self, sector: usize, buf: &[u8]);
}
