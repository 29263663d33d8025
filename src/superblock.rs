use crate::config::*;
use crate::BlockDevice;
use crate::Error;
use crate::Result;

/// Container geometry, stored big-endian in the first `SUPERBLOCK_SIZE` bytes:
/// i32 fat_offset, i32 fat_entries, i32 data_offset, i64 capacity, zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub fat_offset: u32,  // Byte offset of the allocation table
    pub fat_entries: u32, // Number of table entries == number of data blocks
    pub data_offset: u32, // Byte offset of data block 0
    pub capacity: u64,    // Configured maximum addressable space in bytes
}

impl SuperBlock {
    /// Lays out a container able to address `capacity` bytes.
    /// Four fifths of the capacity becomes data blocks, rounded up.
    pub fn new(capacity: u64) -> Result<Self> {
        let fat_entries = capacity
            .checked_mul(DATA_REGION_NUMERATOR)
            .ok_or(Error::InvalidCapacity(capacity))?
            .div_ceil(DATA_REGION_DENOMINATOR * BLOCK_SIZE as u64);
        let data_offset = SUPERBLOCK_SIZE as u64 + fat_entries * FAT_ENTRY_SIZE as u64;

        // Every header field must fit its on-disk signed width.
        if fat_entries == 0
            || fat_entries > i32::MAX as u64
            || data_offset > i32::MAX as u64
            || capacity > i64::MAX as u64
        {
            return Err(Error::InvalidCapacity(capacity));
        }

        Ok(Self {
            fat_offset: SUPERBLOCK_SIZE as u32,
            fat_entries: fat_entries as u32,
            data_offset: data_offset as u32,
            capacity,
        })
    }

    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        buf[0..4].copy_from_slice(&(self.fat_offset as i32).to_be_bytes());
        buf[4..8].copy_from_slice(&(self.fat_entries as i32).to_be_bytes());
        buf[8..12].copy_from_slice(&(self.data_offset as i32).to_be_bytes());
        buf[12..20].copy_from_slice(&(self.capacity as i64).to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < 20 {
            return Err(Error::CorruptFormat(format!(
                "superblock needs 20 bytes, got {}",
                buf.len()
            )));
        }
        let int_at = |at: usize| i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut capacity = [0u8; 8];
        capacity.copy_from_slice(&buf[12..20]);

        let field = |name: &str, value: i32| {
            u32::try_from(value)
                .map_err(|_| Error::CorruptFormat(format!("negative {name} in superblock: {value}")))
        };
        let capacity = i64::from_be_bytes(capacity);
        Ok(Self {
            fat_offset: field("fat offset", int_at(0))?,
            fat_entries: field("fat entry count", int_at(4))?,
            data_offset: field("data region offset", int_at(8))?,
            capacity: u64::try_from(capacity).map_err(|_| {
                Error::CorruptFormat(format!("negative capacity in superblock: {capacity}"))
            })?,
        })
    }

    /// Byte offset of the table entry describing `block`.
    pub fn fat_entry_offset(&self, block: u32) -> u64 {
        self.fat_offset as u64 + FAT_ENTRY_SIZE as u64 * block as u64
    }

    /// Byte offset of the first byte of `block`.
    pub fn block_offset(&self, block: u32) -> u64 {
        self.data_offset as u64 + BLOCK_SIZE as u64 * block as u64
    }
}

pub fn read_superblock<D: BlockDevice>(device: &D) -> Result<SuperBlock> {
    let size = device.size_in_bytes()?;
    if size < SUPERBLOCK_SIZE as u64 {
        return Err(Error::CorruptFormat(format!(
            "container of {size} bytes is too short for a superblock"
        )));
    }
    let mut buf = [0u8; SUPERBLOCK_SIZE];
    device.read_at(0, &mut buf)?;
    let superblock = SuperBlock::from_bytes(&buf)?;

    // The table must sit between the header and the data region.
    let fat_end = superblock.fat_entry_offset(superblock.fat_entries);
    if (superblock.fat_offset as usize) < SUPERBLOCK_SIZE || fat_end > superblock.data_offset as u64 {
        return Err(Error::CorruptFormat(format!("inconsistent geometry {superblock:?}")));
    }
    Ok(superblock)
}

pub fn write_superblock<D: BlockDevice>(device: &D, superblock: &SuperBlock) -> Result<()> {
    device.write_at(0, &superblock.to_bytes())?;
    Ok(())
}
