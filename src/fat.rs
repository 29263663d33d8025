//! The block allocation table.
//! An in-memory copy of the on-disk table; every change goes through `Fat::set`,
//! which writes the entry back before returning, so the two copies never
//! drift apart by more than one entry.

use alloc::vec;
use alloc::vec::Vec;

use crate::config::*;
use crate::structs::FatEntry;
use crate::{BlockDevice, Error, Result, SuperBlock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat {
    entries: Vec<FatEntry>,
}

impl Fat {
    /// A table with every block free.
    pub fn new(num_entries: u32) -> Self {
        Self {
            entries: vec![FatEntry::Free; num_entries as usize],
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() % FAT_ENTRY_SIZE != 0 {
            return Err(Error::CorruptFormat(format!(
                "allocation table length {} is not a multiple of {FAT_ENTRY_SIZE}",
                buf.len()
            )));
        }
        let entries = buf
            .chunks_exact(FAT_ENTRY_SIZE)
            .map(|raw| FatEntry::from_raw(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])))
            .collect::<Result<Vec<_>>>()?;
        let fat = Self { entries };

        // A pointer outside the table can never be followed safely.
        for (block, entry) in fat.entries.iter().enumerate() {
            if let FatEntry::Next(next) = *entry {
                if next as usize >= fat.entries.len() {
                    return Err(Error::CorruptFormat(format!(
                        "block {block} points past the table to {next}"
                    )));
                }
            }
        }
        Ok(fat)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.entries
            .iter()
            .flat_map(|entry| entry.to_raw().to_be_bytes())
            .collect()
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn get(&self, block: u32) -> Result<FatEntry> {
        self.entries
            .get(block as usize)
            .copied()
            .ok_or_else(|| Error::CorruptFormat(format!("block {block} is outside the allocation table")))
    }

    pub fn is_free(&self, block: u32) -> Result<bool> {
        Ok(self.get(block)?.is_free())
    }

    /// Next block of the chain, or `None` at a terminator.
    /// Following a free block means a chain and the table disagree.
    pub fn next(&self, block: u32) -> Result<Option<u32>> {
        match self.get(block)? {
            FatEntry::Next(next) => Ok(Some(next)),
            FatEntry::Terminator => Ok(None),
            FatEntry::Free => Err(Error::CorruptFormat(format!("chain runs into free block {block}"))),
        }
    }

    /// Updates one entry, in memory and on disk.
    pub fn set(
        &mut self,
        device: &impl BlockDevice,
        superblock: &SuperBlock,
        block: u32,
        entry: FatEntry,
    ) -> Result<()> {
        let slot = self
            .entries
            .get_mut(block as usize)
            .ok_or_else(|| Error::CorruptFormat(format!("block {block} is outside the allocation table")))?;
        *slot = entry;
        device.write_at(superblock.fat_entry_offset(block), &entry.to_raw().to_be_bytes())?;
        Ok(())
    }

    /// Lowest free block at or after `from`.
    pub fn first_free(&self, from: u32) -> Result<u32> {
        self.entries
            .iter()
            .enumerate()
            .skip(from as usize)
            .find(|(_, entry)| entry.is_free())
            .map(|(block, _)| block as u32)
            .ok_or(Error::OutOfSpace)
    }

    pub fn free_count(&self) -> u32 {
        self.entries.iter().filter(|entry| entry.is_free()).count() as u32
    }

    /// First block of the run of free blocks reaching the end of the table.
    /// `None` when the last block is in use.
    pub fn trailing_free_start(&self) -> Option<u32> {
        let in_use = self.entries.iter().rposition(|entry| !entry.is_free());
        match in_use {
            Some(last) if last + 1 == self.entries.len() => None,
            Some(last) => Some(last as u32 + 1),
            None => Some(0),
        }
    }

    /// Blocks of the chain starting at `start`, in order.
    /// At most `max_blocks` hops are taken; a chain still running after that is corrupt.
    pub fn chain(&self, start: u32, max_blocks: u64) -> Result<Vec<u32>> {
        let mut blocks = Vec::new();
        let mut current = Some(start);
        while let Some(block) = current {
            if blocks.len() as u64 >= max_blocks {
                return Err(Error::CorruptFormat(format!(
                    "chain from block {start} is longer than {max_blocks} blocks"
                )));
            }
            current = self.next(block)?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Block `n` hops down the chain from `start`.
    pub fn nth_block(&self, start: u32, n: u64) -> Result<u32> {
        let mut current = start;
        for _ in 0..n {
            current = self.next(current)?.ok_or_else(|| {
                Error::CorruptFormat(format!("chain from block {start} ends before hop {n}"))
            })?;
        }
        Ok(current)
    }

    /// Marks every block of the chain starting at `start` free.
    /// Block contents are left as they are.
    /// Returns the number of blocks released.
    pub fn free_chain(
        &mut self,
        device: &impl BlockDevice,
        superblock: &SuperBlock,
        start: u32,
    ) -> Result<u32> {
        let blocks = self.chain(start, self.len() as u64)?;
        for &block in &blocks {
            self.set(device, superblock, block, FatEntry::Free)?;
        }
        Ok(blocks.len() as u32)
    }
}

pub fn read_fat<D: BlockDevice>(device: &D, superblock: &SuperBlock) -> Result<Fat> {
    let mut buf = vec![0u8; superblock.fat_entries as usize * FAT_ENTRY_SIZE];
    device.read_at(superblock.fat_offset as u64, &mut buf)?;
    Fat::from_bytes(&buf)
}

pub fn write_fat<D: BlockDevice>(device: &D, superblock: &SuperBlock, fat: &Fat) -> Result<()> {
    device.write_at(superblock.fat_offset as u64, &fat.to_bytes())?;
    Ok(())
}
