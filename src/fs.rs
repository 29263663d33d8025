use alloc::{string::String, string::ToString, sync::Arc, vec, vec::Vec};
use std::path::Path;

use log::{debug, info, warn};

use crate::config::*;
use crate::directory::{check_name, Directory};
use crate::fat::{read_fat, write_fat, Fat};
use crate::structs::*;
use crate::{read_superblock, write_superblock, BlockDevice, Error, FileDevice, Result, SuperBlock};

fn blocks_for(len: u64) -> u64 {
    len.div_ceil(BLOCK_SIZE as u64)
}

/// A container file system.
///
/// Every public operation takes the device's exclusive lock exactly once and
/// then runs an `*_unlocked` core. Cores only ever call other cores, never a
/// public operation, since the lock is not reentrant.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    device: Arc<D>,
    superblock: SuperBlock,
    fat: Fat,
    root: Directory,
}

impl FileSystem<FileDevice> {
    /// Creates a fresh container at `path` able to address `capacity` bytes.
    pub fn create(path: impl AsRef<Path>, capacity: u64) -> Result<Self> {
        Self::format(Arc::new(FileDevice::create(path)?), capacity)
    }

    /// Opens an existing container; its capacity comes from the superblock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::mount(Arc::new(FileDevice::open(path)?))
    }
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn format(device: Arc<D>, capacity: u64) -> Result<Self> {
        let superblock = SuperBlock::new(capacity)?;
        let mut fs_inst = Self {
            device: Arc::clone(&device),
            fat: Fat::new(superblock.fat_entries),
            superblock,
            root: Directory::new(),
        };

        device.execute_under_lock(|| {
            fs_inst.device.truncate(0)?;
            write_superblock(&*fs_inst.device, &fs_inst.superblock)?;
            write_fat(&*fs_inst.device, &fs_inst.superblock, &fs_inst.fat)?;
            fs_inst.flush_directory()?;
            fs_inst.device.flush()
        })?;

        info!(
            "formatted container: {} bytes capacity, {} blocks of {BLOCK_SIZE} bytes",
            capacity, fs_inst.superblock.fat_entries
        );
        Ok(fs_inst)
    }

    pub fn mount(device: Arc<D>) -> Result<Self> {
        let fs_inst = device.execute_under_lock(|| {
            let superblock = read_superblock(&*device)?;
            let fat = read_fat(&*device, &superblock)?;
            let root = read_directory(&*device, &superblock, &fat)?;
            Ok(Self {
                device: Arc::clone(&device),
                superblock,
                fat,
                root,
            })
        })?;

        info!(
            "mounted container: {} files, {}/{} blocks free",
            fs_inst.root.len(),
            fs_inst.fat.free_count(),
            fs_inst.fat.len()
        );
        Ok(fs_inst)
    }

    /// Adds an empty file. An existing file of the same name is emptied.
    pub fn create_file(&mut self, name: &str) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| self.create_unlocked(name))
    }

    /// Appends `bytes` to the end of an existing file.
    pub fn append_to_file(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| self.append_unlocked(name, bytes))
    }

    /// Overwrites bytes inside a file in place.
    /// The write must end strictly before the current end of file; files
    /// only grow through `append_to_file`.
    pub fn write_to_file_from_offset(&mut self, name: &str, bytes: &[u8], offset: u64) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| self.overwrite_unlocked(name, bytes, offset))
    }

    /// Whole content of a file, or `None` if no such file is cataloged.
    pub fn read_file(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| self.read_unlocked(name))
    }

    /// Drops a file from the catalog and frees its blocks.
    /// The block contents stay on disk until reused.
    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| self.delete_unlocked(name))
    }

    /// Renames `old` to `new`, replacing (and freeing) any file already named `new`.
    pub fn move_file(&mut self, old: &str, new: &str) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| self.move_unlocked(old, new))
    }

    pub fn list_files(&mut self) -> Result<Vec<String>> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| Ok(self.root.names()))
    }

    /// Names starting with `prefix`, the flat stand-in for listing a directory.
    pub fn list_files_under_prefix(&mut self, prefix: &str) -> Result<Vec<String>> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| Ok(self.root.names_with_prefix(prefix)))
    }

    /// Capacity minus the sum of all file sizes.
    /// A quota-style figure: block rounding, the directory chain and the
    /// header are not accounted for. See `unallocated_bytes` for a block count.
    pub fn free_space_bytes(&mut self) -> Result<u64> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| {
            Ok(self
                .superblock
                .capacity
                .saturating_sub(self.root.total_cataloged_bytes()))
        })
    }

    /// Bytes in blocks the allocation table marks free.
    pub fn unallocated_bytes(&mut self) -> Result<u64> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| Ok(self.fat.free_count() as u64 * BLOCK_SIZE as u64))
    }

    pub fn metadata(&mut self, name: &str) -> Result<Option<FileMetadata>> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| Ok(self.root.lookup(name).copied()))
    }

    /// Rewrites every file into the lowest free blocks, then cuts the
    /// container after the last block still in use.
    pub fn compact(&mut self) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| {
            let names = self.root.names();
            for name in &names {
                if let Some(content) = self.read_unlocked(name)? {
                    self.delete_unlocked(name)?;
                    self.create_unlocked(name)?;
                    self.append_unlocked(name, &content)?;
                }
            }

            match self.fat.trailing_free_start() {
                Some(first_free) if first_free > 0 => {
                    let new_len = self.superblock.block_offset(first_free);
                    let old_len = self.device.size_in_bytes()?;
                    if new_len < old_len {
                        self.device.truncate(new_len)?;
                        info!("compacted {} files, container cut from {old_len} to {new_len} bytes", names.len());
                    } else {
                        warn!("compacted {} files, container already ends at {old_len} bytes", names.len());
                    }
                }
                _ => info!("compacted {} files, no trailing free blocks", names.len()),
            }
            self.device.flush()
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| self.device.flush())
    }

    /// Flushes the container and releases it.
    pub fn close(self) -> Result<()> {
        let device = Arc::clone(&self.device);
        device.execute_under_lock(|| device.flush())?;
        debug!("container closed");
        Ok(())
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    /// One-line summary of the mounted state, for diagnostics.
    pub fn dump(&self) -> String {
        format!(
            "{:?}, {} files ({} bytes), {}/{} blocks free",
            self.superblock,
            self.root.len(),
            self.root.total_cataloged_bytes(),
            self.fat.free_count(),
            self.fat.len()
        )
    }

    // Unlocked cores. Callers must already hold the device lock.

    fn create_unlocked(&mut self, name: &str) -> Result<()> {
        check_name(name)?;
        let previous = self.root.lookup(name).copied();
        self.commit_entry(name, FileMetadata::EMPTY)?;
        if let Some(FileMetadata { start_block: Some(start), .. }) = previous {
            self.fat.free_chain(&*self.device, &self.superblock, start)?;
        }
        debug!("created {name:?}");
        Ok(())
    }

    fn append_unlocked(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let metadata = *self
            .root
            .lookup(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        if bytes.is_empty() {
            return Ok(());
        }
        let new_size = metadata.size + bytes.len() as u64;
        if new_size > MAX_FILE_SIZE {
            return Err(Error::FileTooLarge(name.to_string()));
        }

        // The new bytes first fill whatever is left of the tail block.
        let tail = match (metadata.start_block, metadata.num_blocks()) {
            (Some(start), blocks) if blocks > 0 => Some(self.fat.nth_block(start, blocks - 1)?),
            _ => None,
        };
        let used_in_tail = (metadata.size % BLOCK_SIZE as u64) as usize;
        let fill = match tail {
            Some(_) if used_in_tail > 0 => (BLOCK_SIZE - used_in_tail).min(bytes.len()),
            _ => 0,
        };
        let (head_bytes, rest) = bytes.split_at(fill);

        // Nothing is touched unless the new data blocks and the rewritten
        // directory (whose size field may gain a digit) both fit.
        let needed = blocks_for(rest.len() as u64);
        if needed > self.fat.free_count() as u64 {
            return Err(Error::OutOfSpace);
        }
        let start_after = match metadata.start_block {
            Some(start) => start,
            None => self.fat.first_free(0)?,
        };
        let dir_needed = self.directory_blocks_with(name, FileMetadata::new(Some(start_after), new_size));
        if needed + dir_needed > self.fat.free_count() as u64 + self.directory_blocks_held()? {
            return Err(Error::OutOfSpace);
        }

        if let Some(tail) = tail {
            if !head_bytes.is_empty() {
                let at = self.superblock.block_offset(tail) + used_in_tail as u64;
                self.device.write_at(at, head_bytes)?;
            }
        }

        let mut start_block = metadata.start_block;
        let mut new_head = None;
        if !rest.is_empty() {
            let head = self.new_chain(rest)?;
            match tail {
                Some(tail) => self.fat.set(&*self.device, &self.superblock, tail, FatEntry::Next(head))?,
                None => start_block = Some(head),
            }
            new_head = Some(head);
        }

        if let Err(err) = self.commit_entry(name, FileMetadata::new(start_block, new_size)) {
            if let Some(head) = new_head {
                if let Err(undo) = self.detach_chain(tail, head) {
                    warn!("could not release blocks of failed append to {name:?}: {undo}");
                }
            }
            return Err(err);
        }
        debug!("appended {} bytes to {name:?}, now {new_size} bytes", bytes.len());
        Ok(())
    }

    fn overwrite_unlocked(&mut self, name: &str, bytes: &[u8], offset: u64) -> Result<()> {
        let metadata = *self
            .root
            .lookup(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let out_of_range = Error::OutOfRange {
            offset,
            len: bytes.len(),
            size: metadata.size,
        };
        match offset.checked_add(bytes.len() as u64) {
            Some(end) if end < metadata.size => {}
            _ => return Err(out_of_range),
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let start = metadata
            .start_block
            .ok_or_else(|| Error::CorruptFormat(format!("{name:?} has a size but no blocks")))?;

        let mut block = self.fat.nth_block(start, offset / BLOCK_SIZE as u64)?;
        let mut in_block = (offset % BLOCK_SIZE as u64) as usize;
        let mut written = 0;
        loop {
            let len = (BLOCK_SIZE - in_block).min(bytes.len() - written);
            let at = self.superblock.block_offset(block) + in_block as u64;
            self.device.write_at(at, &bytes[written..written + len])?;
            written += len;
            in_block = 0;
            if written == bytes.len() {
                break;
            }
            block = self.fat.next(block)?.ok_or_else(|| {
                Error::CorruptFormat(format!("chain of {name:?} ends before byte {}", offset + written as u64))
            })?;
        }

        debug!("overwrote {} bytes of {name:?} at offset {offset}", bytes.len());
        Ok(())
    }

    fn read_unlocked(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(metadata) = self.root.lookup(name).copied() else {
            return Ok(None);
        };
        if metadata.size == 0 {
            return Ok(Some(Vec::new()));
        }
        let start = metadata
            .start_block
            .ok_or_else(|| Error::CorruptFormat(format!("{name:?} has a size but no blocks")))?;

        let blocks = self.fat.chain(start, metadata.num_blocks())?;
        if blocks.len() as u64 != metadata.num_blocks() {
            return Err(Error::CorruptFormat(format!(
                "{name:?} spans {} blocks but its chain has {}",
                metadata.num_blocks(),
                blocks.len()
            )));
        }

        // The last block only contributes the bytes that belong to the file.
        let mut content = vec![0u8; metadata.size as usize];
        for (buf, &block) in content.chunks_mut(BLOCK_SIZE).zip(&blocks) {
            self.device.read_at(self.superblock.block_offset(block), buf)?;
        }
        Ok(Some(content))
    }

    fn delete_unlocked(&mut self, name: &str) -> Result<()> {
        let metadata = self
            .root
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        if let Err(err) = self.flush_directory() {
            self.root.add_or_update(name, metadata);
            return Err(err);
        }
        if let Some(start) = metadata.start_block {
            let freed = self.fat.free_chain(&*self.device, &self.superblock, start)?;
            debug!("deleted {name:?}, {freed} blocks freed");
        }
        Ok(())
    }

    fn move_unlocked(&mut self, old: &str, new: &str) -> Result<()> {
        check_name(new)?;
        if old == new {
            return match self.root.lookup(old) {
                Some(_) => Ok(()),
                None => Err(Error::NotFound(old.to_string())),
            };
        }
        let replaced = self.root.rename(old, new)?;
        if let Err(err) = self.flush_directory() {
            self.root.rename(new, old)?;
            if let Some(replaced) = replaced {
                self.root.add_or_update(new, replaced);
            }
            return Err(err);
        }
        if let Some(FileMetadata { start_block: Some(start), .. }) = replaced {
            self.fat.free_chain(&*self.device, &self.superblock, start)?;
        }
        debug!("moved {old:?} to {new:?}");
        Ok(())
    }

    /// Records `metadata` under `name` and rewrites the directory.
    /// If the rewrite fails the previous record is put back.
    fn commit_entry(&mut self, name: &str, metadata: FileMetadata) -> Result<()> {
        let previous = self.root.lookup(name).copied();
        self.root.add_or_update(name, metadata);
        if let Err(err) = self.flush_directory() {
            match previous {
                Some(previous) => self.root.add_or_update(name, previous),
                None => {
                    self.root.remove(name);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Unhooks the chain starting at `head` from `tail` (or from nothing)
    /// and returns its blocks to the table.
    fn detach_chain(&mut self, tail: Option<u32>, head: u32) -> Result<()> {
        if let Some(tail) = tail {
            self.fat.set(&*self.device, &self.superblock, tail, FatEntry::Terminator)?;
        }
        self.fat.free_chain(&*self.device, &self.superblock, head)?;
        Ok(())
    }

    /// Blocks the directory chain currently occupies.
    fn directory_blocks_held(&self) -> Result<u64> {
        if self.fat.is_free(DIR_START_BLOCK)? {
            return Ok(0);
        }
        Ok(self.fat.chain(DIR_START_BLOCK, self.fat.len() as u64)?.len() as u64)
    }

    /// Blocks the directory would need with `name` recorded as `metadata`.
    fn directory_blocks_with(&self, name: &str, metadata: FileMetadata) -> u64 {
        let mut next = self.root.clone();
        next.add_or_update(name, metadata);
        blocks_for(next.to_bytes().len() as u64)
    }

    /// Writes `data` into a chain of newly allocated blocks and returns its head.
    fn new_chain(&mut self, data: &[u8]) -> Result<u32> {
        let head = self.fat.first_free(0)?;
        self.fat.set(&*self.device, &self.superblock, head, FatEntry::Terminator)?;
        self.write_chain(head, data)?;
        Ok(head)
    }

    /// Writes `data` from the first byte of `head`, which must already be
    /// reserved, allocating and linking further blocks as the data requires.
    fn write_chain(&mut self, head: u32, data: &[u8]) -> Result<()> {
        let mut current = head;
        let mut chunks = data.chunks(BLOCK_SIZE).peekable();
        while let Some(chunk) = chunks.next() {
            self.device.write_at(self.superblock.block_offset(current), chunk)?;
            if chunks.peek().is_none() {
                break;
            }
            // Blocks are handed out lowest-first, so nothing below `current` is free.
            let next = self.fat.first_free(current + 1)?;
            self.fat.set(&*self.device, &self.superblock, next, FatEntry::Terminator)?;
            self.fat.set(&*self.device, &self.superblock, current, FatEntry::Next(next))?;
            current = next;
        }
        Ok(())
    }

    /// Replaces the on-disk directory with the in-memory one.
    /// The old chain at `DIR_START_BLOCK` is released and a new one written
    /// there, so the directory is always found at the same place on mount.
    fn flush_directory(&mut self) -> Result<()> {
        let bytes = self.root.to_bytes();
        let held = self.directory_blocks_held()?;
        if blocks_for(bytes.len() as u64) > self.fat.free_count() as u64 + held {
            return Err(Error::OutOfSpace);
        }

        if held > 0 {
            self.fat.free_chain(&*self.device, &self.superblock, DIR_START_BLOCK)?;
        }
        self.fat.set(&*self.device, &self.superblock, DIR_START_BLOCK, FatEntry::Terminator)?;
        self.write_chain(DIR_START_BLOCK, &bytes)
    }
}

/// Rebuilds the directory by reading its whole chain from `DIR_START_BLOCK`.
fn read_directory<D: BlockDevice>(device: &D, superblock: &SuperBlock, fat: &Fat) -> Result<Directory> {
    let blocks = fat.chain(DIR_START_BLOCK, fat.len() as u64)?;
    let mut buf = vec![0u8; blocks.len() * BLOCK_SIZE];
    for (chunk, &block) in buf.chunks_mut(BLOCK_SIZE).zip(&blocks) {
        device.read_at(superblock.block_offset(block), chunk)?;
    }
    Directory::from_bytes(&buf)
}
