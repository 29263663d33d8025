//! The root directory: a flat catalog from file name to metadata.
//! Hierarchy is only a naming convention; "a/b" is one name, found by prefix.
//!
//! Serialized as UTF-8 lines:
//! ```text
//! <entry count>
//! <name>          \
//! <type tag>       | once per entry
//! <start block>    | (-1 before the first append)
//! <size>          /
//! ```
//! The decoder stops after the declared number of entries, so whatever trails
//! the text in the last block of the chain is ignored.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::config::MAX_FILE_SIZE;
use crate::error::{FsError, Result};
use crate::structs::*;

/// Names are stored one per line, so they cannot hold a newline.
pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\n') {
        return Err(FsError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: BTreeMap<String, FileMetadata>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `name`, replacing any previous record under the same name.
    pub fn add_or_update(&mut self, name: &str, metadata: FileMetadata) {
        self.entries.insert(name.to_string(), metadata);
    }

    pub fn remove(&mut self, name: &str) -> Option<FileMetadata> {
        self.entries.remove(name)
    }

    /// Moves the record of `old` under `new`.
    /// Returns the record previously stored under `new`, if any, so the
    /// caller can release its blocks.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<Option<FileMetadata>> {
        let metadata = self
            .entries
            .remove(old)
            .ok_or_else(|| FsError::NotFound(old.to_string()))?;
        Ok(self.entries.insert(new.to_string(), metadata))
    }

    pub fn lookup(&self, name: &str) -> Option<&FileMetadata> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Sum of all cataloged file sizes.
    pub fn total_cataloged_bytes(&self) -> u64 {
        self.entries.values().map(|metadata| metadata.size).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut text = String::new();
        text.push_str(&self.entries.len().to_string());
        text.push('\n');
        for (name, metadata) in &self.entries {
            let start = metadata.start_block.map_or(-1, |block| block as i64);
            text.push_str(&format!("{name}\n{}\n{start}\n{}\n", metadata.ftype, metadata.size));
        }
        text.into_bytes()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        // Split on raw bytes: the padding after the text need not be valid UTF-8.
        let mut lines = buf.split(|&b| b == b'\n');

        let count: usize = parse_number(next_line(&mut lines, "entry count")?, "entry count")?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let name = next_line(&mut lines, "file name")?.to_string();
            let ftype: FileType = next_line(&mut lines, "file type")?.parse()?;
            let start: i64 = parse_number(next_line(&mut lines, "start block")?, "start block")?;
            let size: u64 = parse_number(next_line(&mut lines, "file size")?, "file size")?;

            let start_block = match start {
                -1 => None,
                n if (0..=i32::MAX as i64).contains(&n) => Some(n as u32),
                n => {
                    return Err(FsError::CorruptFormat(format!(
                        "start block {n} of {name:?} is out of range"
                    )));
                }
            };
            if size > MAX_FILE_SIZE || (size > 0 && start_block.is_none()) {
                return Err(FsError::CorruptFormat(format!(
                    "size {size} of {name:?} does not match its start block {start}"
                )));
            }
            entries.insert(name, FileMetadata { ftype, start_block, size });
        }
        Ok(Self { entries })
    }
}

fn next_line<'a>(lines: &mut impl Iterator<Item = &'a [u8]>, what: &str) -> Result<&'a str> {
    let line = lines
        .next()
        .ok_or_else(|| FsError::CorruptFormat(format!("directory ends before {what}")))?;
    core::str::from_utf8(line).map_err(|_| FsError::CorruptFormat(format!("directory {what} is not UTF-8")))
}

fn parse_number<T: core::str::FromStr>(line: &str, what: &str) -> Result<T> {
    line.trim()
        .parse()
        .map_err(|_| FsError::CorruptFormat(format!("directory {what} {line:?} is not a number")))
}
