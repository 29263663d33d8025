use core::fmt;
use core::str::FromStr;

use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
}

impl FileType {
    pub fn tag(&self) -> &'static str {
        match self {
            FileType::File => "FILE",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FILE" => Ok(FileType::File),
            other => Err(Error::CorruptFormat(format!("unknown file type tag {other:?}"))),
        }
    }
}

/// Catalog record of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub ftype: FileType,
    pub start_block: Option<u32>, // None until the first byte is appended
    pub size: u64,
}

impl FileMetadata {
    pub const EMPTY: Self = Self {
        ftype: FileType::File,
        start_block: None,
        size: 0,
    };

    pub fn new(start_block: Option<u32>, size: u64) -> Self {
        Self { ftype: FileType::File, start_block, size }
    }

    /// Number of blocks the file's chain spans.
    pub fn num_blocks(&self) -> u64 {
        self.size.div_ceil(crate::BLOCK_SIZE as u64)
    }
}

/// Fate of one data block, as recorded in the allocation table.
/// On disk: -1 free, 0 end of chain, n > 0 next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Terminator,
    Next(u32),
}

impl FatEntry {
    pub const FREE_RAW: i32 = -1;
    pub const TERMINATOR_RAW: i32 = 0;

    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            Self::FREE_RAW => Ok(FatEntry::Free),
            Self::TERMINATOR_RAW => Ok(FatEntry::Terminator),
            n if n > 0 => Ok(FatEntry::Next(n as u32)),
            n => Err(Error::CorruptFormat(format!("invalid allocation table entry {n}"))),
        }
    }

    pub fn to_raw(&self) -> i32 {
        match *self {
            FatEntry::Free => Self::FREE_RAW,
            FatEntry::Terminator => Self::TERMINATOR_RAW,
            FatEntry::Next(n) => n as i32,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, FatEntry::Free)
    }
}
