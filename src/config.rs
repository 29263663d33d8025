pub const BLOCK_SIZE: usize = 1024;
pub const SUPERBLOCK_SIZE: usize = 160; // Fixed header at container offset 0
pub const FAT_ENTRY_SIZE: usize = 4; // Big-endian i32 per block
pub const DIR_START_BLOCK: u32 = 0; // The root directory chain always starts here

// Share of the configured capacity handed to the data region.
// The remaining fifth covers the superblock and the FAT.
pub const DATA_REGION_NUMERATOR: u64 = 4;
pub const DATA_REGION_DENOMINATOR: u64 = 5;

pub const MAX_FILE_SIZE: u64 = i32::MAX as u64; // The catalog stores sizes as int32
