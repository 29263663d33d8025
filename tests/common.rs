//! Common utilities for tests

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fatbox::{BlockDevice, Error, Result};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder {}", 1) -> println!("[test] placeholder 1");
#[macro_export]
macro_rules! log {
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// Container path under the system temp directory, unique per test and process.
pub fn container_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fatbox-{}-{}.img", name, std::process::id()))
}

/// An in-memory container that grows on write, like a sparse host file.
/// Taking the lock twice without releasing it is reported as an error, so
/// nested acquisition shows up in tests.
pub struct RamDisk {
    inner: Arc<Mutex<Vec<u8>>>,
    locked: Arc<AtomicBool>,
    acquisitions: Arc<AtomicUsize>,
}

impl RamDisk {
    pub fn new() -> Self {
        RamDisk {
            inner: Arc::new(Mutex::new(Vec::new())),
            locked: Arc::new(AtomicBool::new(false)),
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A second handle on the same bytes, as if the container were reopened.
    pub fn share(&self) -> Self {
        RamDisk {
            inner: Arc::clone(&self.inner),
            locked: Arc::clone(&self.locked),
            acquisitions: Arc::clone(&self.acquisitions),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Number of times the lock has been taken so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn with_bytes(bytes: &[u8]) -> Self {
        let disk = RamDisk::new();
        disk.inner.lock().unwrap().extend_from_slice(bytes);
        disk
    }
}

impl BlockDevice for RamDisk {
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.inner.lock().unwrap();
        let start = offset as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.inner.lock().unwrap();
        let start = (offset as usize).min(data.len());
        let end = (offset as usize + buf.len()).min(data.len());
        let available = end - start;
        buf[..available].copy_from_slice(&data[start..end]);
        buf[available..].fill(0);
        Ok(())
    }

    fn size_in_bytes(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().len() as u64)
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.inner.lock().unwrap().resize(len as usize, 0);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        // In a RAM disk, flushing is a no-op since data is already in memory.
        Ok(())
    }

    fn lock(&self) -> Result<()> {
        if self.locked.swap(true, Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "container lock is already held",
            )));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }
}
