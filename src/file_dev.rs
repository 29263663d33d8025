//! A `BlockDevice` backed by one ordinary host file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::{BlockDevice, Result};

#[derive(Debug)]
pub struct FileDevice {
    file: Mutex<File>,
}

impl FileDevice {
    /// Creates the container file, discarding any previous content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Attaches to an existing container file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    // The handle mutex must not be held while blocking in flock.
    #[cfg(unix)]
    fn raw_fd(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;
        self.file.lock().as_raw_fd()
    }
}

impl BlockDevice for FileDevice {
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf[filled..].fill(0);
        Ok(())
    }

    fn size_in_bytes(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.file.lock().set_len(len)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    #[cfg(unix)]
    fn lock(&self) -> Result<()> {
        flock(self.raw_fd(), libc::LOCK_EX)
    }

    #[cfg(unix)]
    fn unlock(&self) -> Result<()> {
        flock(self.raw_fd(), libc::LOCK_UN)
    }

    // No advisory whole-file lock outside unix; the in-process mutex still
    // serialises each individual access.
    #[cfg(not(unix))]
    fn lock(&self) -> Result<()> {
        Ok(())
    }

    #[cfg(not(unix))]
    fn unlock(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn flock(fd: std::os::fd::RawFd, operation: libc::c_int) -> Result<()> {
    loop {
        let ret = unsafe { libc::flock(fd, operation) };
        if ret == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err.into());
        }
    }
}
