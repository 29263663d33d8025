use crate::error::Result;

/// Byte-addressable storage holding a whole container, plus the exclusive
/// lock that serialises every file system operation on it.
pub trait BlockDevice: Send + Sync {
    /// Writes `buf` starting at byte `offset`, growing the container if needed.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Fills `buf` from byte `offset`.
    /// Bytes past the end of the container read as zero.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Current length of the container in bytes.
    fn size_in_bytes(&self) -> Result<u64>;

    /// Cuts the container down (or extends it) to `len` bytes.
    fn truncate(&self, len: u64) -> Result<()>;

    /// Durability barrier: everything written so far reaches stable storage.
    fn flush(&self) -> Result<()>;

    /// Blocks until the whole-container exclusive lock is held.
    /// The lock is not reentrant.
    fn lock(&self) -> Result<()>;

    fn unlock(&self) -> Result<()>;

    /// Runs `f` while holding the exclusive lock.
    /// The lock is released on every exit path; an error from `f` wins over
    /// an error from releasing the lock.
    fn execute_under_lock<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
        Self: Sized,
    {
        self.lock()?;
        let result = f();
        let released = self.unlock();
        let value = result?;
        released?;
        Ok(value)
    }
}
