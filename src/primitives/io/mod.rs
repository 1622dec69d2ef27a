#![forbid(unsafe_code)]

use std::{
    fs::File,
    io,
    path::Path,
    sync::Arc,
};

use tracing::{trace, warn};

use crate::error::{LeafError, Result};

/// Positioned file access used by [`BlockStore`](crate::primitives::store::BlockStore).
pub trait FileIo: Send + Sync + 'static {
    /// Fills `dst` with the bytes stored at `off`; short files are an error.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` at `off`.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Synchronizes all file data and metadata to disk.
    fn sync_all(&self) -> Result<()>;
    /// Returns the current length of the file in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Truncates or zero-extends the file to `len` bytes.
    fn truncate(&self, len: u64) -> Result<()>;
}

#[cfg(unix)]
fn pread(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, dst, off)
}

#[cfg(unix)]
fn pwrite(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, src, off)
}

#[cfg(windows)]
fn pread(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, dst, off)
}

#[cfg(windows)]
fn pwrite(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, src, off)
}

#[cfg(not(any(unix, windows)))]
fn pread(_file: &File, _dst: &mut [u8], _off: u64) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positioned reads are not available on this platform",
    ))
}

#[cfg(not(any(unix, windows)))]
fn pwrite(_file: &File, _src: &[u8], _off: u64) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positioned writes are not available on this platform",
    ))
}

/// Repeats positioned reads until `dst` is full.
fn read_full(file: &File, mut off: u64, mut dst: &mut [u8]) -> io::Result<()> {
    while !dst.is_empty() {
        let n = pread(file, dst, off)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} bytes missing at offset {off}", dst.len()),
            ));
        }
        dst = &mut std::mem::take(&mut dst)[n..];
        off += n as u64;
    }
    Ok(())
}

/// Repeats positioned writes until all of `src` is on the file.
fn write_full(file: &File, mut off: u64, mut src: &[u8]) -> io::Result<()> {
    while !src.is_empty() {
        let n = pwrite(file, src, off)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("file accepted no bytes at offset {off}"),
            ));
        }
        src = &src[n..];
        off += n as u64;
    }
    Ok(())
}

/// [`FileIo`] over a shared standard library file handle.
///
/// Clones share the handle; the file closes with the last one.
#[derive(Clone, Debug)]
pub struct StdFileIo {
    file: Arc<File>,
}

impl StdFileIo {
    /// Wraps an already opened file.
    pub fn new(file: File) -> Self {
        Self {
            file: Arc::new(file),
        }
    }

    /// Opens `path` read-write, creating it when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(file))
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        trace!(off, len = dst.len(), "io.read_at");
        Ok(read_full(&self.file, off, dst)?)
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        trace!(off, len = src.len(), "io.write_at");
        Ok(write_full(&self.file, off, src)?)
    }

    fn sync_all(&self) -> Result<()> {
        self.file.sync_all().map_err(|err| {
            warn!(error = %err, "io.sync_all.failed");
            LeafError::from(err)
        })
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        Ok(self.file.set_len(len)?)
    }
}
