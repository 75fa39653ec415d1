//! Where chunk bytes come from.
//!
//! Workers never share a read cursor: every read names its own offset, so any
//! number of them can be waiting on I/O at once.

use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::error::ScanError;

/// Random-access byte input split into chunks by the scan.
pub trait ChunkSource: Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`window`](Self::window) borrows from memory the source already
    /// holds, leaving `scratch` untouched.
    fn borrows_windows(&self) -> bool {
        false
    }

    /// Returns up to `len` bytes starting at `offset`.
    ///
    /// The result is shorter than `len` only at the end of the input. Sources
    /// that hold their bytes in memory return a borrowed slice; others copy
    /// into `scratch`, which is at least `len` bytes long unless
    /// [`borrows_windows`](Self::borrows_windows) is true.
    fn window<'a>(&'a self, offset: u64, len: usize, scratch: &'a mut [u8]) -> io::Result<&'a [u8]>;
}

impl ChunkSource for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn borrows_windows(&self) -> bool {
        true
    }

    fn window<'a>(&'a self, offset: u64, len: usize, _scratch: &'a mut [u8]) -> io::Result<&'a [u8]> {
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(<[u8]>::len(self));
        let end = start.saturating_add(len).min(<[u8]>::len(self));
        Ok(&self[start..end])
    }
}

/// File read with explicit-offset reads (`pread`).
#[derive(Debug)]
pub struct PositionalFile {
    file: File,
    len: u64,
}

impl PositionalFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let open_error = |source| ScanError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_error)?;
        let len = file.metadata().map_err(open_error)?.len();
        Ok(Self { file, len })
    }
}

impl ChunkSource for PositionalFile {
    fn len(&self) -> u64 {
        self.len
    }

    fn window<'a>(&'a self, offset: u64, len: usize, scratch: &'a mut [u8]) -> io::Result<&'a [u8]> {
        let buf = &mut scratch[..len];
        let mut filled = 0;
        while filled < buf.len() {
            match read_at(&self.file, &mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(&scratch[..filled])
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    // seek_read moves the handle's cursor, but no reader here relies on it
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Read-only memory map of a file.
#[derive(Debug)]
pub struct MappedFile {
    // a zero-length file cannot be mapped
    map: Option<Mmap>,
}

impl MappedFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ScanError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| ScanError::Open {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if len == 0 {
            return Ok(Self { map: None });
        }
        // SAFETY: the map is read-only; the scan assumes nobody truncates or
        // rewrites the file while it runs, same as for positional reads.
        let map = unsafe { MmapOptions::new().map(&file) }.map_err(|source| ScanError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { map: Some(map) })
    }

    fn bytes(&self) -> &[u8] {
        match &self.map {
            Some(map) => map.deref(),
            None => &[],
        }
    }
}

impl ChunkSource for MappedFile {
    fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    fn borrows_windows(&self) -> bool {
        true
    }

    fn window<'a>(&'a self, offset: u64, len: usize, scratch: &'a mut [u8]) -> io::Result<&'a [u8]> {
        self.bytes().window(offset, len, scratch)
    }
}
