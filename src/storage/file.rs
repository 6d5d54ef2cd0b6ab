//! # File-Backed Page Store
//!
//! Maps page ids to byte offsets in a regular file and moves whole pages
//! between disk and memory. Page `i` occupies bytes `[i * 4096, (i + 1) *
//! 4096)`; the file is always a whole number of pages long once written
//! through this layer.
//!
//! Reads and writes are positioned, so the file cursor is never shared
//! state. Every successful [`PageFile::write_page`] is durable under
//! [`SyncMode::Full`] (the default); [`SyncMode::Off`] defers durability
//! to an explicit [`PageFile::sync`], which bulk loads and tests use to
//! avoid one fsync per page.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use tracing::debug;

use super::{Page, PAGE_SIZE};

/// Durability policy for page writes, in the spirit of a `synchronous`
/// pragma.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// No per-write flush; the caller syncs explicitly.
    Off,
    /// Flush to stable storage after every page write.
    #[default]
    Full,
}

/// A page-granular view of one file on disk.
#[derive(Debug)]
pub struct PageFile {
    file: File,
    path: PathBuf,
    sync_mode: SyncMode,
}

impl PageFile {
    /// Opens `path` read/write, creating it if absent. Existing content
    /// is never truncated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, SyncMode::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open page file '{}'", path.display()))?;

        debug!(path = %path.display(), ?sync_mode, "opened page file");

        Ok(Self {
            file,
            path,
            sync_mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Number of whole pages in the file.
    pub fn page_count(&self) -> Result<u32> {
        let len = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();
        Ok((len / PAGE_SIZE as u64) as u32)
    }

    /// Reads the page stored at id `id`, verifying its checksum.
    ///
    /// The returned [`Page`] is a fresh copy owned by the caller.
    pub fn read_page(&self, id: u32) -> Result<Page> {
        let mut buf = vec![0u8; PAGE_SIZE];
        read_exact_at(&self.file, &mut buf, page_offset(id))
            .wrap_err_with(|| format!("failed to read page {} from '{}'", id, self.path.display()))?;
        Page::decode(&buf)
    }

    /// Writes `page` at the offset implied by its id, then flushes when
    /// the sync mode demands it.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        let mut buf = vec![0u8; PAGE_SIZE];
        page.encode_into(&mut buf)?;
        write_all_at(&self.file, &buf, page_offset(page.id())).wrap_err_with(|| {
            format!(
                "failed to write page {} to '{}'",
                page.id(),
                self.path.display()
            )
        })?;

        if self.sync_mode == SyncMode::Full {
            self.sync()?;
        }
        Ok(())
    }

    /// Flushes file contents to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }
}

fn page_offset(id: u32) -> u64 {
    id as u64 * PAGE_SIZE as u64
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "reached end of file while reading a page",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write page bytes",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
