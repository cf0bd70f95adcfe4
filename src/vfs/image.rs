//! Positioned I/O against the backing file.
//!
//! The image owns the only handle to the backing file. Every access seeks to
//! a known offset first, so no file-position state leaks between operations.
//! Multi-byte integers are little-endian; strings are raw bytes inside their
//! fixed fields.

use crate::superblock::Superblock;
use std::fs::{File, OpenOptions};
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Handle to the backing file hosting the filesystem.
pub struct Image {
    file: File,
}

impl Image {
    /// Opens an existing backing file for read/write access.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Creates (or truncates) the backing file.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Returns the current length of the backing file in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Positions the handle at an absolute offset.
    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Positions the handle at data cluster `block`.
    pub fn seek_to_cluster(&mut self, sb: &Superblock, block: i32) -> io::Result<()> {
        self.seek(sb.cluster_offset(block))
    }

    /// Positions the handle at bitmap byte `index`.
    pub fn seek_to_bitmap_byte(&mut self, sb: &Superblock, index: i32) -> io::Result<()> {
        self.seek(sb.bitmap_offset(index))
    }

    /// Positions the handle at inode record `id`.
    pub fn seek_to_inode(&mut self, sb: &Superblock, id: i32) -> io::Result<()> {
        self.seek(sb.inode_offset(id))
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        let mut buf = [0; 4];
        self.file.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    pub fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.file.write_all(&value.to_le_bytes())
    }

    pub fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.file.write_all(&[value])
    }

    /// Flushes buffered writes to the host filesystem.
    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
