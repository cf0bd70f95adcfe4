//! Free-space bitmap: one byte per data cluster, mirrored to the bitmap
//! region of the image as bytes change.

use crate::error::{FsError, Result};
use crate::image::Image;
use crate::superblock::Superblock;
use std::io;

/// In-memory copy of the data-cluster allocation bitmap.
///
/// Byte `i` is 0 when data cluster `i` is free and 1 when allocated.
pub struct Bitmap {
    bytes: Vec<u8>,
}

impl Bitmap {
    /// A bitmap of `len` free clusters.
    pub fn zeroed(len: i32) -> Self {
        Self {
            bytes: vec![0; len as usize],
        }
    }

    /// Reads the bitmap region back from the image.
    pub fn read(img: &mut Image, sb: &Superblock) -> io::Result<Self> {
        let mut bytes = vec![0; sb.data_cluster_count as usize];
        img.seek_to_bitmap_byte(sb, 0)?;
        img.read_exact(&mut bytes)?;
        Ok(Self { bytes })
    }

    pub fn is_set(&self, block: i32) -> bool {
        self.bytes[block as usize] == 1
    }

    /// Scans for `count` free clusters in ascending order, starting at
    /// index 1. Cluster 0 is never handed out; it belongs to the root
    /// directory from format time.
    fn scan_free(&self, count: usize) -> Option<Vec<i32>> {
        let mut blocks = Vec::with_capacity(count);
        for i in 1..self.bytes.len() {
            if self.bytes[i] == 0 {
                blocks.push(i as i32);
                if blocks.len() == count {
                    return Some(blocks);
                }
            }
        }
        None
    }

    /// Reserves `count` free clusters, all or nothing.
    ///
    /// On success every reserved byte is set in memory and written back to
    /// the image; on [`FsError::NoSpace`] nothing is altered.
    pub fn allocate(&mut self, img: &mut Image, sb: &Superblock, count: usize) -> Result<Vec<i32>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let blocks = self.scan_free(count).ok_or(FsError::NoSpace)?;
        for &block in &blocks {
            self.mark(img, sb, block, true)?;
        }
        img.flush()?;
        Ok(blocks)
    }

    /// Releases the given clusters in memory and on disk.
    pub fn free(&mut self, img: &mut Image, sb: &Superblock, blocks: &[i32]) -> Result<()> {
        for &block in blocks {
            self.mark(img, sb, block, false)?;
        }
        img.flush()?;
        Ok(())
    }

    /// Sets one cluster's state in memory and writes the changed byte back.
    pub fn mark(
        &mut self,
        img: &mut Image,
        sb: &Superblock,
        block: i32,
        allocated: bool,
    ) -> io::Result<()> {
        let value = allocated as u8;
        self.bytes[block as usize] = value;
        img.seek_to_bitmap_byte(sb, block)?;
        img.write_u8(value)
    }
}
