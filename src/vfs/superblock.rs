//! Superblock layout and geometry computation.
//!
//! The superblock occupies the first cluster of the image: a 20-byte
//! null-padded ASCII signature followed by ten little-endian `i32` fields.
//! All region offsets are derived from the requested disk size alone, so the
//! computation is deterministic and independent of file state.

use crate::error::{FsError, Result};
use crate::image::Image;
use std::io;

/// Size of one cluster in bytes. Every addressable unit is a cluster.
pub const CLUSTER_SIZE: i32 = 4096;
/// Tag written to the start of every formatted image.
pub const SIGNATURE: &str = "vfsh-inode-fs";
/// On-disk length of the signature field.
pub const SIGNATURE_LEN: usize = 20;

/// The filesystem's geometry, mirrored at offset 0 of the backing file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Superblock {
    pub signature: [u8; SIGNATURE_LEN],
    pub disk_size: i32,
    pub cluster_size: i32,
    pub cluster_count: i32,
    pub inode_count: i32,
    pub bitmap_cluster_count: i32,
    pub inode_cluster_count: i32,
    pub data_cluster_count: i32,
    pub bitmap_start: i32,
    pub inode_start: i32,
    pub data_start: i32,
}

/// Signed-integer ceiling division (mirrors the unstable `i32::div_ceil`).
fn div_ceil_i32(lhs: i32, rhs: i32) -> i32 {
    let d = lhs / rhs;
    let r = lhs % rhs;
    if (r > 0 && rhs > 0) || (r < 0 && rhs < 0) {
        d + 1
    } else {
        d
    }
}

impl Superblock {
    /// Derives the geometry for a filesystem of `disk_size` bytes.
    ///
    /// One cluster in twenty is reserved for the inode table; the bitmap
    /// spends one byte per data cluster. Returns [`FsError::InvalidSize`]
    /// when the remainder leaves no usable data region.
    pub fn with_size(disk_size: i32) -> Result<Self> {
        let cluster_count = disk_size / CLUSTER_SIZE;
        let inode_cluster_count = cluster_count / 20;
        let inode_count = (inode_cluster_count * CLUSTER_SIZE) / crate::inode::INODE_SIZE;
        let bitmap_cluster_count = div_ceil_i32(cluster_count - inode_cluster_count - 1, CLUSTER_SIZE);
        let data_cluster_count = cluster_count - 1 - bitmap_cluster_count - inode_cluster_count;
        if data_cluster_count <= 1 || inode_count < 1 {
            return Err(FsError::InvalidSize);
        }

        let bitmap_start = CLUSTER_SIZE;
        let inode_start = bitmap_start + CLUSTER_SIZE * bitmap_cluster_count;
        let data_start = inode_start + CLUSTER_SIZE * inode_cluster_count;

        let mut signature = [0; SIGNATURE_LEN];
        signature[..SIGNATURE.len()].copy_from_slice(SIGNATURE.as_bytes());

        Ok(Self {
            signature,
            disk_size,
            cluster_size: CLUSTER_SIZE,
            cluster_count,
            inode_count,
            bitmap_cluster_count,
            inode_cluster_count,
            data_cluster_count,
            bitmap_start,
            inode_start,
            data_start,
        })
    }

    /// Absolute offset of data cluster `block`.
    pub fn cluster_offset(&self, block: i32) -> u64 {
        self.data_start as u64 + block as u64 * CLUSTER_SIZE as u64
    }

    /// Absolute offset of bitmap byte `index`.
    pub fn bitmap_offset(&self, index: i32) -> u64 {
        self.bitmap_start as u64 + index as u64
    }

    /// Absolute offset of inode record `id`.
    pub fn inode_offset(&self, id: i32) -> u64 {
        self.inode_start as u64 + id as u64 * crate::inode::INODE_SIZE as u64
    }

    fn encode(&self) -> [u8; SIGNATURE_LEN + 40] {
        let mut buf = [0; SIGNATURE_LEN + 40];
        buf[..SIGNATURE_LEN].copy_from_slice(&self.signature);
        let fields = [
            self.disk_size,
            self.cluster_size,
            self.cluster_count,
            self.inode_count,
            self.bitmap_cluster_count,
            self.inode_cluster_count,
            self.data_cluster_count,
            self.bitmap_start,
            self.inode_start,
            self.data_start,
        ];
        for (i, f) in fields.iter().enumerate() {
            let off = SIGNATURE_LEN + i * 4;
            buf[off..off + 4].copy_from_slice(&f.to_le_bytes());
        }
        buf
    }

    fn decode(buf: &[u8; SIGNATURE_LEN + 40]) -> Self {
        let field = |i: usize| {
            let off = SIGNATURE_LEN + i * 4;
            i32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
        };
        Self {
            signature: buf[..SIGNATURE_LEN].try_into().unwrap(),
            disk_size: field(0),
            cluster_size: field(1),
            cluster_count: field(2),
            inode_count: field(3),
            bitmap_cluster_count: field(4),
            inode_cluster_count: field(5),
            data_cluster_count: field(6),
            bitmap_start: field(7),
            inode_start: field(8),
            data_start: field(9),
        }
    }

    /// Reads the superblock from the start of the image.
    pub fn read(img: &mut Image) -> io::Result<Self> {
        let mut buf = [0; SIGNATURE_LEN + 40];
        img.seek(0)?;
        img.read_exact(&mut buf)?;
        Ok(Self::decode(&buf))
    }

    /// Writes the superblock to the start of the image.
    pub fn write(&self, img: &mut Image) -> io::Result<()> {
        img.seek(0)?;
        img.write_all(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_1m() {
        let sb = Superblock::with_size(1_000_000).unwrap();
        assert_eq!(sb.cluster_count, 244);
        assert_eq!(sb.inode_cluster_count, 12);
        assert_eq!(sb.inode_count, 1293);
        assert_eq!(sb.bitmap_cluster_count, 1);
        assert_eq!(sb.data_cluster_count, 230);
        assert_eq!(sb.bitmap_start, 4096);
        assert_eq!(sb.inode_start, 8192);
        assert_eq!(sb.data_start, 57344);
    }

    #[test]
    fn geometry_regions_are_contiguous() {
        let sb = Superblock::with_size(50_000_000).unwrap();
        assert_eq!(sb.bitmap_start, CLUSTER_SIZE);
        assert_eq!(
            sb.inode_start,
            sb.bitmap_start + sb.bitmap_cluster_count * CLUSTER_SIZE
        );
        assert_eq!(
            sb.data_start,
            sb.inode_start + sb.inode_cluster_count * CLUSTER_SIZE
        );
        assert_eq!(
            sb.cluster_count,
            1 + sb.bitmap_cluster_count + sb.inode_cluster_count + sb.data_cluster_count
        );
    }

    #[test]
    fn geometry_rejects_tiny_sizes() {
        Superblock::with_size(0).unwrap_err();
        Superblock::with_size(4096).unwrap_err();
        // 12 clusters: not even one cluster's worth of inode table.
        Superblock::with_size(50_000).unwrap_err();
    }

    #[test]
    fn codec_round_trip() {
        let sb = Superblock::with_size(1_000_000).unwrap();
        assert_eq!(Superblock::decode(&sb.encode()), sb);
    }

    #[test]
    fn encoded_field_order() {
        let sb = Superblock::with_size(1_000_000).unwrap();
        let buf = sb.encode();
        assert_eq!(&buf[..SIGNATURE.len()], SIGNATURE.as_bytes());
        assert_eq!(buf[SIGNATURE.len()..SIGNATURE_LEN], [0; 7]);
        let at = |off: usize| i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        assert_eq!(at(20), 1_000_000);
        assert_eq!(at(24), 4096);
        assert_eq!(at(28), 244);
        assert_eq!(at(56), sb.data_start);
    }
}
