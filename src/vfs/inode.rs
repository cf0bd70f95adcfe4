//! Inode records and the fixed inode table.
//!
//! An inode is a 38-byte little-endian record: id, directory flag, link
//! count, logical size, five direct block indices and two single-level
//! indirect block indices. Id `-1` marks a free record.

use crate::error::{FsError, Result};
use crate::image::Image;
use crate::superblock::Superblock;
use std::io;

/// On-disk size of one inode record in bytes.
pub const INODE_SIZE: i32 = 38;
/// Marker for a free inode id or an unused block pointer.
pub const ID_FREE: i32 = -1;
/// Number of direct block pointers per inode.
pub const DIRECT_COUNT: usize = 5;
/// Number of single-level indirect block pointers per inode.
pub const INDIRECT_COUNT: usize = 2;

/// One inode record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inode {
    pub node_id: i32,
    pub is_directory: bool,
    /// Hard-link count. An allocated inode always has at least one.
    pub references: i8,
    /// Logical byte size for files; aggregated subtree bytes for
    /// directories.
    pub file_size: i32,
    pub direct: [i32; DIRECT_COUNT],
    pub indirect: [i32; INDIRECT_COUNT],
}

impl Inode {
    /// The record state of a free inode. `references` starts at 1 so the
    /// next allocation begins with a correct link count.
    pub fn free() -> Self {
        Self {
            node_id: ID_FREE,
            is_directory: false,
            references: 1,
            file_size: 0,
            direct: [ID_FREE; DIRECT_COUNT],
            indirect: [ID_FREE; INDIRECT_COUNT],
        }
    }

    pub fn is_free(&self) -> bool {
        self.node_id == ID_FREE
    }

    fn encode(&self) -> [u8; INODE_SIZE as usize] {
        let mut buf = [0; INODE_SIZE as usize];
        buf[0..4].copy_from_slice(&self.node_id.to_le_bytes());
        buf[4] = self.is_directory as u8;
        buf[5] = self.references as u8;
        buf[6..10].copy_from_slice(&self.file_size.to_le_bytes());
        for (i, d) in self.direct.iter().enumerate() {
            buf[10 + i * 4..14 + i * 4].copy_from_slice(&d.to_le_bytes());
        }
        for (i, ind) in self.indirect.iter().enumerate() {
            buf[30 + i * 4..34 + i * 4].copy_from_slice(&ind.to_le_bytes());
        }
        buf
    }

    fn decode(buf: &[u8]) -> Self {
        let at = |off: usize| i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let mut direct = [ID_FREE; DIRECT_COUNT];
        let mut indirect = [ID_FREE; INDIRECT_COUNT];
        for (i, d) in direct.iter_mut().enumerate() {
            *d = at(10 + i * 4);
        }
        for (i, ind) in indirect.iter_mut().enumerate() {
            *ind = at(30 + i * 4);
        }
        Self {
            node_id: at(0),
            is_directory: buf[4] != 0,
            references: buf[5] as i8,
            file_size: at(6),
            direct,
            indirect,
        }
    }
}

/// The fixed-size table of all inode records.
pub struct InodeTable {
    inodes: Vec<Inode>,
}

impl InodeTable {
    /// A table of `count` free inodes.
    pub fn new_free(count: i32) -> Self {
        Self {
            inodes: vec![Inode::free(); count as usize],
        }
    }

    /// Reads the whole inode region back from the image.
    pub fn read(img: &mut Image, sb: &Superblock) -> io::Result<Self> {
        let mut buf = vec![0; (sb.inode_count * INODE_SIZE) as usize];
        img.seek_to_inode(sb, 0)?;
        img.read_exact(&mut buf)?;
        let inodes = buf
            .chunks_exact(INODE_SIZE as usize)
            .map(Inode::decode)
            .collect();
        Ok(Self { inodes })
    }

    pub fn count(&self) -> i32 {
        self.inodes.len() as i32
    }

    /// Tells whether `id` names a record inside the table.
    pub fn contains(&self, id: i32) -> bool {
        id >= 0 && (id as usize) < self.inodes.len()
    }

    pub fn get(&self, id: i32) -> &Inode {
        &self.inodes[id as usize]
    }

    pub fn get_mut(&mut self, id: i32) -> &mut Inode {
        &mut self.inodes[id as usize]
    }

    /// First free inode, scanning upwards from index 1 (0 is root).
    pub fn find_free(&self) -> Result<i32> {
        self.inodes[1..]
            .iter()
            .position(Inode::is_free)
            .map(|i| i as i32 + 1)
            .ok_or(FsError::NoFreeInodes)
    }

    /// Resets `id` to the free state in memory.
    pub fn reset(&mut self, id: i32) {
        self.inodes[id as usize] = Inode::free();
    }

    /// Writes record `id` back to the inode region.
    pub fn write(&self, img: &mut Image, sb: &Superblock, id: i32) -> io::Result<()> {
        img.seek_to_inode(sb, id)?;
        img.write_all(&self.inodes[id as usize].encode())?;
        img.flush()
    }

    /// Writes the whole table back to the inode region.
    pub fn write_all(&self, img: &mut Image, sb: &Superblock) -> io::Result<()> {
        let mut buf = Vec::with_capacity(self.inodes.len() * INODE_SIZE as usize);
        for inode in &self.inodes {
            buf.extend_from_slice(&inode.encode());
        }
        img.seek_to_inode(sb, 0)?;
        img.write_all(&buf)?;
        img.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_round_trip() {
        let inode = Inode {
            node_id: 7,
            is_directory: true,
            references: 3,
            file_size: 12345,
            direct: [1, 2, ID_FREE, ID_FREE, ID_FREE],
            indirect: [9, ID_FREE],
        };
        assert_eq!(Inode::decode(&inode.encode()), inode);
    }

    #[test]
    fn free_record_layout() {
        let buf = Inode::free().encode();
        assert_eq!(&buf[0..4], &(-1i32).to_le_bytes());
        assert_eq!(buf[4], 0);
        assert_eq!(buf[5], 1);
        assert_eq!(&buf[6..10], &0i32.to_le_bytes());
        for i in 0..7 {
            assert_eq!(&buf[10 + i * 4..14 + i * 4], &(-1i32).to_le_bytes());
        }
    }

    #[test]
    fn find_free_skips_root() {
        let mut table = InodeTable::new_free(4);
        table.get_mut(0).node_id = 0;
        assert_eq!(table.find_free().unwrap(), 1);
        table.get_mut(1).node_id = 1;
        table.get_mut(2).node_id = 2;
        assert_eq!(table.find_free().unwrap(), 3);
        table.get_mut(3).node_id = 3;
        table.find_free().unwrap_err();
    }
}
