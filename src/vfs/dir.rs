//! Directory representation: 64-byte on-disk slots and the cached in-memory
//! tree.
//!
//! A directory cluster holds 64 slots. Each slot is a little-endian `i32`
//! inode id, a 12-byte null-padded name (11 significant characters) and 48
//! bytes of zero padding. Id 0 marks a free slot; the root inode is 0 and
//! never appears inside another directory, so the marker is unambiguous.
//!
//! After every successful insert or removal the slot layout on disk exactly
//! mirrors the in-memory child lists.

use crate::bitmap::Bitmap;
use crate::blockmap;
use crate::error::{FsError, Result};
use crate::image::Image;
use crate::inode::{ID_FREE, INDIRECT_COUNT, InodeTable};
use crate::superblock::{CLUSTER_SIZE, Superblock};
use std::collections::HashMap;
use std::io;

/// On-disk length of the name field.
pub const NAME_LEN: usize = 12;
/// Longest accepted entry name, leaving room for the terminator.
pub const NAME_MAX: usize = NAME_LEN - 1;
/// On-disk stride of one directory slot.
pub const SLOT_SIZE: usize = 64;
/// Number of slots per directory cluster.
pub const SLOTS_PER_CLUSTER: usize = CLUSTER_SIZE as usize / SLOT_SIZE;

/// Inode id of the root directory.
pub const ROOT_ID: i32 = 0;

/// One child entry of a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: i32,
    pub name: String,
}

/// A cached directory: its identity plus child entries split by kind.
/// Insertion order is preserved; listings rely on it.
#[derive(Clone, Debug)]
pub struct DirNode {
    pub id: i32,
    /// Parent directory id. Root is its own parent.
    pub parent: i32,
    pub name: String,
    pub subdirs: Vec<DirEntry>,
    pub files: Vec<DirEntry>,
}

impl DirNode {
    pub fn new(id: i32, parent: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            parent,
            name: name.into(),
            subdirs: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subdirs.is_empty() && self.files.is_empty()
    }
}

/// The whole directory tree, keyed by inode id. Rebuilt on mount.
pub struct DirTree {
    nodes: HashMap<i32, DirNode>,
}

impl DirTree {
    /// A tree holding only the root directory.
    pub fn with_root() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, DirNode::new(ROOT_ID, ROOT_ID, "/"));
        Self { nodes }
    }

    pub fn contains(&self, id: i32) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: i32) -> &DirNode {
        &self.nodes[&id]
    }

    pub fn get_mut(&mut self, id: i32) -> &mut DirNode {
        self.nodes.get_mut(&id).expect("unknown directory id")
    }

    pub fn add(&mut self, node: DirNode) {
        self.nodes.insert(node.id, node);
    }

    pub fn remove(&mut self, id: i32) {
        self.nodes.remove(&id);
    }

    pub fn find_subdir(&self, dir: i32, name: &str) -> Option<&DirEntry> {
        self.get(dir).subdirs.iter().find(|e| e.name == name)
    }

    pub fn find_file(&self, dir: i32, name: &str) -> Option<&DirEntry> {
        self.get(dir).files.iter().find(|e| e.name == name)
    }

    /// Tells whether `name` is taken by any child of `dir`, of either kind.
    pub fn name_taken(&self, dir: i32, name: &str) -> bool {
        self.find_subdir(dir, name).is_some() || self.find_file(dir, name).is_some()
    }
}

/// Encodes an entry name into its fixed on-disk field.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut buf = [0; NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_MAX);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

/// Decodes a name field up to its terminator.
pub fn decode_name(buf: &[u8]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

fn write_slot(
    img: &mut Image,
    sb: &Superblock,
    block: i32,
    slot: usize,
    entry: &DirEntry,
) -> io::Result<()> {
    let mut buf = [0; SLOT_SIZE];
    buf[0..4].copy_from_slice(&entry.inode.to_le_bytes());
    buf[4..4 + NAME_LEN].copy_from_slice(&encode_name(&entry.name));
    img.seek(sb.cluster_offset(block) + (slot * SLOT_SIZE) as u64)?;
    img.write_all(&buf)
}

/// Persists `entry` into the first free slot of directory `dir_id`,
/// growing the directory by one cluster when every slot is taken.
pub fn insert_slot(
    img: &mut Image,
    sb: &Superblock,
    inodes: &mut InodeTable,
    bitmap: &mut Bitmap,
    dir_id: i32,
    entry: &DirEntry,
) -> Result<()> {
    let blocks = blockmap::enumerate(img, sb, inodes, dir_id)?;
    let mut cluster = [0; CLUSTER_SIZE as usize];
    for &block in &blocks {
        img.seek_to_cluster(sb, block)?;
        img.read_exact(&mut cluster)?;
        for slot in 0..SLOTS_PER_CLUSTER {
            let off = slot * SLOT_SIZE;
            let id = i32::from_le_bytes(cluster[off..off + 4].try_into().unwrap());
            if id == 0 {
                write_slot(img, sb, block, slot, entry)?;
                img.flush()?;
                return Ok(());
            }
        }
    }
    grow_and_insert(img, sb, inodes, bitmap, dir_id, entry)
}

/// Attaches one new cluster to a full directory and stores `entry` in its
/// first slot. Free direct pointers are preferred; then a free index slot in
/// an existing indirect cluster; a fresh indirect cluster is allocated only
/// when neither exists.
fn grow_and_insert(
    img: &mut Image,
    sb: &Superblock,
    inodes: &mut InodeTable,
    bitmap: &mut Bitmap,
    dir_id: i32,
    entry: &DirEntry,
) -> Result<()> {
    let node = *inodes.get(dir_id);

    if let Some(i) = node.direct.iter().position(|&d| d == ID_FREE) {
        let block = bitmap.allocate(img, sb, 1)?[0];
        write_slot(img, sb, block, 0, entry)?;
        inodes.get_mut(dir_id).direct[i] = block;
        inodes.write(img, sb, dir_id)?;
        return Ok(());
    }

    for k in 0..INDIRECT_COUNT {
        if node.indirect[k] == ID_FREE {
            continue;
        }
        let entries = blockmap::read_index_cluster(img, sb, node.indirect[k])?;
        if let Some(pos) = entries.iter().position(|&e| e == 0) {
            let block = bitmap.allocate(img, sb, 1)?[0];
            write_slot(img, sb, block, 0, entry)?;
            img.seek(sb.cluster_offset(node.indirect[k]) + (pos * 4) as u64)?;
            img.write_i32(block)?;
            img.flush()?;
            return Ok(());
        }
    }

    if let Some(k) = node.indirect.iter().position(|&i| i == ID_FREE) {
        let blocks = bitmap.allocate(img, sb, 2)?;
        let (block, index) = (blocks[0], blocks[1]);
        write_slot(img, sb, block, 0, entry)?;
        blockmap::write_index_cluster(img, sb, index, &[block])?;
        inodes.get_mut(dir_id).indirect[k] = index;
        inodes.write(img, sb, dir_id)?;
        return Ok(());
    }

    Err(FsError::NoSpace)
}

/// Zeroes the on-disk slot of `entry` in directory `dir_id`.
///
/// Slots are matched on inode id and name bytes, so hard links sharing an
/// inode inside one directory cannot shadow each other. When the removal
/// empties a cluster other than the directory's first direct block, the
/// cluster is released and its pointer cleared.
pub fn remove_slot(
    img: &mut Image,
    sb: &Superblock,
    inodes: &mut InodeTable,
    bitmap: &mut Bitmap,
    dir_id: i32,
    entry: &DirEntry,
) -> Result<()> {
    let blocks = blockmap::enumerate(img, sb, inodes, dir_id)?;
    let name = encode_name(&entry.name);
    let mut cluster = [0; CLUSTER_SIZE as usize];
    for &block in &blocks {
        img.seek_to_cluster(sb, block)?;
        img.read_exact(&mut cluster)?;
        let mut found = None;
        let mut remaining = 0;
        for slot in 0..SLOTS_PER_CLUSTER {
            let off = slot * SLOT_SIZE;
            let id = i32::from_le_bytes(cluster[off..off + 4].try_into().unwrap());
            if id == 0 {
                continue;
            }
            if found.is_none() && id == entry.inode && cluster[off + 4..off + 4 + NAME_LEN] == name
            {
                found = Some(slot);
            } else {
                remaining += 1;
            }
        }
        let Some(slot) = found else {
            continue;
        };
        img.seek(sb.cluster_offset(block) + (slot * SLOT_SIZE) as u64)?;
        img.write_all(&[0; SLOT_SIZE])?;
        img.flush()?;
        if remaining == 0 && block != inodes.get(dir_id).direct[0] {
            release_dir_cluster(img, sb, inodes, bitmap, dir_id, block)?;
        }
        return Ok(());
    }
    Err(FsError::ItemNotFound)
}

/// Detaches an emptied directory cluster from `dir_id` and returns it to
/// the bitmap, along with its indirect cluster when that becomes empty too.
fn release_dir_cluster(
    img: &mut Image,
    sb: &Superblock,
    inodes: &mut InodeTable,
    bitmap: &mut Bitmap,
    dir_id: i32,
    block: i32,
) -> Result<()> {
    let node = *inodes.get(dir_id);

    if let Some(i) = node.direct.iter().position(|&d| d == block) {
        inodes.get_mut(dir_id).direct[i] = ID_FREE;
        inodes.write(img, sb, dir_id)?;
        bitmap.free(img, sb, &[block])?;
        return Ok(());
    }

    for k in 0..INDIRECT_COUNT {
        if node.indirect[k] == ID_FREE {
            continue;
        }
        let entries = blockmap::read_index_cluster(img, sb, node.indirect[k])?;
        let Some(pos) = entries.iter().position(|&e| e == block) else {
            continue;
        };
        img.seek(sb.cluster_offset(node.indirect[k]) + (pos * 4) as u64)?;
        img.write_i32(0)?;
        img.flush()?;
        let live = entries.iter().enumerate().any(|(j, &e)| j != pos && e > 0);
        if live {
            bitmap.free(img, sb, &[block])?;
        } else {
            // The index cluster is all zeros now and can go as well.
            inodes.get_mut(dir_id).indirect[k] = ID_FREE;
            inodes.write(img, sb, dir_id)?;
            bitmap.free(img, sb, &[block, node.indirect[k]])?;
        }
        return Ok(());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_codec_round_trip() {
        let buf = encode_name("hello.txt");
        assert_eq!(decode_name(&buf), "hello.txt");
        assert_eq!(buf[9..], [0; 3]);
    }

    #[test]
    fn name_truncates_to_eleven() {
        let buf = encode_name("averylongfilename");
        assert_eq!(buf[NAME_MAX], 0);
        assert_eq!(decode_name(&buf), "averylongfi");
    }

    #[test]
    fn tree_lookup_by_kind() {
        let mut tree = DirTree::with_root();
        tree.get_mut(ROOT_ID).subdirs.push(DirEntry {
            inode: 1,
            name: "a".into(),
        });
        tree.get_mut(ROOT_ID).files.push(DirEntry {
            inode: 2,
            name: "b".into(),
        });
        assert!(tree.find_subdir(ROOT_ID, "a").is_some());
        assert!(tree.find_file(ROOT_ID, "a").is_none());
        assert!(tree.name_taken(ROOT_ID, "b"));
        assert!(!tree.name_taken(ROOT_ID, "c"));
    }
}
