//! Mapping between an inode and its ordered list of data clusters.
//!
//! The first five blocks of a file sit in the inode's direct pointers; the
//! rest are indexed through up to two single-level indirect clusters of 1024
//! little-endian `i32` entries each. Entry value 0 marks an unused index
//! slot, so a valid data block index is always at least 1.

use crate::bitmap::Bitmap;
use crate::error::{FsError, Result};
use crate::image::Image;
use crate::inode::{DIRECT_COUNT, ID_FREE, InodeTable};
use crate::superblock::{CLUSTER_SIZE, Superblock};
use std::io;

/// Number of block indices held by one indirect cluster.
pub const INDEX_PER_CLUSTER: usize = (CLUSTER_SIZE / 4) as usize;
/// Largest number of data blocks a single inode can address.
pub const MAX_DATA_BLOCKS: i32 = DIRECT_COUNT as i32 + 2 * INDEX_PER_CLUSTER as i32;

/// Physical block demand for a file of `block_count` data blocks, counting
/// the indirect clusters the mapping itself needs.
pub fn with_indirect(block_count: i32) -> Result<i32> {
    if block_count <= DIRECT_COUNT as i32 {
        Ok(block_count)
    } else if block_count <= DIRECT_COUNT as i32 + INDEX_PER_CLUSTER as i32 {
        Ok(block_count + 1)
    } else if block_count <= MAX_DATA_BLOCKS {
        Ok(block_count + 2)
    } else {
        Err(FsError::FileTooLarge)
    }
}

/// Data block count and tail remainder for a file of `file_size` bytes.
///
/// A zero-byte file still occupies one block, with a zero tail.
pub fn file_blocks(file_size: i32) -> (i32, i32) {
    let mut count = file_size / CLUSTER_SIZE;
    let rest = file_size % CLUSTER_SIZE;
    if rest != 0 || count == 0 {
        count += 1;
    }
    (count, rest)
}

/// Number of live bytes in the last data block of a file.
pub fn tail_len(file_size: i32) -> i32 {
    match file_size % CLUSTER_SIZE {
        0 if file_size == 0 => 0,
        0 => CLUSTER_SIZE,
        rest => rest,
    }
}

/// Reads all 1024 index entries of an indirect cluster.
pub fn read_index_cluster(img: &mut Image, sb: &Superblock, block: i32) -> io::Result<Vec<i32>> {
    let mut buf = [0; CLUSTER_SIZE as usize];
    img.seek_to_cluster(sb, block)?;
    img.read_exact(&mut buf)?;
    Ok(buf
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

/// Overwrites an indirect cluster with `entries`, zero-filling the rest.
pub fn write_index_cluster(
    img: &mut Image,
    sb: &Superblock,
    block: i32,
    entries: &[i32],
) -> io::Result<()> {
    let mut buf = [0; CLUSTER_SIZE as usize];
    for (i, e) in entries.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&e.to_le_bytes());
    }
    img.seek_to_cluster(sb, block)?;
    img.write_all(&buf)
}

/// Installs a fresh file mapping into inode `id`.
///
/// `blocks` holds `with_indirect(data_blocks)` reserved clusters: the data
/// blocks in logical order, then the indirect cluster(s). With two indirect
/// clusters the last-but-one entry becomes `indirect[0]` and the last
/// `indirect[1]`. Returns the index into `blocks` of the final data block,
/// which is where the caller positions the tail write.
pub fn install(
    img: &mut Image,
    sb: &Superblock,
    inodes: &mut InodeTable,
    id: i32,
    file_size: i32,
    data_blocks: i32,
    blocks: &[i32],
) -> Result<usize> {
    let n = data_blocks as usize;
    let node = inodes.get_mut(id);
    node.node_id = id;
    node.is_directory = false;
    node.references = 1;
    node.file_size = file_size;
    node.direct = [ID_FREE; DIRECT_COUNT];
    node.indirect = [ID_FREE; 2];
    for i in 0..n.min(DIRECT_COUNT) {
        node.direct[i] = blocks[i];
    }

    if n > DIRECT_COUNT {
        let first_split = DIRECT_COUNT + INDEX_PER_CLUSTER;
        if n <= first_split {
            node.indirect[0] = blocks[blocks.len() - 1];
            let first = node.indirect[0];
            write_index_cluster(img, sb, first, &blocks[DIRECT_COUNT..n])?;
        } else {
            node.indirect[0] = blocks[blocks.len() - 2];
            node.indirect[1] = blocks[blocks.len() - 1];
            let (first, second) = (node.indirect[0], node.indirect[1]);
            write_index_cluster(img, sb, first, &blocks[DIRECT_COUNT..first_split])?;
            write_index_cluster(img, sb, second, &blocks[first_split..n])?;
        }
    }
    Ok(n - 1)
}

/// Enumerates the data blocks mapped by inode `id`, in logical order.
///
/// For files the count is derived from `file_size`; for directories every
/// populated pointer is collected, reading the indirect clusters only when
/// they exist.
pub fn enumerate(
    img: &mut Image,
    sb: &Superblock,
    inodes: &InodeTable,
    id: i32,
) -> io::Result<Vec<i32>> {
    let node = *inodes.get(id);
    let mut blocks = Vec::new();
    if node.is_directory {
        for d in node.direct {
            if d != ID_FREE {
                blocks.push(d);
            }
        }
        for ind in node.indirect {
            if ind != ID_FREE {
                blocks.extend(
                    read_index_cluster(img, sb, ind)?
                        .into_iter()
                        .filter(|&b| b > 0),
                );
            }
        }
    } else {
        let (count, _) = file_blocks(node.file_size);
        let count = count as usize;
        blocks.extend(&node.direct[..count.min(DIRECT_COUNT)]);
        if count > DIRECT_COUNT {
            let entries = read_index_cluster(img, sb, node.indirect[0])?;
            let take = (count - DIRECT_COUNT).min(INDEX_PER_CLUSTER);
            blocks.extend(&entries[..take]);
        }
        if count > DIRECT_COUNT + INDEX_PER_CLUSTER {
            let entries = read_index_cluster(img, sb, node.indirect[1])?;
            blocks.extend(&entries[..count - DIRECT_COUNT - INDEX_PER_CLUSTER]);
        }
    }
    Ok(blocks)
}

/// Releases every cluster mapped by inode `id`: data clusters and indirect
/// clusters are zeroed and returned to the bitmap, and the inode's pointers
/// are cleared in memory. The record itself is not written here.
pub fn release(
    img: &mut Image,
    sb: &Superblock,
    inodes: &mut InodeTable,
    bitmap: &mut Bitmap,
    id: i32,
) -> Result<()> {
    let mut freed = enumerate(img, sb, inodes, id)?;
    let node = inodes.get_mut(id);
    for ind in node.indirect.iter_mut() {
        if *ind != ID_FREE {
            freed.push(*ind);
            *ind = ID_FREE;
        }
    }
    node.direct = [ID_FREE; DIRECT_COUNT];

    let zero = [0; CLUSTER_SIZE as usize];
    for &block in &freed {
        img.seek_to_cluster(sb, block)?;
        img.write_all(&zero)?;
    }
    bitmap.free(img, sb, &freed)?;
    img.flush()?;
    Ok(())
}
