//! The filesystem engine: every shell command maps to one entry point here.
//!
//! The engine owns the backing-file handle and the in-memory mirrors
//! (superblock, bitmap, inode table, directory tree). Commands execute
//! strictly serially; within one command, writes follow a fixed discipline
//! so a failed step leaves the image inspectable: reserve clusters, write
//! data, write the inode record, then the parent directory slot, flushing as
//! each step completes.
//!
//! Before a successful `format` (missing or empty backing file) the engine
//! is in limited mode and every operation except `format` reports
//! [`FsError::NotAvailable`].

use crate::bitmap::Bitmap;
use crate::blockmap;
use crate::dir::{
    self, DirEntry, DirNode, DirTree, NAME_LEN, NAME_MAX, ROOT_ID, SLOT_SIZE, SLOTS_PER_CLUSTER,
};
use crate::error::{FsError, Result};
use crate::image::Image;
use crate::inode::{DIRECT_COUNT, ID_FREE, INDIRECT_COUNT, InodeTable};
use crate::path;
use crate::superblock::{CLUSTER_SIZE, Superblock};
use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Kind of a directory child, for listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Directory,
    File,
}

/// The filesystem engine bound to one backing file.
pub struct FsEngine {
    path: PathBuf,
    fs: Option<Fs>,
}

/// The mounted state: the image handle plus all in-memory mirrors.
struct Fs {
    img: Image,
    sb: Superblock,
    bitmap: Bitmap,
    inodes: InodeTable,
    tree: DirTree,
    cwd: i32,
}

impl FsEngine {
    /// Binds the engine to `path` and mounts the image when it already
    /// holds a filesystem. A missing or empty file leaves the engine in
    /// limited mode; `format` creates the filesystem from scratch.
    pub fn open(path: PathBuf) -> Self {
        let mut engine = Self { path, fs: None };
        let _ = engine.mount();
        engine
    }

    pub fn is_formatted(&self) -> bool {
        self.fs.is_some()
    }

    fn fs(&self) -> Result<&Fs> {
        self.fs.as_ref().ok_or(FsError::NotAvailable)
    }

    fn fs_mut(&mut self) -> Result<&mut Fs> {
        self.fs.as_mut().ok_or(FsError::NotAvailable)
    }

    /// Creates a fresh filesystem of `size` bytes in the backing file,
    /// overwriting whatever it held. On failure the engine stays
    /// unformatted.
    pub fn format(&mut self, size: i64) -> Result<()> {
        self.fs = None;
        if size <= 0 || size > i32::MAX as i64 {
            return Err(FsError::InvalidSize);
        }
        let sb = Superblock::with_size(size as i32)?;
        let mut img = Image::create(&self.path)?;

        let zero = [0; CLUSTER_SIZE as usize];
        img.seek(0)?;
        for _ in 0..sb.cluster_count {
            img.write_all(&zero)?;
        }
        sb.write(&mut img)?;

        // Data cluster 0 holds the root directory from the start.
        let mut bitmap = Bitmap::zeroed(sb.data_cluster_count);
        bitmap.mark(&mut img, &sb, 0, true)?;

        let mut inodes = InodeTable::new_free(sb.inode_count);
        let root = inodes.get_mut(ROOT_ID);
        root.node_id = ROOT_ID;
        root.is_directory = true;
        root.direct[0] = 0;
        inodes.write_all(&mut img, &sb)?;
        img.flush()?;

        self.fs = Some(Fs {
            img,
            sb,
            bitmap,
            inodes,
            tree: DirTree::with_root(),
            cwd: ROOT_ID,
        });
        Ok(())
    }

    /// Reads the image back and rebuilds the in-memory mirrors.
    fn mount(&mut self) -> Result<()> {
        let mut img = Image::open(&self.path)?;
        if img.is_empty()? {
            return Err(FsError::NotAvailable);
        }
        let sb = Superblock::read(&mut img)?;
        if sb.cluster_size != CLUSTER_SIZE || sb.data_cluster_count <= 0 || sb.inode_count <= 0 {
            return Err(FsError::NotAvailable);
        }
        let bitmap = Bitmap::read(&mut img, &sb)?;
        let inodes = InodeTable::read(&mut img, &sb)?;
        let mut fs = Fs {
            img,
            sb,
            bitmap,
            inodes,
            tree: DirTree::with_root(),
            cwd: ROOT_ID,
        };
        fs.load_dir(ROOT_ID)?;
        self.fs = Some(fs);
        Ok(())
    }

    /// The current path, reconstructed from the directory tree.
    pub fn pwd(&self) -> String {
        match &self.fs {
            Some(fs) => fs.current_path(),
            None => "/".into(),
        }
    }

    /// Switches the current directory; returns the new path.
    pub fn cd(&mut self, path: &str) -> Result<String> {
        let fs = self.fs_mut()?;
        fs.cwd = fs.resolve_dir(path)?;
        Ok(fs.current_path())
    }

    /// Lists the children of `path` (or of the current directory),
    /// subdirectories first, in insertion order.
    pub fn ls(&self, path: Option<&str>) -> Result<Vec<(ItemKind, String)>> {
        let fs = self.fs()?;
        let dir = match path {
            Some(p) => fs.resolve_dir(p)?,
            None => fs.cwd,
        };
        let node = fs.tree.get(dir);
        let mut out = Vec::with_capacity(node.subdirs.len() + node.files.len());
        out.extend(
            node.subdirs
                .iter()
                .map(|e| (ItemKind::Directory, e.name.clone())),
        );
        out.extend(node.files.iter().map(|e| (ItemKind::File, e.name.clone())));
        Ok(out)
    }

    pub fn mkdir(&mut self, parent: &str, name: &str) -> Result<()> {
        self.fs_mut()?.mkdir(parent, name)
    }

    pub fn rmdir(&mut self, parent: &str, name: &str) -> Result<()> {
        self.fs_mut()?.rmdir(parent, name)
    }

    pub fn rm(&mut self, path: &str) -> Result<()> {
        self.fs_mut()?.rm(path)
    }

    pub fn cp(&mut self, src: &str, dst: &str) -> Result<()> {
        self.fs_mut()?.cp(src, dst)
    }

    pub fn mv(&mut self, src: &str, dst: &str) -> Result<()> {
        self.fs_mut()?.mv(src, dst)
    }

    pub fn ln(&mut self, src: &str, dst: &str) -> Result<()> {
        self.fs_mut()?.ln(src, dst)
    }

    pub fn cat(&mut self, path: &str) -> Result<Vec<u8>> {
        self.fs_mut()?.cat(path)
    }

    pub fn incp(&mut self, host: &Path, dst: &str) -> Result<()> {
        self.fs_mut()?.incp(host, dst)
    }

    pub fn outcp(&mut self, src: &str, host: &Path) -> Result<()> {
        self.fs_mut()?.outcp(src, host)
    }

    pub fn info(&mut self, path: Option<&str>) -> Result<String> {
        self.fs_mut()?.info(path)
    }
}

impl Fs {
    /// Rebuilds the cached tree for `dir_id` and, recursively, every
    /// subdirectory found in its slots.
    fn load_dir(&mut self, dir_id: i32) -> Result<()> {
        let blocks = blockmap::enumerate(&mut self.img, &self.sb, &self.inodes, dir_id)?;
        let mut cluster = [0; CLUSTER_SIZE as usize];
        let mut subdirs = Vec::new();
        for block in blocks {
            self.img.seek_to_cluster(&self.sb, block)?;
            self.img.read_exact(&mut cluster)?;
            for slot in 0..SLOTS_PER_CLUSTER {
                let off = slot * SLOT_SIZE;
                let id = i32::from_le_bytes(cluster[off..off + 4].try_into().unwrap());
                if id <= 0 || !self.inodes.contains(id) {
                    continue;
                }
                let name = dir::decode_name(&cluster[off + 4..off + 4 + NAME_LEN]);
                let entry = DirEntry { inode: id, name: name.clone() };
                if self.inodes.get(id).is_directory {
                    // A second sighting of an id would cycle; skip it.
                    if !self.tree.contains(id) {
                        self.tree.add(DirNode::new(id, dir_id, name));
                        self.tree.get_mut(dir_id).subdirs.push(entry);
                        subdirs.push(id);
                    }
                } else {
                    self.tree.get_mut(dir_id).files.push(entry);
                }
            }
        }
        for id in subdirs {
            self.load_dir(id)?;
        }
        Ok(())
    }

    fn current_path(&self) -> String {
        let mut segments = Vec::new();
        let mut id = self.cwd;
        while id != ROOT_ID {
            let node = self.tree.get(id);
            segments.push(node.name.clone());
            id = node.parent;
        }
        if segments.is_empty() {
            return "/".into();
        }
        let mut out = String::new();
        for segment in segments.iter().rev() {
            out.push('/');
            out.push_str(segment);
        }
        out
    }

    fn resolve_dir(&self, path: &str) -> Result<i32> {
        path::resolve(&self.tree, self.cwd, path).ok_or(FsError::PathNotFound)
    }

    /// Resolves the parent directory of a file operation.
    fn resolve_parent(&self, path: &str) -> Result<i32> {
        path::resolve(&self.tree, self.cwd, path).ok_or(FsError::DirectoryNotFound)
    }

    fn file_entry(&self, dir: i32, name: &str) -> Result<DirEntry> {
        self.tree
            .find_file(dir, name)
            .cloned()
            .ok_or(FsError::FileNotFound)
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        if name.len() > NAME_MAX {
            return Err(FsError::NameTooLong);
        }
        Ok(())
    }

    /// Adds `delta` to the aggregated size of every directory from `dir` up
    /// to root, persisting each record. The field is a cache for `info`,
    /// not space accounting.
    fn update_ancestor_sizes(&mut self, mut dir: i32, delta: i32) -> Result<()> {
        loop {
            self.inodes.get_mut(dir).file_size += delta;
            self.inodes.write(&mut self.img, &self.sb, dir)?;
            if dir == ROOT_ID {
                return Ok(());
            }
            dir = self.tree.get(dir).parent;
        }
    }

    fn mkdir(&mut self, parent_path: &str, name: &str) -> Result<()> {
        let parent = self.resolve_dir(parent_path)?;
        Self::check_name(name)?;
        if self.tree.name_taken(parent, name) {
            return Err(FsError::Exists);
        }
        let id = self.inodes.find_free()?;
        let block = self.bitmap.allocate(&mut self.img, &self.sb, 1)?[0];
        let node = self.inodes.get_mut(id);
        node.node_id = id;
        node.is_directory = true;
        node.references = 1;
        node.file_size = 0;
        node.direct = [ID_FREE; DIRECT_COUNT];
        node.direct[0] = block;
        node.indirect = [ID_FREE; INDIRECT_COUNT];
        self.inodes.write(&mut self.img, &self.sb, id)?;

        let entry = DirEntry {
            inode: id,
            name: name.into(),
        };
        self.tree.add(DirNode::new(id, parent, name));
        self.tree.get_mut(parent).subdirs.push(entry.clone());
        dir::insert_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            parent,
            &entry,
        )?;
        self.img.flush()?;
        Ok(())
    }

    fn rmdir(&mut self, parent_path: &str, name: &str) -> Result<()> {
        let parent = self.resolve_dir(parent_path)?;
        let entry = self
            .tree
            .find_subdir(parent, name)
            .cloned()
            .ok_or(FsError::FileNotFound)?;
        if !self.tree.get(entry.inode).is_empty() {
            return Err(FsError::NotEmpty);
        }
        if self.cwd == entry.inode {
            self.cwd = parent;
        }
        blockmap::release(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            entry.inode,
        )?;
        self.inodes.reset(entry.inode);
        self.inodes.write(&mut self.img, &self.sb, entry.inode)?;
        self.tree.get_mut(parent).subdirs.retain(|e| e.name != name);
        dir::remove_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            parent,
            &entry,
        )?;
        self.tree.remove(entry.inode);
        self.img.flush()?;
        Ok(())
    }

    fn rm(&mut self, file_path: &str) -> Result<()> {
        let (dir_path, name) = path::split(file_path);
        let dir = self.resolve_parent(dir_path)?;
        let entry = self.file_entry(dir, name)?;
        self.unlink(dir, &entry)
    }

    /// Drops one directory entry of an inode. The data is released only
    /// when the last reference goes away.
    fn unlink(&mut self, dir: i32, entry: &DirEntry) -> Result<()> {
        let id = entry.inode;
        self.inodes.get_mut(id).references -= 1;
        if self.inodes.get(id).references == 0 {
            let size = self.inodes.get(id).file_size;
            blockmap::release(
                &mut self.img,
                &self.sb,
                &mut self.inodes,
                &mut self.bitmap,
                id,
            )?;
            self.update_ancestor_sizes(dir, -size)?;
            self.inodes.reset(id);
        }
        self.inodes.write(&mut self.img, &self.sb, id)?;
        self.tree
            .get_mut(dir)
            .files
            .retain(|e| !(e.inode == entry.inode && e.name == entry.name));
        dir::remove_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            dir,
            entry,
        )?;
        self.img.flush()?;
        Ok(())
    }

    fn cp(&mut self, src: &str, dst: &str) -> Result<()> {
        let (src_dir_path, src_name) = path::split(src);
        let src_dir = self.resolve_parent(src_dir_path)?;
        let src_entry = self.file_entry(src_dir, src_name)?;
        let (dst_dir_path, dst_name) = path::split(dst);
        let dst_dir = self.resolve_parent(dst_dir_path)?;
        let dst_name = if dst_name.is_empty() { src_name } else { dst_name };
        Self::check_name(dst_name)?;
        if self.tree.name_taken(dst_dir, dst_name) {
            return Err(FsError::Exists);
        }

        let size = self.inodes.get(src_entry.inode).file_size;
        let (block_count, _) = blockmap::file_blocks(size);
        let total = blockmap::with_indirect(block_count)?;
        let id = self.inodes.find_free()?;
        let blocks = self
            .bitmap
            .allocate(&mut self.img, &self.sb, total as usize)?;
        let src_blocks = blockmap::enumerate(&mut self.img, &self.sb, &self.inodes, src_entry.inode)?;
        let last = blockmap::install(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            id,
            size,
            block_count,
            &blocks,
        )?;

        // Full clusters, then the tail. The copy shares nothing with the
        // source inode.
        let mut buf = [0; CLUSTER_SIZE as usize];
        let n = block_count as usize;
        for i in 0..n - 1 {
            self.img.seek_to_cluster(&self.sb, src_blocks[i])?;
            self.img.read_exact(&mut buf)?;
            self.img.seek_to_cluster(&self.sb, blocks[i])?;
            self.img.write_all(&buf)?;
        }
        let tail = blockmap::tail_len(size) as usize;
        self.img.seek_to_cluster(&self.sb, src_blocks[n - 1])?;
        self.img.read_exact(&mut buf[..tail])?;
        self.img.seek_to_cluster(&self.sb, blocks[last])?;
        self.img.write_all(&buf[..tail])?;

        self.inodes.write(&mut self.img, &self.sb, id)?;
        let entry = DirEntry {
            inode: id,
            name: dst_name.into(),
        };
        self.tree.get_mut(dst_dir).files.push(entry.clone());
        dir::insert_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            dst_dir,
            &entry,
        )?;
        self.update_ancestor_sizes(dst_dir, size)?;
        self.img.flush()?;
        Ok(())
    }

    fn mv(&mut self, src: &str, dst: &str) -> Result<()> {
        let (src_dir_path, src_name) = path::split(src);
        let src_dir = self.resolve_parent(src_dir_path)?;
        let src_entry = self.file_entry(src_dir, src_name)?;
        let (dst_dir_path, dst_name) = path::split(dst);
        let dst_dir = self.resolve_parent(dst_dir_path)?;
        let dst_name = if dst_name.is_empty() { src_name } else { dst_name };
        Self::check_name(dst_name)?;
        if self.tree.name_taken(dst_dir, dst_name) {
            return Err(FsError::Exists);
        }

        // The entry keeps its inode and data blocks; only the two
        // directories change.
        let size = self.inodes.get(src_entry.inode).file_size;
        self.tree
            .get_mut(src_dir)
            .files
            .retain(|e| e.name != src_entry.name);
        dir::remove_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            src_dir,
            &src_entry,
        )?;
        self.update_ancestor_sizes(src_dir, -size)?;

        let entry = DirEntry {
            inode: src_entry.inode,
            name: dst_name.into(),
        };
        self.tree.get_mut(dst_dir).files.push(entry.clone());
        dir::insert_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            dst_dir,
            &entry,
        )?;
        self.update_ancestor_sizes(dst_dir, size)?;
        self.img.flush()?;
        Ok(())
    }

    fn ln(&mut self, src: &str, dst: &str) -> Result<()> {
        let (src_dir_path, src_name) = path::split(src);
        let src_dir = self.resolve_parent(src_dir_path)?;
        let src_entry = self.file_entry(src_dir, src_name)?;
        let (dst_dir_path, dst_name) = path::split(dst);
        let dst_dir = self.resolve_parent(dst_dir_path)?;
        let dst_name = if dst_name.is_empty() { src_name } else { dst_name };
        Self::check_name(dst_name)?;
        if self.tree.name_taken(dst_dir, dst_name) {
            return Err(FsError::Exists);
        }

        self.inodes.get_mut(src_entry.inode).references += 1;
        self.inodes.write(&mut self.img, &self.sb, src_entry.inode)?;
        let entry = DirEntry {
            inode: src_entry.inode,
            name: dst_name.into(),
        };
        self.tree.get_mut(dst_dir).files.push(entry.clone());
        dir::insert_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            dst_dir,
            &entry,
        )?;
        self.img.flush()?;
        Ok(())
    }

    fn cat(&mut self, file_path: &str) -> Result<Vec<u8>> {
        let (dir_path, name) = path::split(file_path);
        let dir = self.resolve_parent(dir_path)?;
        let entry = self.file_entry(dir, name)?;
        let size = self.inodes.get(entry.inode).file_size;
        let blocks = blockmap::enumerate(&mut self.img, &self.sb, &self.inodes, entry.inode)?;
        let (block_count, _) = blockmap::file_blocks(size);
        let n = block_count as usize;

        let mut out = Vec::with_capacity(size as usize);
        let mut buf = [0; CLUSTER_SIZE as usize];
        for i in 0..n - 1 {
            self.img.seek_to_cluster(&self.sb, blocks[i])?;
            self.img.read_exact(&mut buf)?;
            out.extend_from_slice(&buf);
        }
        let tail = blockmap::tail_len(size) as usize;
        self.img.seek_to_cluster(&self.sb, blocks[n - 1])?;
        self.img.read_exact(&mut buf[..tail])?;
        out.extend_from_slice(&buf[..tail]);
        Ok(out)
    }

    fn incp(&mut self, host: &Path, dst: &str) -> Result<()> {
        let (dst_dir_path, dst_name) = path::split(dst);
        let dst_dir = self.resolve_dir(dst_dir_path)?;
        let host_name;
        let dst_name = if dst_name.is_empty() {
            host_name = host
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or(FsError::InvalidArgument)?;
            host_name
        } else {
            dst_name
        };
        Self::check_name(dst_name)?;
        if self.tree.name_taken(dst_dir, dst_name) {
            return Err(FsError::Exists);
        }

        let mut src = File::open(host).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FsError::FileNotFound,
            _ => FsError::Io(e),
        })?;
        let len = src.metadata()?.len();
        if len > i32::MAX as u64 {
            return Err(FsError::FileTooLarge);
        }
        let size = len as i32;
        let (block_count, _) = blockmap::file_blocks(size);
        let total = blockmap::with_indirect(block_count)?;
        let id = self.inodes.find_free()?;
        let blocks = self
            .bitmap
            .allocate(&mut self.img, &self.sb, total as usize)?;
        let last = blockmap::install(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            id,
            size,
            block_count,
            &blocks,
        )?;

        let mut buf = [0; CLUSTER_SIZE as usize];
        let n = block_count as usize;
        for i in 0..n - 1 {
            src.read_exact(&mut buf)?;
            self.img.seek_to_cluster(&self.sb, blocks[i])?;
            self.img.write_all(&buf)?;
        }
        let tail = blockmap::tail_len(size) as usize;
        src.read_exact(&mut buf[..tail])?;
        self.img.seek_to_cluster(&self.sb, blocks[last])?;
        self.img.write_all(&buf[..tail])?;

        self.inodes.write(&mut self.img, &self.sb, id)?;
        let entry = DirEntry {
            inode: id,
            name: dst_name.into(),
        };
        self.tree.get_mut(dst_dir).files.push(entry.clone());
        dir::insert_slot(
            &mut self.img,
            &self.sb,
            &mut self.inodes,
            &mut self.bitmap,
            dst_dir,
            &entry,
        )?;
        self.update_ancestor_sizes(dst_dir, size)?;
        self.img.flush()?;
        Ok(())
    }

    fn outcp(&mut self, src: &str, host: &Path) -> Result<()> {
        let (dir_path, name) = path::split(src);
        let dir = self.resolve_parent(dir_path)?;
        let entry = self.file_entry(dir, name)?;
        let size = self.inodes.get(entry.inode).file_size;
        let blocks = blockmap::enumerate(&mut self.img, &self.sb, &self.inodes, entry.inode)?;
        let (block_count, _) = blockmap::file_blocks(size);
        let n = block_count as usize;

        let mut out = File::create(host)?;
        let mut buf = [0; CLUSTER_SIZE as usize];
        for i in 0..n - 1 {
            self.img.seek_to_cluster(&self.sb, blocks[i])?;
            self.img.read_exact(&mut buf)?;
            out.write_all(&buf)?;
        }
        let tail = blockmap::tail_len(size) as usize;
        self.img.seek_to_cluster(&self.sb, blocks[n - 1])?;
        self.img.read_exact(&mut buf[..tail])?;
        out.write_all(&buf[..tail])?;
        out.flush()?;
        Ok(())
    }

    fn info(&mut self, item_path: Option<&str>) -> Result<String> {
        let (name, id) = match item_path {
            None => {
                let node = self.tree.get(self.cwd);
                (node.name.clone(), node.id)
            }
            Some(p) => {
                let (dir_path, leaf) = path::split(p);
                let dir = self.resolve_parent(dir_path)?;
                if leaf.is_empty() {
                    let node = self.tree.get(dir);
                    (node.name.clone(), node.id)
                } else if let Some(e) = self.tree.find_file(dir, leaf) {
                    (e.name.clone(), e.inode)
                } else if let Some(e) = self.tree.find_subdir(dir, leaf) {
                    (e.name.clone(), e.inode)
                } else {
                    return Err(FsError::ItemNotFound);
                }
            }
        };
        let node = *self.inodes.get(id);
        let mut out = String::new();
        writeln!(out, "Name: {name}").unwrap();
        writeln!(out, "Size: {}B", node.file_size).unwrap();
        writeln!(out, "i-node: {}", node.node_id).unwrap();
        writeln!(out, "Direct blocks:").unwrap();
        for (i, d) in node.direct.iter().enumerate() {
            if *d != ID_FREE {
                writeln!(out, "  [{i}]: {d}").unwrap();
            }
        }
        for (i, ind) in node.indirect.iter().enumerate() {
            write!(out, "Indirect {} blocks:", i + 1).unwrap();
            if *ind == ID_FREE {
                write!(out, " FREE").unwrap();
            } else {
                for e in blockmap::read_index_cluster(&mut self.img, &self.sb, *ind)? {
                    if e > 0 {
                        write!(out, " {e}").unwrap();
                    }
                }
            }
            out.push('\n');
        }
        out.pop();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::process;

    fn temp_path(name: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("vfsh-{}-{name}", process::id()));
        let _ = fs::remove_file(&path);
        path
    }

    fn formatted(name: &str) -> FsEngine {
        let mut engine = FsEngine::open(temp_path(name));
        engine.format(1_000_000).unwrap();
        engine
    }

    fn host_file(name: &str, content: &[u8]) -> PathBuf {
        let path = temp_path(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn unformatted_engine_is_limited() {
        let mut engine = FsEngine::open(temp_path("limited.img"));
        assert!(!engine.is_formatted());
        assert_eq!(engine.pwd(), "/");
        assert!(matches!(engine.mkdir(".", "a"), Err(FsError::NotAvailable)));
        assert!(matches!(engine.ls(None), Err(FsError::NotAvailable)));
    }

    #[test]
    fn format_then_pwd() {
        let engine = formatted("format.img");
        assert!(engine.is_formatted());
        assert_eq!(engine.pwd(), "/");
    }

    #[test]
    fn format_rejects_unusable_sizes() {
        let mut engine = FsEngine::open(temp_path("badsize.img"));
        assert!(matches!(engine.format(0), Err(FsError::InvalidSize)));
        assert!(matches!(engine.format(50_000), Err(FsError::InvalidSize)));
        assert!(!engine.is_formatted());
    }

    #[test]
    fn mkdir_ls_rmdir() {
        let mut engine = formatted("mkdir.img");
        engine.mkdir(".", "a").unwrap();
        assert_eq!(engine.ls(None).unwrap(), vec![(ItemKind::Directory, "a".into())]);
        engine.rmdir(".", "a").unwrap();
        assert!(engine.ls(None).unwrap().is_empty());
    }

    #[test]
    fn first_mkdir_takes_lowest_inode_and_block() {
        let mut engine = formatted("determinism.img");
        engine.mkdir(".", "x").unwrap();
        let fs = engine.fs.as_ref().unwrap();
        let node = fs.inodes.get(1);
        assert_eq!(node.node_id, 1);
        assert!(node.is_directory);
        assert_eq!(node.direct[0], 1);
        assert!(fs.bitmap.is_set(1));
    }

    #[test]
    fn mkdir_errors() {
        let mut engine = formatted("mkdirerr.img");
        engine.mkdir(".", "a").unwrap();
        assert!(matches!(engine.mkdir(".", "a"), Err(FsError::Exists)));
        assert!(matches!(
            engine.mkdir(".", "twelvecharss"),
            Err(FsError::NameTooLong)
        ));
        assert!(matches!(
            engine.mkdir("missing", "b"),
            Err(FsError::PathNotFound)
        ));
    }

    #[test]
    fn rmdir_refuses_non_empty() {
        let mut engine = formatted("rmdirfull.img");
        engine.mkdir(".", "a").unwrap();
        engine.mkdir("a", "b").unwrap();
        assert!(matches!(engine.rmdir(".", "a"), Err(FsError::NotEmpty)));
        engine.rmdir("a", "b").unwrap();
        engine.rmdir(".", "a").unwrap();
    }

    #[test]
    fn rmdir_of_current_directory_moves_to_parent() {
        let mut engine = formatted("rmdircwd.img");
        engine.mkdir(".", "a").unwrap();
        engine.cd("a").unwrap();
        // Removing the directory we stand in drops us back to its parent.
        engine.rmdir("..", "a").unwrap();
        assert_eq!(engine.pwd(), "/");
    }

    #[test]
    fn cd_and_pwd_walk_parents() {
        let mut engine = formatted("cd.img");
        engine.mkdir(".", "a").unwrap();
        engine.mkdir("a", "b").unwrap();
        assert_eq!(engine.cd("a/b").unwrap(), "/a/b");
        assert_eq!(engine.cd("..").unwrap(), "/a");
        assert_eq!(engine.cd("/").unwrap(), "/");
        assert!(matches!(engine.cd("nope"), Err(FsError::PathNotFound)));
    }

    #[test]
    fn incp_cat_outcp_round_trip() {
        let mut engine = formatted("roundtrip.img");
        let host = host_file("hello.txt", b"hello\n");
        engine.incp(&host, "/h").unwrap();
        assert_eq!(engine.cat("/h").unwrap(), b"hello\n");

        let out = temp_path("out.txt");
        engine.outcp("/h", &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"hello\n");
    }

    #[test]
    fn incp_missing_host_file() {
        let mut engine = formatted("incpmiss.img");
        let missing = temp_path("missing-host.bin");
        assert!(matches!(
            engine.incp(&missing, "/x"),
            Err(FsError::FileNotFound)
        ));
    }

    #[test]
    fn zero_byte_file_occupies_one_block() {
        let mut engine = formatted("zerobyte.img");
        let host = host_file("empty.bin", b"");
        engine.incp(&host, "/e").unwrap();
        assert_eq!(engine.cat("/e").unwrap(), b"");

        let fs = engine.fs.as_ref().unwrap();
        let id = fs.tree.find_file(ROOT_ID, "e").unwrap().inode;
        let node = fs.inodes.get(id);
        assert_eq!(node.file_size, 0);
        assert_ne!(node.direct[0], ID_FREE);
        assert!(fs.bitmap.is_set(node.direct[0]));

        let out = temp_path("empty-out.bin");
        engine.outcp("/e", &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"");
    }

    #[test]
    fn hard_link_reference_counts() {
        let mut engine = formatted("links.img");
        let host = host_file("big.bin", &vec![7; 10_000]);
        engine.incp(&host, "/f").unwrap();
        engine.ln("/f", "/g").unwrap();

        let fs = engine.fs.as_ref().unwrap();
        let id = fs.tree.find_file(ROOT_ID, "f").unwrap().inode;
        assert_eq!(fs.tree.find_file(ROOT_ID, "g").unwrap().inode, id);
        assert_eq!(fs.inodes.get(id).references, 2);

        engine.rm("/f").unwrap();
        {
            let fs = engine.fs.as_mut().unwrap();
            assert_eq!(fs.inodes.get(id).references, 1);
            let blocks = blockmap::enumerate(&mut fs.img, &fs.sb, &fs.inodes, id).unwrap();
            assert!(blocks.iter().all(|&b| fs.bitmap.is_set(b)));
        }
        assert_eq!(engine.cat("/g").unwrap(), vec![7; 10_000]);

        engine.rm("/g").unwrap();
        let fs = engine.fs.as_ref().unwrap();
        assert!(fs.inodes.get(id).is_free());
        // Block 1 was the file's first data cluster; everything is back.
        assert!(!fs.bitmap.is_set(1));
        assert!(!fs.bitmap.is_set(2));
        assert!(!fs.bitmap.is_set(3));
    }

    #[test]
    fn ln_collides_with_directories_too() {
        let mut engine = formatted("lncollide.img");
        let host = host_file("ln-src.bin", b"x");
        engine.incp(&host, "/f").unwrap();
        engine.mkdir(".", "d").unwrap();
        assert!(matches!(engine.ln("/f", "/d"), Err(FsError::Exists)));
    }

    #[test]
    fn cp_makes_an_independent_copy() {
        let mut engine = formatted("cp.img");
        let content: Vec<u8> = (0..5000).map(|i| (i % 251) as u8).collect();
        let host = host_file("cp-src.bin", &content);
        engine.incp(&host, "/a").unwrap();
        engine.cp("/a", "/b").unwrap();

        let fs = engine.fs.as_mut().unwrap();
        let a = fs.tree.find_file(ROOT_ID, "a").unwrap().inode;
        let b = fs.tree.find_file(ROOT_ID, "b").unwrap().inode;
        assert_ne!(a, b);
        let a_blocks = blockmap::enumerate(&mut fs.img, &fs.sb, &fs.inodes, a).unwrap();
        let b_blocks = blockmap::enumerate(&mut fs.img, &fs.sb, &fs.inodes, b).unwrap();
        assert!(a_blocks.iter().all(|x| !b_blocks.contains(x)));

        assert_eq!(engine.cat("/b").unwrap(), content);
        assert!(matches!(engine.cp("/a", "/b"), Err(FsError::Exists)));
    }

    #[test]
    fn mv_keeps_the_inode() {
        let mut engine = formatted("mv.img");
        let host = host_file("mv-src.bin", b"payload");
        engine.incp(&host, "/a").unwrap();
        engine.mkdir(".", "dir").unwrap();
        let id = {
            let fs = engine.fs.as_ref().unwrap();
            fs.tree.find_file(ROOT_ID, "a").unwrap().inode
        };

        engine.mv("/a", "/dir/a2").unwrap();
        let fs = engine.fs.as_ref().unwrap();
        assert!(fs.tree.find_file(ROOT_ID, "a").is_none());
        let dir_id = fs.tree.find_subdir(ROOT_ID, "dir").unwrap().inode;
        assert_eq!(fs.tree.find_file(dir_id, "a2").unwrap().inode, id);
        assert_eq!(engine.cat("/dir/a2").unwrap(), b"payload");
        assert!(matches!(engine.rm("/a"), Err(FsError::FileNotFound)));
    }

    #[test]
    fn six_block_file_uses_first_indirect() {
        let mut engine = formatted("indirect.img");
        let size = 5 * CLUSTER_SIZE as usize + 100;
        let content: Vec<u8> = (0..size).map(|i| (i % 13) as u8).collect();
        let host = host_file("six.bin", &content);
        engine.incp(&host, "/big").unwrap();

        let fs = engine.fs.as_mut().unwrap();
        let id = fs.tree.find_file(ROOT_ID, "big").unwrap().inode;
        let node = *fs.inodes.get(id);
        // Ascending allocation on an empty filesystem: data blocks 1..=6,
        // then the indirect cluster itself.
        assert_eq!(node.direct, [1, 2, 3, 4, 5]);
        assert_eq!(node.indirect, [7, ID_FREE]);
        let entries = blockmap::read_index_cluster(&mut fs.img, &fs.sb, 7).unwrap();
        assert_eq!(entries[0], 6);
        assert_eq!(entries[1], 0);
        assert!(fs.bitmap.is_set(7));

        assert_eq!(engine.cat("/big").unwrap(), content);
    }

    #[test]
    fn aggregated_sizes_walk_to_root() {
        let mut engine = formatted("sizes.img");
        engine.mkdir(".", "d").unwrap();
        let host = host_file("ten.bin", &[1; 10]);
        engine.incp(&host, "/d/f").unwrap();

        let fs = engine.fs.as_ref().unwrap();
        let d = fs.tree.find_subdir(ROOT_ID, "d").unwrap().inode;
        assert_eq!(fs.inodes.get(d).file_size, 10);
        assert_eq!(fs.inodes.get(ROOT_ID).file_size, 10);

        engine.rm("/d/f").unwrap();
        let fs = engine.fs.as_ref().unwrap();
        assert_eq!(fs.inodes.get(d).file_size, 0);
        assert_eq!(fs.inodes.get(ROOT_ID).file_size, 0);
    }

    #[test]
    fn directory_grows_and_shrinks_past_one_cluster() {
        let mut engine = formatted("dirgrow.img");
        for i in 0..SLOTS_PER_CLUSTER + 1 {
            engine.mkdir(".", &format!("d{i}")).unwrap();
        }
        {
            let fs = engine.fs.as_ref().unwrap();
            assert_ne!(fs.inodes.get(ROOT_ID).direct[1], ID_FREE);
        }
        // Removing the one entry that lives in the second cluster gives the
        // cluster back.
        engine.rmdir(".", &format!("d{SLOTS_PER_CLUSTER}")).unwrap();
        let fs = engine.fs.as_ref().unwrap();
        assert_eq!(fs.inodes.get(ROOT_ID).direct[1], ID_FREE);
        assert_eq!(fs.tree.get(ROOT_ID).subdirs.len(), SLOTS_PER_CLUSTER);
    }

    #[test]
    fn every_bitmap_bit_belongs_to_exactly_one_inode() {
        let mut engine = formatted("consistency.img");
        engine.mkdir(".", "d").unwrap();
        let host = host_file("cons.bin", &[5; 9000]);
        engine.incp(&host, "/d/f").unwrap();
        engine.cp("/d/f", "/c").unwrap();
        engine.ln("/c", "/d/link").unwrap();
        engine.mv("/c", "/c2").unwrap();
        engine.rm("/d/f").unwrap();

        let fs = engine.fs.as_mut().unwrap();
        let mut seen = vec![false; fs.sb.data_cluster_count as usize];
        for id in 0..fs.inodes.count() {
            if fs.inodes.get(id).is_free() {
                continue;
            }
            let node = *fs.inodes.get(id);
            let mut blocks = blockmap::enumerate(&mut fs.img, &fs.sb, &fs.inodes, id).unwrap();
            blocks.extend(node.indirect.iter().copied().filter(|&b| b != ID_FREE));
            for b in blocks {
                assert!(!seen[b as usize], "block {b} mapped twice");
                seen[b as usize] = true;
            }
        }
        for (b, mapped) in seen.iter().enumerate() {
            assert_eq!(fs.bitmap.is_set(b as i32), *mapped, "bitmap mismatch at {b}");
        }
    }

    #[test]
    fn remount_rebuilds_the_tree() {
        let path = temp_path("remount.img");
        let content = b"persisted across mounts";
        {
            let mut engine = FsEngine::open(path.clone());
            engine.format(1_000_000).unwrap();
            engine.mkdir(".", "a").unwrap();
            engine.mkdir("a", "b").unwrap();
            let host = host_file("remount-src.bin", content);
            engine.incp(&host, "/a/f").unwrap();
            engine.ln("/a/f", "/g").unwrap();
        }

        let mut engine = FsEngine::open(path);
        assert!(engine.is_formatted());
        assert_eq!(
            engine.ls(Some("/a")).unwrap(),
            vec![
                (ItemKind::Directory, "b".into()),
                (ItemKind::File, "f".into()),
            ]
        );
        assert_eq!(engine.cat("/a/f").unwrap(), content);
        assert_eq!(engine.cat("/g").unwrap(), content);
        let fs = engine.fs.as_ref().unwrap();
        let id = fs.tree.find_file(ROOT_ID, "g").unwrap().inode;
        assert_eq!(fs.inodes.get(id).references, 2);
    }

    #[test]
    fn info_reports_mapping() {
        let mut engine = formatted("info.img");
        let host = host_file("info-src.bin", &[9; 5000]);
        engine.incp(&host, "/f").unwrap();
        let report = engine.info(Some("/f")).unwrap();
        assert!(report.contains("Name: f"));
        assert!(report.contains("Size: 5000B"));
        assert!(report.contains("i-node: 1"));
        assert!(report.contains("[0]: 1"));
        assert!(report.contains("[1]: 2"));
        assert!(report.contains("Indirect 1 blocks: FREE"));
        assert!(matches!(
            engine.info(Some("/nope")),
            Err(FsError::ItemNotFound)
        ));
    }
}
