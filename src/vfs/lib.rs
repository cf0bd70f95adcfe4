//! An inode-based filesystem hosted inside a single backing file.
//!
//! The image is divided into a superblock, a free-space bitmap, an inode
//! table and a data region of 4096-byte clusters. Inodes address their data
//! through five direct pointers plus two single-level indirect clusters.
//! [`engine::FsEngine`] ties the pieces together and exposes one entry point
//! per shell command.

pub mod bitmap;
pub mod blockmap;
pub mod dir;
pub mod engine;
pub mod error;
pub mod image;
pub mod inode;
pub mod path;
pub mod prompt;
pub mod size;
pub mod superblock;

pub use engine::FsEngine;
pub use error::{FsError, Result};
