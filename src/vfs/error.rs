//! Error kinds distinguished by the filesystem engine.

use std::error;
use std::fmt;
use std::io;

/// The result type of every fallible engine operation.
pub type Result<T> = std::result::Result<T, FsError>;

/// One error kind per failure class a command can report.
#[derive(Debug)]
pub enum FsError {
    /// A directory component of a path does not exist.
    PathNotFound,
    /// The leaf file name does not exist.
    FileNotFound,
    /// The leaf name does not exist as either a file or a directory.
    ItemNotFound,
    /// The parent directory of a file operation does not exist.
    DirectoryNotFound,
    /// Name collision in the target directory.
    Exists,
    /// Removal of a directory that still has children.
    NotEmpty,
    /// Name of 12 or more bytes.
    NameTooLong,
    /// The inode table is exhausted.
    NoFreeInodes,
    /// The data region is exhausted.
    NoSpace,
    /// The file needs more blocks than two indirect levels can address.
    FileTooLarge,
    /// The requested filesystem size leaves no usable geometry.
    InvalidSize,
    /// The filesystem has not been formatted yet.
    NotAvailable,
    /// Malformed command argument.
    InvalidArgument,
    /// Host-side I/O failure, fatal to the current command.
    Io(io::Error),
}

impl fmt::Display for FsError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathNotFound => write!(fmt, "PATH NOT FOUND"),
            Self::FileNotFound => write!(fmt, "FILE NOT FOUND"),
            Self::ItemNotFound => write!(fmt, "ITEM NOT FOUND"),
            Self::DirectoryNotFound => write!(fmt, "DIRECTORY NOT FOUND"),
            Self::Exists => write!(fmt, "EXIST"),
            Self::NotEmpty => write!(fmt, "NOT EMPTY"),
            Self::NameTooLong => write!(fmt, "NAME TOO LONG"),
            Self::NoFreeInodes => write!(fmt, "NO FREE INODES"),
            Self::NoSpace => write!(fmt, "NOT ENOUGH SPACE"),
            Self::FileTooLarge => write!(fmt, "FILE TOO LARGE"),
            Self::InvalidSize => write!(fmt, "INVALID SIZE"),
            Self::NotAvailable => write!(fmt, "NOT AVAILABLE IN LIMITED MODE"),
            Self::InvalidArgument => write!(fmt, "INVALID ARGUMENT"),
            Self::Io(e) => write!(fmt, "I/O ERROR: {e}"),
        }
    }
}

impl error::Error for FsError {}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
