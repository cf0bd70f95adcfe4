//! Path walking over the cached directory tree.

use crate::dir::{DirTree, ROOT_ID};

/// Resolves `path` to a directory id, starting from `cwd`.
///
/// A leading `/` starts the walk at root. Empty components and `.` are
/// skipped; `..` moves to the parent (a no-op at root). Every other
/// component must name a subdirectory of the current node; files are never
/// path components. Returns `None` as soon as a component cannot be
/// resolved.
pub fn resolve(tree: &DirTree, cwd: i32, path: &str) -> Option<i32> {
    let mut dir = if path.starts_with('/') { ROOT_ID } else { cwd };
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => dir = tree.get(dir).parent,
            name => dir = tree.find_subdir(dir, name)?.inode,
        }
    }
    Some(dir)
}

/// Splits a path into its directory part and leaf name.
///
/// Without a slash the directory part is `.`; a slash in first position
/// keeps `/` as the directory. The leaf may be empty when the path ends in
/// a slash, which callers treat as "keep the source name".
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        None => (".", path),
        Some(0) => ("/", &path[1..]),
        Some(pos) => (&path[..pos], &path[pos + 1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::{DirEntry, DirNode};

    fn sample_tree() -> DirTree {
        // /a/b plus /c
        let mut tree = DirTree::with_root();
        tree.get_mut(ROOT_ID).subdirs.push(DirEntry {
            inode: 1,
            name: "a".into(),
        });
        tree.get_mut(ROOT_ID).subdirs.push(DirEntry {
            inode: 3,
            name: "c".into(),
        });
        let mut a = DirNode::new(1, ROOT_ID, "a");
        a.subdirs.push(DirEntry {
            inode: 2,
            name: "b".into(),
        });
        a.files.push(DirEntry {
            inode: 4,
            name: "f".into(),
        });
        tree.add(a);
        tree.add(DirNode::new(2, 1, "b"));
        tree.add(DirNode::new(3, ROOT_ID, "c"));
        tree
    }

    #[test]
    fn absolute_and_relative() {
        let tree = sample_tree();
        assert_eq!(resolve(&tree, ROOT_ID, "/a/b"), Some(2));
        assert_eq!(resolve(&tree, 1, "b"), Some(2));
        assert_eq!(resolve(&tree, 2, "/c"), Some(3));
        assert_eq!(resolve(&tree, ROOT_ID, "a/x"), None);
    }

    #[test]
    fn dot_and_dotdot() {
        let tree = sample_tree();
        assert_eq!(resolve(&tree, 2, ".."), Some(1));
        assert_eq!(resolve(&tree, 2, "../.."), Some(ROOT_ID));
        assert_eq!(resolve(&tree, ROOT_ID, ".."), Some(ROOT_ID));
        assert_eq!(resolve(&tree, 1, "./b/."), Some(2));
        assert_eq!(resolve(&tree, ROOT_ID, "a//b"), Some(2));
    }

    #[test]
    fn files_are_not_components() {
        let tree = sample_tree();
        assert_eq!(resolve(&tree, ROOT_ID, "a/f"), None);
    }

    #[test]
    fn split_paths() {
        assert_eq!(split("a"), (".", "a"));
        assert_eq!(split("/a"), ("/", "a"));
        assert_eq!(split("a/b/c"), ("a/b", "c"));
        assert_eq!(split("/dir/"), ("/dir", ""));
        assert_eq!(split(""), (".", ""));
    }
}
