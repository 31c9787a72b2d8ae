//! Inode-to-path bookkeeping.
//!
//! The kernel speaks inode numbers; the engine speaks absolute paths. This
//! map assigns a stable inode to each path the kernel has seen and keeps the
//! two views consistent across renames. Entries are never dropped while
//! mounted; a stale path simply stops resolving in the catalog.

use std::collections::HashMap;

use crate::fs::constants::{FACT_FILE_NAME, FACT_INO, FIRST_DYNAMIC_INO, ROOT_INO};

pub struct InodeMap {
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next: u64,
}

impl Default for InodeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeMap {
    #[must_use]
    pub fn new() -> Self {
        let mut map = Self {
            by_ino: HashMap::new(),
            by_path: HashMap::new(),
            next: FIRST_DYNAMIC_INO,
        };
        map.insert(ROOT_INO, "/");
        map.insert(FACT_INO, &format!("/{FACT_FILE_NAME}"));
        map
    }

    fn insert(&mut self, ino: u64, path: &str) {
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
    }

    /// The inode for `path`, assigning a fresh one on first sight.
    pub fn get_or_assign(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.insert(ino, path);
        ino
    }

    #[must_use]
    pub fn path(&self, ino: u64) -> Option<&str> {
        self.by_ino.get(&ino).map(String::as_str)
    }

    /// Rewrites `src` and every path below it to live under `dst`, keeping
    /// their inode numbers, so open kernel references follow the move.
    pub fn rename_prefix(&mut self, src: &str, dst: &str) {
        let prefix = format!("{src}/");
        let moved: Vec<(u64, String)> = self
            .by_path
            .iter()
            .filter_map(|(path, &ino)| {
                if path == src {
                    Some((ino, dst.to_string()))
                } else {
                    path.strip_prefix(&prefix)
                        .map(|suffix| (ino, format!("{dst}/{suffix}")))
                }
            })
            .collect();

        for (ino, new_path) in moved {
            if let Some(old_path) = self.by_ino.get(&ino) {
                self.by_path.remove(old_path);
            }
            // A node previously known at the destination path is displaced.
            if let Some(old_ino) = self.by_path.remove(&new_path) {
                self.by_ino.remove(&old_ino);
            }
            self.insert(ino, &new_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_inodes_are_preassigned() {
        let map = InodeMap::new();
        assert_eq!(map.path(ROOT_INO), Some("/"));
        assert_eq!(map.path(FACT_INO), Some("/fact.json"));
        assert_eq!(map.path(999), None);
    }

    #[test]
    fn assignment_is_stable_per_path() {
        let mut map = InodeMap::new();
        let a = map.get_or_assign("/a");
        let b = map.get_or_assign("/b");
        assert_ne!(a, b);
        assert_eq!(map.get_or_assign("/a"), a);
        assert_eq!(map.path(a), Some("/a"));
    }

    #[test]
    fn rename_prefix_moves_subtree() {
        let mut map = InodeMap::new();
        let dir = map.get_or_assign("/old");
        let file = map.get_or_assign("/old/deep/f");
        let unrelated = map.get_or_assign("/older");

        map.rename_prefix("/old", "/new");

        assert_eq!(map.path(dir), Some("/new"));
        assert_eq!(map.path(file), Some("/new/deep/f"));
        assert_eq!(map.path(unrelated), Some("/older"));
        assert_eq!(map.get_or_assign("/new/deep/f"), file);
    }

    #[test]
    fn rename_onto_known_path_displaces_it() {
        let mut map = InodeMap::new();
        let src = map.get_or_assign("/a");
        let dst = map.get_or_assign("/b");

        map.rename_prefix("/a", "/b");

        assert_eq!(map.path(src), Some("/b"));
        assert_eq!(map.path(dst), None);
        assert_eq!(map.get_or_assign("/b"), src);
    }
}
