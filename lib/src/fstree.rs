use std::sync::Arc;
use std::path::Path;
use std::{fs, fmt};

use rustc_hash::FxHashMap;

use crate::error::Result;

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) usize);

/// An in-memory snapshot of a directory tree, walked in parallel.
///
/// Entries are stored in walk order, which is sorted by file name within each
/// directory, so every traversal of the tree is deterministic.
#[derive(Debug)]
pub struct FsTree {
    entries: Vec<Entry>,
    map: FxHashMap<Arc<Path>, EntryId>,
}

#[derive(Debug)]
pub struct Entry {
    pub id: EntryId,
    pub path: Arc<Path>,
    pub file_name: String,
    pub file_type: fs::FileType,
    pub parent: Option<EntryId>,
    pub children: Vec<EntryId>,
    pub depth: usize,
}

impl FsTree {
    pub fn build<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let walker = jwalk::WalkDir::new(root)
            .follow_links(true)
            .sort(true);

        let mut tree = FsTree { entries: vec![], map: FxHashMap::default() };
        for entry in walker {
            let entry = entry.map_err(|e| error! {
                "failed to walk directory tree",
                "search root" => root.display(),
                e,
            })?;

            tree.insert(entry);
        }

        if tree.entries.is_empty() {
            return err! {
                "directory tree discovery yielded zero entries",
                "search root" => root.display(),
            }
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn root(&self) -> &Entry {
        &self[self.root_id()]
    }

    pub fn root_id(&self) -> EntryId {
        EntryId(0)
    }

    /// Looks up `path` relative to `root`, or to the tree's root if `None`.
    pub fn get<R, P>(&self, root: R, path: P) -> Option<&Entry>
        where R: Into<Option<EntryId>>, P: AsRef<Path>
    {
        let root = root.into().unwrap_or(self.root_id());
        let full_path = self[root].path.join(path.as_ref());
        self.map.get(&*full_path).map(|&id| &self[id])
    }

    /// Visits `root` and its descendants depth-first in walk order. A
    /// directory's children are visited only if `visit` returns `true` for it.
    pub fn depth_first_search<'a, F>(&'a self, root: EntryId, mut visit: F)
        where F: FnMut(&'a Entry) -> bool
    {
        fn _dfs<'a, F>(tree: &'a FsTree, root: EntryId, visit: &mut F)
            where F: FnMut(&'a Entry) -> bool
        {
            let entry = &tree[root];
            if visit(entry) {
                for &child in &entry.children {
                    _dfs(tree, child, visit)
                }
            }
        }

        _dfs(self, root, &mut visit)
    }

    /// All files under `root`, skipping hidden (dot-prefixed) files and
    /// directories.
    pub fn visible_files(&self, root: EntryId) -> Vec<&Entry> {
        let mut files = vec![];
        self.depth_first_search(root, |entry| {
            if entry.id != root && entry.file_name.starts_with('.') {
                return false;
            }

            if entry.file_type.is_file() {
                files.push(entry);
            }

            true
        });

        files
    }

    fn insert(&mut self, entry: jwalk::DirEntry<((), ())>) {
        let entry = Entry {
            id: EntryId(self.entries.len()),
            path: Arc::from(entry.path().into_boxed_path()),
            file_type: entry.file_type,
            file_name: entry.file_name.to_string_lossy().into_owned(),
            parent: self.map.get(&entry.parent_path).cloned(),
            children: vec![],
            depth: entry.depth,
        };

        self.map.insert(entry.path.clone(), entry.id);
        if let Some(parent) = entry.parent {
            self.entries[parent.0].children.push(entry.id);
        }

        self.entries.push(entry);
    }
}

impl Entry {
    /// The extension after the last `.` in the file name, if any.
    pub fn file_ext(&self) -> Option<&str> {
        self.file_name.rsplit_once('.')
            .map(|(_, right)| right)
            .filter(|ext| !ext.is_empty())
    }

    /// Path relative to the ancestor `other`, or `None` if `other` is not an
    /// ancestor of `self`.
    pub fn path_relative_to(&self, other: &Entry) -> Option<&Path> {
        self.path.strip_prefix(&other.path).ok()
    }
}

impl std::ops::Index<EntryId> for FsTree {
    type Output = Entry;

    fn index(&self, index: EntryId) -> &Self::Output {
        &self.entries[index.0]
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_sorted_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pages/blog")).unwrap();
        fs::create_dir_all(dir.path().join("pages/.drafts")).unwrap();
        fs::write(dir.path().join("pages/b.html"), "b").unwrap();
        fs::write(dir.path().join("pages/a.md"), "a").unwrap();
        fs::write(dir.path().join("pages/blog/post.html"), "post").unwrap();
        fs::write(dir.path().join("pages/.DS_Store"), "").unwrap();
        fs::write(dir.path().join("pages/.drafts/x.html"), "x").unwrap();

        let tree = FsTree::build(dir.path()).unwrap();
        let pages = tree.get(None, "pages").unwrap();
        assert!(pages.file_type.is_dir());

        let files: Vec<_> = tree.visible_files(pages.id).into_iter()
            .map(|e| e.path_relative_to(pages).unwrap().to_path_buf())
            .collect();

        assert_eq!(files, [Path::new("a.md"), Path::new("b.html"), Path::new("blog/post.html")]);
        assert_eq!(tree.get(pages.id, "a.md").and_then(|e| e.file_ext()), Some("md"));
        assert!(tree.get(None, "templates").is_none());
    }

    #[test]
    fn search_yields_entries_borrowed_from_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/skip")).unwrap();
        fs::write(dir.path().join("a/one.html"), "1").unwrap();
        fs::write(dir.path().join("a/skip/two.html"), "2").unwrap();

        let tree = FsTree::build(dir.path()).unwrap();
        let mut seen: Vec<&Entry> = vec![];
        tree.depth_first_search(tree.root_id(), |entry| {
            seen.push(entry);
            entry.file_name != "skip"
        });

        let names: Vec<_> = seen.iter().skip(1).map(|e| e.file_name.as_str()).collect();
        assert_eq!(names, ["a", "one.html", "skip"]);
        assert_eq!(seen.len(), tree.len() - 1);
    }
}
