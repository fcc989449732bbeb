use std::fs;
use std::path::Path;

use sssg::err;
use sssg::error::Result;
use sssg::fstree::{EntryId, FsTree};

#[track_caller]
pub fn dircheck<P: AsRef<Path>>(
    tree: &FsTree,
    root: Option<EntryId>,
    path: P,
    must_exist: bool,
) -> Result<Option<EntryId>> {
    let path = path.as_ref();
    match (tree.get(root, path), must_exist) {
        (Some(e), _) if e.file_type.is_dir() => Ok(Some(e.id)),
        (None, false) => Ok(None),
        (Some(e), _) => err! {
            format!("`{}` must be a directory", e.file_name),
            "path is not a directory" => e.path.display(),
        },
        (None, true) => err! {
            format!("`{}` must point to an existing directory", path.display()),
            "path does not exist" => tree.root().path.join(path).display(),
        },
    }
}

/// Creates `path` if it does not exist. Fails if it exists and is anything
/// but an empty directory.
pub fn ensure_empty_dir(path: &Path) -> Result<()> {
    match fs::read_dir(path) {
        Ok(mut entries) => match entries.next() {
            None => Ok(()),
            Some(_) => err! {
                "output directory must be empty",
                "path" => path.display(),
            },
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(fs::create_dir_all(path)?),
        Err(e) if path.exists() => err! {
            "output path must be a directory",
            "path" => path.display(),
            e,
        },
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_must_be_absent_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("out/site");
        ensure_empty_dir(&fresh).unwrap();
        assert!(fresh.is_dir());
        ensure_empty_dir(&fresh).unwrap();

        fs::write(fresh.join("stale.html"), "").unwrap();
        assert!(ensure_empty_dir(&fresh).is_err());
        assert!(ensure_empty_dir(&fresh.join("stale.html")).is_err());
    }

    #[test]
    fn dircheck_distinguishes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pages")).unwrap();
        fs::write(dir.path().join("public"), "").unwrap();

        let tree = FsTree::build(dir.path()).unwrap();
        assert!(dircheck(&tree, None, "pages", true).unwrap().is_some());
        assert!(dircheck(&tree, None, "templates", false).unwrap().is_none());
        assert!(dircheck(&tree, None, "templates", true).is_err());
        assert!(dircheck(&tree, None, "public", false).is_err());
    }
}
