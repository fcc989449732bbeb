use std::path::{Path, PathBuf};

use sssg::err;
use sssg::convert::Converter;
use sssg::error::Result;
use sssg::fstree::{EntryId, FsTree};
use sssg::Registry;

use crate::{GLOBALS_FILE, PAGE_DIR, PUBLIC_DIR, TEMPLATE_DIR};
use crate::config::Settings;
use crate::util::{dircheck, ensure_empty_dir};

/// A validated site: its source tree, settings, and output location.
#[derive(Debug)]
pub struct Project {
    pub tree: FsTree,
    pub settings: Settings,
    pub output: PathBuf,
    pub public_root: Option<EntryId>,
}

impl Project {
    pub fn new<I, O>(input: I, output: O) -> Result<Self>
        where I: AsRef<Path>, O: AsRef<Path>
    {
        let tree = FsTree::build(input)?;
        check_structure(&tree)?;
        dircheck(&tree, None, TEMPLATE_DIR, true)?;
        dircheck(&tree, None, PAGE_DIR, true)?;

        let output = output.as_ref().to_path_buf();
        ensure_empty_dir(&output)?;

        Ok(Project {
            public_root: dircheck(&tree, None, PUBLIC_DIR, false)?,
            settings: Settings::discover(&tree)?,
            output,
            tree,
        })
    }

    pub fn registry(&self) -> Result<Registry> {
        Registry::from_tree(&self.tree, &Converter::default())
    }
}

/// Only the known directories and the globals file may sit at the site root.
/// Hidden entries are ignored.
fn check_structure(tree: &FsTree) -> Result<()> {
    const KNOWN: &[&str] = &[TEMPLATE_DIR, PAGE_DIR, PUBLIC_DIR, GLOBALS_FILE];

    let root = tree.root();
    if !root.file_type.is_dir() {
        return err! {
            "site root must be a directory",
            "path" => root.path.display(),
        };
    }

    for &child in &root.children {
        let entry = &tree[child];
        if entry.file_name.starts_with('.') {
            continue;
        }

        if !KNOWN.contains(&entry.file_name.as_str()) {
            return err! {
                "unexpected entry in site root",
                "path" => entry.path.display(),
                "expected one of" => KNOWN.join(", "),
            };
        }
    }

    Ok(())
}
