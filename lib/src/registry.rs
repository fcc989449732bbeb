use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::{fmt, fs};

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::error::{Chainable, Error, ErrorClass, ErrorDetail, Result};
use crate::convert::Convert;
use crate::fstree::FsTree;
use crate::template::BlockSeq;
use crate::util::PathExt;

/// Which source root a file was discovered under.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// A file under `templates/`, referenced by `template` and `expand`.
    Template,
    /// A file under `pages/`, rendered to its own output file.
    Page,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Template, Role::Page];

    /// The name of the directory this role's files live under.
    pub fn root(self) -> &'static str {
        match self {
            Role::Template => "templates",
            Role::Page => "pages",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Template => f.write_str("template"),
            Role::Page => f.write_str("page"),
        }
    }
}

/// The already-converted bytes of one source file.
#[derive(Debug, Clone)]
pub struct Source {
    pub role: Role,
    /// Path relative to the role's root, `/`-separated.
    pub path: Arc<str>,
    pub bytes: Vec<u8>,
}

impl Source {
    pub fn new<P: Into<Arc<str>>, B: Into<Vec<u8>>>(role: Role, path: P, bytes: B) -> Self {
        Source { role, path: path.into(), bytes: bytes.into() }
    }
}

/// One parsed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    /// Path relative to the role's root, `/`-separated.
    pub path: Arc<str>,
    pub role: Role,
    pub blocks: BlockSeq,
}

impl FileNode {
    /// The path including its root directory, as in `pages/index.md`.
    pub fn source_path(&self) -> String {
        format!("{}/{}", self.role.root(), self.path)
    }
}

/// Every parsed template and page of a site, frozen before resolution.
#[derive(derive_more::Debug, Default)]
pub struct Registry {
    templates: BTreeMap<Arc<str>, FileNode>,
    pages: BTreeMap<Arc<str>, FileNode>,
    /// Extension-less template name to the template's full path.
    #[debug(ignore)]
    names: FxHashMap<Arc<str>, Arc<str>>,
}

/// A file that failed to read, convert, or parse.
#[derive(Debug)]
pub struct Failure {
    /// The path including its root directory.
    pub path: String,
    pub error: Error,
}

/// Every failure of a registry build, sorted by path.
#[derive(Debug, derive_more::Deref)]
pub struct Failures(Vec<Failure>);

/// Two template files that share a name once extensions are removed.
#[derive(Debug, thiserror::Error)]
#[error("template name `{name}` is ambiguous: also defined by `{other}`")]
pub struct AmbiguousName {
    pub name: String,
    pub other: String,
}

impl_error_detail_with_std_error!(AmbiguousName, Some(Reference));

type Outcome = (Role, Arc<str>, Result<BlockSeq>);

impl Registry {
    /// Parses every source in parallel and freezes the results.
    ///
    /// Every source is parsed even if another fails. If any fails, all of the
    /// failures are returned together, sorted by path.
    pub fn from_sources(sources: Vec<Source>) -> Result<Registry, Failures> {
        let outcomes = sources.into_par_iter()
            .map(|source| {
                let blocks = BlockSeq::parse(&source.bytes).map_err(Error::from);
                (source.role, source.path, blocks)
            })
            .collect();

        Registry::build(outcomes)
    }

    /// Discovers, reads, converts, and parses every visible file under
    /// `root/templates` and `root/pages`, one task per file.
    pub fn discover(root: &Path, converter: &dyn Convert) -> Result<Registry> {
        Registry::from_tree(&FsTree::build(root)?, converter)
    }

    /// Like [`Registry::discover()`] over an already walked `tree` whose root
    /// is the site root.
    pub fn from_tree(tree: &FsTree, converter: &dyn Convert) -> Result<Registry> {
        let root = &*tree.root().path;
        let mut files = vec![];
        for role in Role::ALL {
            let Some(dir) = tree.get(None, role.root()).filter(|e| e.file_type.is_dir()) else {
                return err! {
                    "site is missing a source directory",
                    "expected" => root.join(role.root()).display(),
                };
            };

            for entry in tree.visible_files(dir.id) {
                let path = entry.path_relative_to(dir).and_then(|p| p.to_slash_string());
                files.push((role, entry, path));
            }
        }

        tracing::debug!(files = files.len(), root = %root.display(), "discovered source files");
        let outcomes = files.into_par_iter()
            .map(|(role, entry, path)| {
                let Some(path) = path else {
                    let path = entry.path.display().to_string();
                    let error = error!("source path is not valid UTF-8", "path" => &path);
                    return (role, Arc::from(path), Err(error));
                };

                let blocks = fs::read(&entry.path)
                    .map_err(Error::from)
                    .and_then(|bytes| Ok(converter.convert(entry.file_ext(), bytes)?))
                    .and_then(|html| Ok(BlockSeq::parse(html)?))
                    .chain_with(|| error!("failed to load source file", "path" => entry.path.display()));

                (role, Arc::from(path), blocks)
            })
            .collect();

        Ok(Registry::build(outcomes)?)
    }

    fn build(outcomes: Vec<Outcome>) -> Result<Registry, Failures> {
        let mut registry = Registry::default();
        let mut failures = vec![];
        for (role, path, blocks) in outcomes {
            let blocks = match blocks {
                Ok(blocks) => blocks,
                Err(error) => {
                    failures.push(Failure { path: format!("{}/{path}", role.root()), error });
                    continue;
                }
            };

            tracing::debug!(%role, %path, blocks = blocks.len(), "parsed source file");
            let node = FileNode { path: path.clone(), role, blocks };
            let files = match role {
                Role::Template => &mut registry.templates,
                Role::Page => &mut registry.pages,
            };

            if files.insert(path.clone(), node).is_some() {
                let error = error!("source file registered twice", "path" => &path);
                failures.push(Failure { path: format!("{}/{path}", role.root()), error });
            }
        }

        for path in registry.templates.keys() {
            let name: Arc<str> = match Path::new(&**path).without_extension().to_str() {
                Some(name) if name != &**path => name.into(),
                _ => continue,
            };

            if let Some(other) = registry.names.insert(name.clone(), path.clone()) {
                let error = AmbiguousName { name: name.to_string(), other: other.to_string() };
                failures.push(Failure { path: format!("templates/{path}"), error: error.into() });
            }
        }

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.path.cmp(&b.path));
            return Err(Failures(failures));
        }

        tracing::info!(
            templates = registry.templates.len(),
            pages = registry.pages.len(),
            "built file registry"
        );

        Ok(registry)
    }

    /// Looks up a template by its exact relative path or by that path with
    /// its extension removed.
    pub fn template(&self, name: &str) -> Option<&FileNode> {
        self.templates.get(name).or_else(|| {
            self.names.get(name).and_then(|path| self.templates.get(path))
        })
    }

    pub fn page(&self, path: &str) -> Option<&FileNode> {
        self.pages.get(path)
    }

    /// Templates, sorted by path.
    pub fn templates(&self) -> impl Iterator<Item = &FileNode> {
        self.templates.values()
    }

    /// Pages, sorted by path.
    pub fn pages(&self) -> impl Iterator<Item = &FileNode> {
        self.pages.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len() + self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Failures {
    pub fn into_inner(self) -> Vec<Failure> {
        self.0
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            1 => write!(f, "1 source file failed to build"),
            n => write!(f, "{n} source files failed to build"),
        }
    }
}

impl ErrorDetail for Failures {
    fn context(&self) -> Vec<(Option<String>, String)> {
        self.0.iter()
            .map(|failure| (Some(failure.path.clone()), failure.error.to_string()))
            .collect()
    }

    fn class(&self) -> Option<ErrorClass> {
        self.0.first().and_then(|failure| failure.error.class())
    }
}

#[cfg(test)]
static_assertions::assert_impl_all!(Registry: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConvertError, Converter};
    use crate::template::ParseErrorKind;

    fn registry(sources: &[(Role, &str, &str)]) -> Result<Registry, Failures> {
        Registry::from_sources(sources.iter()
            .map(|&(role, path, text)| Source::new(role, path, text))
            .collect())
    }

    #[test]
    fn templates_are_found_with_or_without_extension() {
        let registry = registry(&[
            (Role::Template, "base.html", "<html>{% content %}</html>"),
            (Role::Template, "partials/nav.md", "<nav></nav>"),
            (Role::Page, "index.html", "{% template base %}hi"),
        ]).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.template("base").map(|n| &*n.path), Some("base.html"));
        assert_eq!(registry.template("base.html").map(|n| &*n.path), Some("base.html"));
        assert_eq!(registry.template("partials/nav").map(|n| n.role), Some(Role::Template));
        assert!(registry.template("index").is_none());
        assert!(registry.template("nav").is_none());
        assert_eq!(registry.page("index.html").map(|n| n.source_path()).as_deref(), Some("pages/index.html"));
    }

    #[test]
    fn every_failure_is_reported_sorted_by_path() {
        let failures = registry(&[
            (Role::Page, "z.html", "{% for x in xs %}"),
            (Role::Page, "ok.html", "fine"),
            (Role::Template, "a.html", "%}"),
            (Role::Page, "b.html", "{% bogus %}"),
        ]).unwrap_err();

        let paths: Vec<_> = failures.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["pages/b.html", "pages/z.html", "templates/a.html"]);

        let classes: Vec<_> = failures.iter().map(|f| f.error.class()).collect();
        assert_eq!(classes, [
            Some(ErrorClass::Syntax),
            Some(ErrorClass::Structural),
            Some(ErrorClass::Syntax),
        ]);

        let rendered = Error::from(failures).to_string();
        assert!(rendered.starts_with("3 source files failed to build"));
        assert!(rendered.contains("pages/b.html: unrecognized directive `bogus`"));
    }

    #[test]
    fn ambiguous_template_names_fail() {
        let failures = registry(&[
            (Role::Template, "nav.html", ""),
            (Role::Template, "nav.md", ""),
        ]).unwrap_err();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures.iter().next().unwrap().error.class(), Some(ErrorClass::Reference));
    }

    #[test]
    fn discover_reads_converts_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::create_dir_all(dir.path().join("pages/blog")).unwrap();
        fs::write(dir.path().join("templates/base.html"), "<main>{% content %}</main>").unwrap();
        fs::write(dir.path().join("pages/blog/post.md"), "{% template base %}\n# Hi\n").unwrap();

        let registry = Registry::discover(dir.path(), &Converter::default()).unwrap();
        let post = registry.page("blog/post.md").unwrap();
        assert!(post.blocks.template().is_some());
        assert_eq!(registry.templates().count(), 1);

        fs::write(dir.path().join("pages/notes.txt"), "").unwrap();
        fs::write(dir.path().join("pages/broken.html"), "{% use %}").unwrap();
        let error = Registry::discover(dir.path(), &Converter::default()).unwrap_err();
        let rendered = error.to_string();
        assert!(rendered.contains("2 source files failed to build"));
        assert!(rendered.contains("pages/broken.html"));
        assert!(rendered.contains("pages/notes.txt"));
    }

    #[test]
    fn discover_uses_the_given_converter() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::create_dir_all(dir.path().join("pages")).unwrap();
        fs::write(dir.path().join("pages/a.txt"), "{% use x %}").unwrap();

        let plain = |ext: Option<&str>, bytes: Vec<u8>| match ext {
            Some("txt") => Ok(bytes),
            other => Err(ConvertError::UnsupportedExtension(other.unwrap_or("").into())),
        };

        let registry = Registry::discover(dir.path(), &plain).unwrap();
        assert_eq!(registry.pages().count(), 1);

        let missing = tempfile::tempdir().unwrap();
        fs::create_dir_all(missing.path().join("pages")).unwrap();
        assert!(Registry::discover(missing.path(), &plain).is_err());
    }

    #[test]
    fn parse_errors_keep_their_kind() {
        let failures = registry(&[(Role::Page, "p.html", "{% endfor %}")]).unwrap_err();
        let failure = failures.into_inner().remove(0);
        assert_eq!(failure.path, "pages/p.html");
        assert!(failure.error.to_string().contains(&ParseErrorKind::UnmatchedEndFor.to_string()));
    }
}
