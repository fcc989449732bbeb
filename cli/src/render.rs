use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use sssg::rayon::prelude::*;
use sssg::error::{Chainable, Error, MakeshiftError, Result};
use sssg::resolve::{Dependency, Rendered, Resolver};
use sssg::{err, error, Registry};

use crate::discover::Project;

impl Project {
    /// Resolves every page and writes the site. Nothing is written unless
    /// every page resolves.
    pub fn render(&self, registry: &Registry, max_depth: usize, deps: Option<&Path>) -> Result<()> {
        let resolver = Resolver::new(registry, &self.settings.globals).with_max_depth(max_depth);

        let mut pages = vec![];
        let mut failures = vec![];
        for result in resolver.resolve_all() {
            match result {
                Ok(rendered) => pages.push(rendered),
                Err(e) => failures.push((Some(e.page.clone()), Error::from(e).to_string())),
            }
        }

        if !failures.is_empty() {
            return Err(Error::from(MakeshiftError {
                message: format!("{} of {} pages failed to resolve", failures.len(), registry.pages().count()),
                parameters: failures,
            }));
        }

        let outputs = self.output_paths(&pages)?;
        let public = self.public_files(&outputs)?;
        pages.par_iter()
            .zip(outputs.par_iter())
            .map(|(page, output)| write(output, &page.output).chain_with(|| error! {
                "failed to write page",
                "page" => &page.page,
                "output path" => output.display(),
            }))
            .collect::<Result<()>>()?;

        tracing::info!(pages = pages.len(), output = %self.output.display(), "wrote pages");
        copy_public(&public)?;
        if let Some(path) = deps {
            write_deps(path, &pages)?;
        }

        Ok(())
    }

    /// Output paths for `pages`, in order. Two pages may not share one.
    fn output_paths(&self, pages: &[Rendered]) -> Result<Vec<PathBuf>> {
        let mut seen: FxHashMap<PathBuf, &str> = FxHashMap::default();
        let mut outputs = Vec::with_capacity(pages.len());
        for page in pages {
            let relative = page.output_path();
            if let Some(other) = seen.insert(relative.clone(), &page.page) {
                return err! {
                    "two pages render to the same output path",
                    "output path" => relative.display(),
                    "first page" => other,
                    "second page" => &page.page,
                };
            }

            outputs.push(self.output.join(relative));
        }

        Ok(outputs)
    }

    /// Every visible file under `public/` paired with its destination in the
    /// output root. No destination may be one of the page `outputs`.
    fn public_files(&self, outputs: &[PathBuf]) -> Result<Vec<(&Path, PathBuf)>> {
        let Some(root) = self.public_root else {
            return Ok(vec![]);
        };

        let public = &self.tree[root];
        let pages: FxHashSet<&Path> = outputs.iter().map(|p| p.as_path()).collect();
        let mut files = vec![];
        for entry in self.tree.visible_files(root) {
            let relative = entry.path_relative_to(public).unwrap_or(&entry.path);
            let output = self.output.join(relative);
            if pages.contains(output.as_path()) {
                return err! {
                    "public file conflicts with a rendered page",
                    "source path" => entry.path.display(),
                    "destination path" => output.display(),
                };
            }

            files.push((&*entry.path, output));
        }

        Ok(files)
    }
}

/// Copies each `(source, destination)` pair verbatim.
fn copy_public(files: &[(&Path, PathBuf)]) -> Result<()> {
    files.par_iter()
        .map(|(source, output)| {
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::copy(source, output).map(|_| ()).chain_with(|| error! {
                "failed to copy public file",
                "source path" => source.display(),
                "destination path" => output.display(),
            })
        })
        .collect::<Result<()>>()?;

    tracing::info!(files = files.len(), "copied public files");
    Ok(())
}

fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    Ok(fs::write(path, bytes)?)
}

/// Writes `{ page: [{ name, kind }, ..] }` as pretty JSON.
fn write_deps(path: &Path, pages: &[Rendered]) -> Result<()> {
    let graph: BTreeMap<&str, Vec<&Dependency>> = pages.iter()
        .map(|page| (&*page.page, page.deps.iter().collect()))
        .collect();

    let json = serde_json::to_vec_pretty(&graph)?;
    write(path, &json).chain_with(|| error! {
        "failed to write dependency graph",
        "path" => path.display(),
    })?;

    tracing::debug!(path = %path.display(), "wrote dependency graph");
    Ok(())
}
