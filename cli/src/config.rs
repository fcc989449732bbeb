use std::fs;

use serde::Deserialize;

use sssg::error::{Chainable, Result};
use sssg::fstree::FsTree;
use sssg::resolve::Resolver;
use sssg::{error, Globals};

/// The contents of `globals.toml`.
#[derive(Default, Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(flatten)]
    pub globals: Globals,
}

/// The reserved `[build]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSettings {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    Resolver::DEFAULT_MAX_DEPTH
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings { max_depth: default_max_depth() }
    }
}

impl Settings {
    pub fn from_toml(string: &str) -> Result<Self> {
        Ok(toml::from_str(string)?)
    }

    pub fn discover(tree: &FsTree) -> Result<Self> {
        let Some(entry) = tree.get(None, crate::GLOBALS_FILE) else {
            return Ok(Settings::default());
        };

        let settings = fs::read_to_string(&*entry.path)
            .map_err(sssg::error::Error::from)
            .and_then(|string| Settings::from_toml(&string))
            .chain_with(|| error! {
                "failed to load site globals",
                "path" => entry.path.display(),
            })?;

        tracing::debug!(globals = settings.globals.len(), "loaded site globals");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sssg::Value;

    #[test]
    fn build_table_is_reserved() {
        let settings = Settings::from_toml(r#"
            title = "Blog"
            posts = ["a", "b"]

            [build]
            max_depth = 8
        "#).unwrap();

        assert_eq!(settings.build.max_depth, 8);
        assert_eq!(settings.globals.len(), 2);
        assert!(settings.globals.get("build").is_none());
        assert_eq!(settings.globals.get("posts"), Some(&Value::from(vec!["a", "b"])));
    }

    #[test]
    fn defaults_and_rejections() {
        let settings = Settings::from_toml("title = 'Blog'").unwrap();
        assert_eq!(settings.build.max_depth, Resolver::DEFAULT_MAX_DEPTH);

        assert!(Settings::from_toml("[build]\nunknown = 1").is_err());
        assert!(Settings::from_toml("[other]\nkey = 1").is_err());
    }
}
