use std::process::ExitCode;
use std::time::Instant;

use sssg::error::Result;

use crate::discover::Project;

mod config;
mod discover;
mod render;
mod util;

pub const TEMPLATE_DIR: &str = "templates";
pub const PAGE_DIR: &str = "pages";
pub const PUBLIC_DIR: &str = "public";
pub const GLOBALS_FILE: &str = "globals.toml";

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Build a static site from `templates/`, `pages/`, `public/`, and
        /// an optional `globals.toml`.
        cmd sssg {
            /// Root directory of the site's sources.
            required input: PathBuf
            /// Directory to write the site to. Must be absent or empty.
            required output: PathBuf
            /// How deeply `template` and `expand` may nest.
            optional --max-depth max_depth: usize
            /// Write each page's template dependencies as JSON to this file.
            optional --deps deps: PathBuf
            /// Log at debug level unless `RUST_LOG` says otherwise.
            optional -v, --verbose
        }
    }
}

fn run(flags: flags::Sssg) -> Result<()> {
    let start = Instant::now();
    let project = Project::new(&flags.input, &flags.output)?;
    let registry = project.registry()?;
    tracing::info!("discovery time: {}ms", start.elapsed().as_millis());

    let render = Instant::now();
    let max_depth = flags.max_depth.unwrap_or(project.settings.build.max_depth);
    project.render(&registry, max_depth, flags.deps.as_deref())?;
    tracing::info!("render time: {}ms", render.elapsed().as_millis());
    tracing::info!("total time: {}ms", start.elapsed().as_millis());
    Ok(())
}

pub fn main() -> ExitCode {
    let flags = flags::Sssg::from_env_or_exit();
    let default_level = if flags.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(flags) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
