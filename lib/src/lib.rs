#![doc = svgbobdoc::transform!(
//! A directive-based templating engine for static site builds.
//!
//! # Overview
//!
//! `sssg` turns a directory of templates and pages into rendered HTML. Source
//! files are plain markup interleaved with `{% ... %}` directives:
//!
//! ```text
//! {% template base title='Home' %}
//! <ul>{% for post in posts %}<li>{% use post %}</li>{% endfor %}</ul>
//! ```
//!
//! Data flows through the crate in one direction:
//!
//! ```svgbob
//!  +-------+    +---------+    +-----------+    +----------+    +----------+
//!  | bytes |--->| scanner |--->| directive |--->| BlockSeq |--->| Registry |
//!  +-------+    +---------+    |  parser   |    +----------+    +----+-----+
//!                              +-----------+                         |
//!                                                                    v
//!                                    +----------------+       +----------+
//!                                    | rendered bytes |<------| Resolver |
//!                                    +----------------+       +----------+
//! ```
//!
//! 1. Every file under `templates/` and `pages/` is converted to HTML by a
//!    [`Convert`](convert::Convert) implementation, then scanned and parsed
//!    into an immutable [`BlockSeq`](template::BlockSeq). Files are parsed in
//!    parallel; every failure is collected and reported together.
//! 2. The parsed files are frozen into a [`Registry`](registry::Registry).
//! 3. A [`Resolver`](resolve::Resolver) composes each page by interpreting
//!    `template` inheritance, `expand` inlining, `for` iteration, and
//!    variable scope, yielding the page's bytes and its dependency edges.
//!
//! ## Directives
//!
//! | directive                      | effect                                        |
//! |--------------------------------|-----------------------------------------------|
//! | `template name [k=v]*`         | extend the template `name`                    |
//! | `expand name [k=v]*`           | inline the resolved output of `name`          |
//! | `content`                      | the extending file's body goes here           |
//! | `use name`                     | emit the value bound to `name`                |
//! | `for x in xs` ... `endfor`     | repeat the enclosed region for each of `xs`   |
//! | `var k=v`                      | bind `k` for the rest of the region           |
//! | `outonly`                      | the rest of the file is never `content`       |
)]

#[macro_use]
pub mod error;
pub mod util;
pub mod fstree;
pub mod value;
pub mod convert;
pub mod template;
pub mod registry;
pub mod resolve;

pub use registry::{Registry, Role, FileNode, Source};
pub use resolve::{Resolver, Rendered};
pub use value::{Globals, Value};

pub use rayon;
