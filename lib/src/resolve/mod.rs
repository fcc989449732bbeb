//! Composition of parsed files into rendered pages.
//!
//! A [`Resolver`] walks a page's [`BlockSeq`](crate::template::BlockSeq)
//! against a frozen [`Registry`], interpreting each directive:
//!
//!   * `template name k=v` composes the file into the template `name`: the
//!     template is resolved with `k=v` in scope, and each of its `content`
//!     markers is replaced by the file's own body.
//!   * `expand name k=v` inlines the fully resolved output of `name`, with
//!     `k=v` in scope for that expansion only.
//!   * `for x in xs` resolves the loop body once per element of the list
//!     `xs`, each time in a fresh frame binding `x`.
//!   * `var k=v` binds `k` in the current frame; `use k` emits its value.
//!   * blocks after `outonly` are never substituted as `content`. They are
//!     emitted after the file's template composition.
//!
//! Scoping is dynamic: expanded files and substituted bodies see every frame
//! active at the point of use, down to the globals.

mod scope;

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::ErrorClass;
use crate::registry::{FileNode, Registry};
use crate::template::Block;
use crate::util::PathExt;
use crate::value::{Globals, Value};

pub use scope::Scope;

/// Resolves pages of one registry against one set of globals.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'r> {
    registry: &'r Registry,
    globals: &'r Globals,
    max_depth: usize,
}

/// The output of one resolved page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// The page's path relative to `pages/`.
    pub page: Arc<str>,
    pub output: Vec<u8>,
    pub deps: BTreeSet<Dependency>,
}

/// A template a page's resolution referenced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Dependency {
    /// The referenced template's path relative to `templates/`.
    pub name: Arc<str>,
    pub kind: DependencyKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Template,
    Expand,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveErrorKind {
    #[error("no template named `{0}`")]
    UnknownTemplate(String),
    #[error("variable `{0}` is not bound")]
    Unbound(String),
    #[error("`{0}` is a single value and cannot be iterated")]
    NotIterable(String),
    #[error("`{0}` is a list and cannot be emitted")]
    NotScalar(String),
    #[error("`content` used outside of a template being extended")]
    MisplacedContent,
    #[error("cyclic dependency: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error("template nesting exceeds the depth limit of {0}")]
    DepthExceeded(usize),
}

impl ResolveErrorKind {
    pub fn class(&self) -> ErrorClass {
        use ResolveErrorKind::*;

        match self {
            UnknownTemplate(_) | Unbound(_) | NotIterable(_) | NotScalar(_) => ErrorClass::Reference,
            MisplacedContent => ErrorClass::Structural,
            Cycle(_) | DepthExceeded(_) => ErrorClass::Cyclic,
        }
    }
}

/// A [`ResolveErrorKind`] with the page being resolved and the directive that
/// failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    /// The page being resolved, relative to `pages/`.
    pub page: String,
    /// The file containing the failing directive, including its root.
    pub file: String,
    /// The failing directive in source form.
    pub directive: Option<String>,
}

impl ResolveError {
    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }
}

impl crate::error::ErrorDetail for ResolveError {
    fn context(&self) -> Vec<(Option<String>, String)> {
        let mut context = vec![
            (Some("page".into()), self.page.clone()),
            (Some("in".into()), self.file.clone()),
        ];

        if let Some(directive) = &self.directive {
            context.push((Some("directive".into()), directive.clone()));
        }

        context
    }

    fn class(&self) -> Option<ErrorClass> {
        Some(self.kind.class())
    }
}

impl Rendered {
    /// Where the page is written relative to the output root: its path with
    /// the extension replaced by `.html`.
    pub fn output_path(&self) -> PathBuf {
        std::path::Path::new(&*self.page)
            .without_extension()
            .with_extension("html")
    }
}

impl<'r> Resolver<'r> {
    pub const DEFAULT_MAX_DEPTH: usize = 64;

    pub fn new(registry: &'r Registry, globals: &'r Globals) -> Self {
        Resolver { registry, globals, max_depth: Self::DEFAULT_MAX_DEPTH }
    }

    /// Sets how many templates may be nested, through `template` and
    /// `expand` together, before resolution fails.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolves `page` into its rendered bytes and dependency edges.
    pub fn resolve(&self, page: &FileNode) -> Result<Rendered, ResolveError> {
        let mut composer = Composer {
            resolver: self,
            page: &page.path,
            scope: Scope::new(self.globals),
            stack: vec![],
            deps: BTreeSet::new(),
        };

        let mut output = Vec::with_capacity(page.blocks.len() * 64);
        composer.scope.push();
        composer.compose(page, None, &mut output)?;

        tracing::debug!(page = %page.path, bytes = output.len(), deps = composer.deps.len(), "resolved page");
        Ok(Rendered { page: page.path.clone(), output, deps: composer.deps })
    }

    /// Resolves every page of the registry in parallel. Results are sorted by
    /// page path.
    pub fn resolve_all(&self) -> Vec<Result<Rendered, ResolveError>> {
        let pages: Vec<_> = self.registry.pages().collect();
        pages.into_par_iter()
            .map(|page| self.resolve(page))
            .collect()
    }
}

/// A file's body waiting to be substituted for `content`.
struct Content<'a> {
    file: &'a FileNode,
    ranges: [Range<usize>; 2],
    /// The content `file` itself was extending with, if any.
    parent: Option<&'a Content<'a>>,
    /// Length of the template stack when `file` was being resolved.
    depth: usize,
}

/// The state of resolving one page.
struct Composer<'r, 'p> {
    resolver: &'p Resolver<'r>,
    page: &'p str,
    scope: Scope<'r>,
    /// Templates currently being resolved, outermost first.
    stack: Vec<Arc<str>>,
    deps: BTreeSet<Dependency>,
}

impl<'r> Composer<'r, '_> {
    /// Resolves all of `file`, composing it into its template if it declares
    /// one. `content` is what `file`'s own `content` markers substitute.
    fn compose(
        &mut self,
        file: &FileNode,
        content: Option<&Content<'_>>,
        out: &mut Vec<u8>,
    ) -> Result<(), ResolveError> {
        let Some((i, name, bindings)) = file.blocks.template() else {
            return self.walk(file, 0..file.blocks.len(), content, out);
        };

        let directive = &file.blocks.as_slice()[i];
        let parent = self.lookup(file, directive, name, DependencyKind::Template)?;
        let body = Content {
            file,
            ranges: file.blocks.body(),
            parent: content,
            depth: self.stack.len(),
        };

        self.enter(file, directive, &parent.path)?;
        self.scope.push_bindings(bindings);
        self.compose(parent, Some(&body), out)?;
        self.scope.pop();
        self.leave();

        self.walk(file, file.blocks.tail(), content, out)
    }

    fn walk(
        &mut self,
        file: &FileNode,
        range: Range<usize>,
        content: Option<&Content<'_>>,
        out: &mut Vec<u8>,
    ) -> Result<(), ResolveError> {
        let blocks = file.blocks.as_slice();
        let mut i = range.start;
        while i < range.end {
            let block = &blocks[i];
            match block {
                Block::Literal(bytes) => out.extend_from_slice(bytes),
                Block::Var { key, value } => {
                    self.scope.bind(key.clone(), Value::Scalar(value.clone()));
                }
                Block::Use(name) => match self.scope.get(name) {
                    Some(Value::Scalar(value)) => out.extend_from_slice(value.as_bytes()),
                    Some(Value::List(_)) => {
                        return Err(self.error(file, block, ResolveErrorKind::NotScalar(name.to_string())));
                    }
                    None => {
                        return Err(self.error(file, block, ResolveErrorKind::Unbound(name.to_string())));
                    }
                },
                Block::For { var, iterable } => {
                    let body = file.blocks.loop_body(i).unwrap_or((i + 1)..range.end);
                    let values = match self.scope.get(iterable) {
                        Some(Value::List(values)) => values.clone(),
                        Some(Value::Scalar(_)) => {
                            let kind = ResolveErrorKind::NotIterable(iterable.to_string());
                            return Err(self.error(file, block, kind));
                        }
                        None => {
                            let kind = ResolveErrorKind::Unbound(iterable.to_string());
                            return Err(self.error(file, block, kind));
                        }
                    };

                    for value in values.iter() {
                        self.scope.push();
                        self.scope.bind(var.clone(), Value::Scalar(value.clone()));
                        self.walk(file, body.clone(), content, out)?;
                        self.scope.pop();
                    }

                    // Skip past the loop's `endfor`.
                    i = body.end + 1;
                    continue;
                }
                Block::Content => match content {
                    Some(content) => self.substitute(content, out)?,
                    None => return Err(self.error(file, block, ResolveErrorKind::MisplacedContent)),
                },
                Block::Expand { name, bindings } => {
                    let target = self.lookup(file, block, name, DependencyKind::Expand)?;
                    self.enter(file, block, &target.path)?;
                    self.scope.push_bindings(bindings);
                    self.compose(target, None, out)?;
                    self.scope.pop();
                    self.leave();
                }
                Block::Template { .. } | Block::EndFor | Block::OutOnly => { }
            }

            i += 1;
        }

        Ok(())
    }

    /// Resolves the body `content` in place of a `content` marker, with the
    /// template stack as it was when the body's file was being resolved.
    fn substitute(&mut self, content: &Content<'_>, out: &mut Vec<u8>) -> Result<(), ResolveError> {
        let suspended = self.stack.split_off(content.depth.min(self.stack.len()));
        self.scope.push();
        for range in content.ranges.iter().cloned() {
            self.walk(content.file, range, content.parent, out)?;
        }

        self.scope.pop();
        self.stack.extend(suspended);
        Ok(())
    }

    fn lookup(
        &mut self,
        file: &FileNode,
        directive: &Block,
        name: &str,
        kind: DependencyKind,
    ) -> Result<&'r FileNode, ResolveError> {
        let registry = self.resolver.registry;
        let Some(target) = registry.template(name) else {
            let kind = ResolveErrorKind::UnknownTemplate(name.to_string());
            return Err(self.error(file, directive, kind));
        };

        self.deps.insert(Dependency { name: target.path.clone(), kind });
        Ok(target)
    }

    fn enter(&mut self, file: &FileNode, directive: &Block, name: &Arc<str>) -> Result<(), ResolveError> {
        if let Some(i) = self.stack.iter().position(|n| n == name) {
            let mut chain: Vec<String> = self.stack[i..].iter().map(|n| n.to_string()).collect();
            chain.push(name.to_string());
            return Err(self.error(file, directive, ResolveErrorKind::Cycle(chain)));
        }

        if self.stack.len() >= self.resolver.max_depth {
            let kind = ResolveErrorKind::DepthExceeded(self.resolver.max_depth);
            return Err(self.error(file, directive, kind));
        }

        tracing::trace!(page = self.page, template = %name, depth = self.stack.len(), "descending");
        self.stack.push(name.clone());
        Ok(())
    }

    fn leave(&mut self) {
        self.stack.pop();
    }

    fn error(&self, file: &FileNode, directive: &Block, kind: ResolveErrorKind) -> ResolveError {
        ResolveError {
            kind,
            page: self.page.to_string(),
            file: file.source_path(),
            directive: Some(directive.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Role, Source};

    struct Site {
        registry: Registry,
        globals: Globals,
    }

    impl Site {
        fn new(files: &[(Role, &str, &str)]) -> Site {
            let sources = files.iter().map(|&(role, path, text)| Source::new(role, path, text));
            let registry = Registry::from_sources(sources.collect()).unwrap();
            Site { registry, globals: Globals::new() }
        }

        fn page(text: &str) -> Site {
            Site::new(&[(Role::Page, "index.html", text)])
        }

        fn global<V: Into<Value>>(mut self, name: &str, value: V) -> Site {
            self.globals.insert(name, value);
            self
        }

        fn resolve(&self, page: &str) -> Result<Rendered, ResolveError> {
            let page = self.registry.page(page).unwrap();
            Resolver::new(&self.registry, &self.globals).resolve(page)
        }

        fn render(&self, page: &str) -> String {
            String::from_utf8(self.resolve(page).unwrap().output).unwrap()
        }

        fn fail(&self, page: &str) -> ResolveErrorKind {
            self.resolve(page).unwrap_err().kind
        }
    }

    #[test]
    fn var_binds_for_the_rest_of_the_region() {
        let site = Site::page("Hello {% var name='World' %}{% use name %}!");
        assert_eq!(site.render("index.html"), "Hello World!");
    }

    #[test]
    fn for_repeats_its_body_per_element() {
        let site = Site::page("{% for i in items %}<li>{% use i %}</li>{% endfor %}")
            .global("items", vec!["a", "b"]);

        assert_eq!(site.render("index.html"), "<li>a</li><li>b</li>");
    }

    #[test]
    fn nested_loops_and_loop_scopes() {
        let site = Site::page(
            "{% for r in rows %}[{% var sep='|' %}{% for c in cols %}{% use r %}{% use c %}{% use sep %}{% endfor %}]{% endfor %}{% use r %}"
        ).global("rows", vec!["1", "2"]).global("cols", vec!["a", "b"]).global("r", "done");

        assert_eq!(site.render("index.html"), "[1a|1b|][2a|2b|]done");
    }

    #[test]
    fn empty_lists_emit_nothing() {
        let site = Site::page("<ul>{% for i in none %}{% use missing %}{% endfor %}</ul>")
            .global("none", Vec::<String>::new());

        assert_eq!(site.render("index.html"), "<ul></ul>");
    }

    #[test]
    fn template_substitutes_body_for_content() {
        let site = Site::new(&[
            (Role::Template, "base.html", "<html>{% content %}</html>"),
            (Role::Page, "index.html", "{% template base %}<p>hi</p>"),
        ]);

        let rendered = site.resolve("index.html").unwrap();
        assert_eq!(rendered.output, b"<html><p>hi</p></html>");
        assert_eq!(rendered.deps.into_iter().collect::<Vec<_>>(), [
            Dependency { name: "base.html".into(), kind: DependencyKind::Template },
        ]);
    }

    #[test]
    fn template_bindings_are_visible_to_the_template_and_body() {
        let site = Site::new(&[
            (Role::Template, "base.html", "<title>{% use title %}</title>{% content %}{% content %}"),
            (Role::Page, "index.html", "{% template base title='Home' %}<h1>{% use title %}</h1>"),
        ]).global("title", "Site");

        assert_eq!(site.render("index.html"), "<title>Home</title><h1>Home</h1><h1>Home</h1>");
    }

    #[test]
    fn multi_level_inheritance() {
        let site = Site::new(&[
            (Role::Template, "root.html", "<html>{% content %}</html>"),
            (Role::Template, "layouts/post.html", "{% template root %}<article>{% content %}</article>"),
            (Role::Page, "a.md", "before {% template layouts/post %}after"),
        ]);

        let rendered = site.resolve("a.md").unwrap();
        assert_eq!(rendered.output, b"<html><article>before after</article></html>");
        assert_eq!(rendered.deps.len(), 2);
        assert_eq!(rendered.output_path(), std::path::Path::new("a.html"));
    }

    #[test]
    fn content_can_repeat_inside_template_loops() {
        let site = Site::new(&[
            (Role::Template, "list.html", "{% for x in xs %}<{% content %}>{% endfor %}"),
            (Role::Page, "index.html", "{% template list %}{% use x %}"),
        ]).global("xs", vec!["1", "2"]);

        assert_eq!(site.render("index.html"), "<1><2>");
    }

    #[test]
    fn expand_inlines_with_local_bindings() {
        let site = Site::new(&[
            (Role::Template, "partials/link.html", "<a>{% use text %}</a>"),
            (Role::Page, "index.html", "{% expand partials/link text='one' %}|{% expand partials/link.html text='two' %}|{% use text %}"),
        ]).global("text", "outer");

        let rendered = site.resolve("index.html").unwrap();
        assert_eq!(rendered.output, b"<a>one</a>|<a>two</a>|outer");
        assert_eq!(rendered.deps.into_iter().collect::<Vec<_>>(), [
            Dependency { name: "partials/link.html".into(), kind: DependencyKind::Expand },
        ]);
    }

    #[test]
    fn expanded_templates_can_extend() {
        let site = Site::new(&[
            (Role::Template, "card.html", "<div>{% content %}</div>"),
            (Role::Template, "note.html", "{% template card %}note"),
            (Role::Page, "index.html", "{% expand note %}{% expand note %}"),
        ]);

        assert_eq!(site.render("index.html"), "<div>note</div><div>note</div>");
    }

    #[test]
    fn out_only_tail_follows_the_composition() {
        let site = Site::new(&[
            (Role::Template, "base.html", "<main>{% content %}</main>"),
            (Role::Page, "index.html", "{% template base %}body{% outonly %}<script></script>"),
            (Role::Page, "plain.html", "a{% outonly %}b"),
        ]);

        assert_eq!(site.render("index.html"), "<main>body</main><script></script>");
        assert_eq!(site.render("plain.html"), "ab");
    }

    #[test]
    fn reference_errors() {
        let site = Site::new(&[
            (Role::Page, "unbound.html", "{% use nope %}"),
            (Role::Page, "unknown.html", "{% expand nope %}"),
            (Role::Page, "missing-base.html", "{% template nope %}"),
            (Role::Page, "scalar.html", "{% for x in one %}{% endfor %}"),
            (Role::Page, "list.html", "{% use many %}"),
            (Role::Page, "iterable.html", "{% for x in nothing %}{% endfor %}"),
            (Role::Page, "a-page.html", "{% expand unbound %}"),
        ]).global("one", "1").global("many", vec!["1", "2"]);

        assert_eq!(site.fail("unbound.html"), ResolveErrorKind::Unbound("nope".into()));
        assert_eq!(site.fail("unknown.html"), ResolveErrorKind::UnknownTemplate("nope".into()));
        assert_eq!(site.fail("missing-base.html"), ResolveErrorKind::UnknownTemplate("nope".into()));
        assert_eq!(site.fail("scalar.html"), ResolveErrorKind::NotIterable("one".into()));
        assert_eq!(site.fail("list.html"), ResolveErrorKind::NotScalar("many".into()));
        assert_eq!(site.fail("iterable.html"), ResolveErrorKind::Unbound("nothing".into()));
        assert_eq!(site.fail("a-page.html"), ResolveErrorKind::UnknownTemplate("unbound".into()));

        let error = site.resolve("unbound.html").unwrap_err();
        assert_eq!(error.class(), ErrorClass::Reference);
        assert_eq!(error.file, "pages/unbound.html");
        assert_eq!(error.directive.as_deref(), Some("{% use nope %}"));
    }

    #[test]
    fn content_outside_an_extension_is_misplaced() {
        let site = Site::new(&[
            (Role::Template, "partial.html", "{% content %}"),
            (Role::Page, "direct.html", "{% content %}"),
            (Role::Page, "expanded.html", "{% expand partial %}"),
            (Role::Page, "body.html", "{% template partial %}{% content %}"),
        ]);

        for page in ["direct.html", "expanded.html", "body.html"] {
            assert_eq!(site.fail(page), ResolveErrorKind::MisplacedContent, "{page}");
        }

        assert_eq!(site.resolve("expanded.html").unwrap_err().file, "templates/partial.html");
    }

    #[test]
    fn expansion_cycles_are_detected() {
        let site = Site::new(&[
            (Role::Template, "a.html", "{% expand b %}"),
            (Role::Template, "b.html", "{% expand a %}"),
            (Role::Template, "self.html", "{% template self %}"),
            (Role::Page, "index.html", "{% expand a %}"),
            (Role::Page, "loop.html", "{% template self %}"),
        ]);

        let error = site.resolve("index.html").unwrap_err();
        assert_eq!(error.kind, ResolveErrorKind::Cycle(vec![
            "a.html".into(), "b.html".into(), "a.html".into(),
        ]));
        assert_eq!(error.class(), ErrorClass::Cyclic);
        assert_eq!(error.file, "templates/b.html");

        assert!(matches!(site.fail("loop.html"), ResolveErrorKind::Cycle(chain) if chain.len() == 2));

        let page = site.registry.page("index.html").unwrap();
        let unbounded = Resolver::new(&site.registry, &site.globals).with_max_depth(usize::MAX);
        assert_eq!(unbounded.resolve(page).unwrap_err().kind, ResolveErrorKind::Cycle(vec![
            "a.html".into(), "b.html".into(), "a.html".into(),
        ]));
    }

    #[test]
    fn repeated_non_recursive_use_is_not_a_cycle() {
        let site = Site::new(&[
            (Role::Template, "base.html", "[{% content %}]"),
            (Role::Template, "leaf.html", "leaf"),
            (Role::Page, "index.html", "{% template base %}{% expand base %}"),
            (Role::Page, "twice.html", "{% template base %}{% expand leaf %}{% expand leaf %}"),
        ]);

        assert_eq!(site.render("twice.html"), "[leafleaf]");
        assert_eq!(site.fail("index.html"), ResolveErrorKind::MisplacedContent);
    }

    #[test]
    fn depth_is_bounded() {
        let files: Vec<_> = (0..10)
            .map(|i| (format!("t{i}.html"), format!("{{% expand t{} %}}", i + 1)))
            .chain([("t10.html".to_string(), "end".to_string())])
            .collect();

        let mut sources: Vec<_> = files.iter()
            .map(|(path, text)| (Role::Template, path.as_str(), text.as_str()))
            .collect();
        sources.push((Role::Page, "index.html", "{% expand t0 %}"));

        let site = Site::new(&sources);
        let page = site.registry.page("index.html").unwrap();
        let resolver = Resolver::new(&site.registry, &site.globals);

        assert_eq!(resolver.resolve(page).unwrap().output, b"end");
        assert_eq!(resolver.with_max_depth(11).resolve(page).unwrap().deps.len(), 11);

        let error = resolver.with_max_depth(5).resolve(page).unwrap_err();
        assert_eq!(error.kind, ResolveErrorKind::DepthExceeded(5));
        assert_eq!(error.file, "templates/t4.html");
    }

    #[test]
    fn resolve_all_reports_every_page_in_order() {
        let site = Site::new(&[
            (Role::Page, "b.html", "{% use nope %}"),
            (Role::Page, "a.html", "a"),
            (Role::Page, "c/d.html", "{% use x %}"),
        ]).global("x", "d");

        let results = site.registry.pages()
            .map(|page| page.path.to_string())
            .zip(Resolver::new(&site.registry, &site.globals).resolve_all())
            .map(|(path, result)| (path, result.map(|r| r.output).map_err(|e| e.kind)))
            .collect::<Vec<_>>();

        assert_eq!(results, [
            ("a.html".to_string(), Ok(b"a".to_vec())),
            ("b.html".to_string(), Err(ResolveErrorKind::Unbound("nope".into()))),
            ("c/d.html".to_string(), Ok(b"d".to_vec())),
        ]);
    }
}
