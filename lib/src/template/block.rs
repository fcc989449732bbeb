use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::template::{ParseError, ParseErrorKind, Position};

/// The word that selects a directive's kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    Template,
    Expand,
    Content,
    Use,
    For,
    EndFor,
    Var,
    OutOnly,
}

impl Keyword {
    pub const ALL: [Keyword; 8] = [
        Keyword::Template, Keyword::Expand, Keyword::Content, Keyword::Use,
        Keyword::For, Keyword::EndFor, Keyword::Var, Keyword::OutOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Template => "template",
            Keyword::Expand => "expand",
            Keyword::Content => "content",
            Keyword::Use => "use",
            Keyword::For => "for",
            Keyword::EndFor => "endfor",
            Keyword::Var => "var",
            Keyword::OutOnly => "outonly",
        }
    }

    /// Looks up the keyword for `word`, which must already be lowercase.
    pub fn from_word(word: &str) -> Option<Keyword> {
        Keyword::ALL.into_iter().find(|k| k.as_str() == word)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered list of `key=value` pairs with unique keys.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bindings(Vec<(Arc<str>, Arc<str>)>);

impl Bindings {
    pub fn new() -> Self {
        Bindings(vec![])
    }

    /// Appends `key = value`. Returns `false`, leaving `self` unchanged, if
    /// `key` is already bound.
    pub fn insert(&mut self, key: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> bool {
        let key = key.into();
        if self.get(&key).is_some() {
            return false;
        }

        self.0.push((key, value.into()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&Arc<str>> {
        self.0.iter().find(|(k, _)| &**k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Arc<str>)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<Arc<str>>, V: Into<Arc<str>>> FromIterator<(K, V)> for Bindings {
    /// Collects pairs in order. Later duplicates of a key are dropped.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (k, v) in iter {
            bindings.insert(k, v);
        }

        bindings
    }
}

/// One parsed unit of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Raw bytes, emitted verbatim.
    Literal(Arc<[u8]>),
    /// Declares the file a child of the template `name`.
    Template { name: Arc<str>, bindings: Bindings },
    /// Splices the resolved output of `name` in place.
    Expand { name: Arc<str>, bindings: Bindings },
    /// Marks where an extending file's body is substituted.
    Content,
    /// Emits the value bound to the variable.
    Use(Arc<str>),
    /// Repeats the region up to the matching `EndFor` once per value.
    For { var: Arc<str>, iterable: Arc<str> },
    EndFor,
    /// Binds `key` to a literal for the rest of the region.
    Var { key: Arc<str>, value: Arc<str> },
    /// The rest of the file is never substituted as `content`.
    OutOnly,
}

impl Block {
    pub fn literal<B: AsRef<[u8]>>(bytes: B) -> Block {
        Block::Literal(bytes.as_ref().into())
    }

    /// The directive keyword for this block, `None` for literals.
    pub fn keyword(&self) -> Option<Keyword> {
        Some(match self {
            Block::Literal(_) => return None,
            Block::Template { .. } => Keyword::Template,
            Block::Expand { .. } => Keyword::Expand,
            Block::Content => Keyword::Content,
            Block::Use(_) => Keyword::Use,
            Block::For { .. } => Keyword::For,
            Block::EndFor => Keyword::EndFor,
            Block::Var { .. } => Keyword::Var,
            Block::OutOnly => Keyword::OutOnly,
        })
    }
}

/// Renders directives back in canonical source form. Values are always
/// single-quoted; literals render as their (lossily decoded) text.
impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bindings(f: &mut fmt::Formatter<'_>, bindings: &Bindings) -> fmt::Result {
            bindings.iter().try_for_each(|(k, v)| write!(f, " {k}='{v}'"))
        }

        match self {
            Block::Literal(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            Block::Template { name, bindings: b } | Block::Expand { name, bindings: b } => {
                write!(f, "{{% {} {name}", self.keyword().map_or("", |k| k.as_str()))?;
                bindings(f, b)?;
                write!(f, " %}}")
            }
            Block::Use(name) => write!(f, "{{% use {name} %}}"),
            Block::For { var, iterable } => write!(f, "{{% for {var} in {iterable} %}}"),
            Block::Var { key, value } => write!(f, "{{% var {key}='{value}' %}}"),
            Block::Content | Block::EndFor | Block::OutOnly => {
                write!(f, "{{% {} %}}", self.keyword().map_or("", |k| k.as_str()))
            }
        }
    }
}

/// The ordered, immutable blocks of exactly one source file.
///
/// Besides the blocks themselves, a sequence knows where each `for` loop ends,
/// where its `template` declaration (if any) sits, and where its out-only
/// tail begins, so resolution works purely on index ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSeq {
    blocks: Arc<[Block]>,
    loop_ends: Arc<[(usize, usize)]>,
    template: Option<usize>,
    out_only: Option<usize>,
}

impl BlockSeq {
    /// Scans and parses `input` into a validated sequence.
    pub fn parse<B: AsRef<[u8]>>(input: B) -> Result<BlockSeq, ParseError> {
        crate::template::scanner::scan(input.as_ref())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn as_slice(&self) -> &[Block] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    /// The index of the `EndFor` matching the `For` at `start`.
    pub fn loop_end(&self, start: usize) -> Option<usize> {
        self.loop_ends
            .binary_search_by_key(&start, |&(s, _)| s)
            .ok()
            .map(|i| self.loop_ends[i].1)
    }

    /// The blocks strictly between the `For` at `start` and its `EndFor`.
    pub fn loop_body(&self, start: usize) -> Option<Range<usize>> {
        self.loop_end(start).map(|end| (start + 1)..end)
    }

    /// The `template` declaration: its index, name, and bindings.
    pub fn template(&self) -> Option<(usize, &Arc<str>, &Bindings)> {
        let i = self.template?;
        match &self.blocks[i] {
            Block::Template { name, bindings } => Some((i, name, bindings)),
            _ => None,
        }
    }

    /// The ranges that make up the file's own body: everything before the
    /// out-only marker except the `template` declaration.
    pub fn body(&self) -> [Range<usize>; 2] {
        let end = self.out_only.unwrap_or(self.len());
        match self.template {
            Some(t) if t < end => [0..t, (t + 1)..end],
            _ => [0..end, end..end],
        }
    }

    /// The blocks after the out-only marker.
    pub fn tail(&self) -> Range<usize> {
        match self.out_only {
            Some(i) => (i + 1)..self.len(),
            None => self.len()..self.len(),
        }
    }
}

impl std::ops::Index<Range<usize>> for BlockSeq {
    type Output = [Block];

    fn index(&self, range: Range<usize>) -> &[Block] {
        &self.blocks[range]
    }
}

impl<'a> IntoIterator for &'a BlockSeq {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Append-only construction of a [`BlockSeq`], enforcing its structure.
#[derive(Debug, Default)]
pub(crate) struct Builder {
    blocks: Vec<Block>,
    open_loops: Vec<(usize, Position)>,
    loop_ends: Vec<(usize, usize)>,
    template: Option<usize>,
    out_only: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    pub fn push_literal(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.blocks.push(Block::literal(bytes));
        }
    }

    /// Appends a directive block found at `position`.
    pub fn push(&mut self, block: Block, position: Position) -> Result<(), ParseErrorKind> {
        let index = self.blocks.len();
        let top_level = self.open_loops.is_empty();
        match &block {
            Block::For { .. } => self.open_loops.push((index, position)),
            Block::EndFor => match self.open_loops.pop() {
                Some((start, _)) => self.loop_ends.push((start, index)),
                None => return Err(ParseErrorKind::UnmatchedEndFor),
            },
            Block::Template { .. } if !top_level => return Err(ParseErrorKind::NestedTemplate),
            Block::Template { .. } if self.template.is_some() => {
                return Err(ParseErrorKind::DuplicateTemplate);
            }
            Block::Template { .. } => self.template = Some(index),
            Block::OutOnly if !top_level => return Err(ParseErrorKind::NestedOutOnly),
            Block::OutOnly => { self.out_only.get_or_insert(index); }
            _ => { }
        }

        self.blocks.push(block);
        Ok(())
    }

    /// Finishes the sequence. On failure, returns the outermost loop left
    /// open along with its position.
    pub fn finish(mut self) -> Result<BlockSeq, (ParseErrorKind, Position, Block)> {
        if let Some(&(index, position)) = self.open_loops.first() {
            let block = self.blocks.swap_remove(index);
            return Err((ParseErrorKind::UnmatchedFor, position, block));
        }

        self.loop_ends.sort_unstable();
        Ok(BlockSeq {
            blocks: self.blocks.into(),
            loop_ends: self.loop_ends.into(),
            template: self.template,
            out_only: self.out_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position { line: 1, column: 1 }
    }

    fn for_loop(var: &str, iterable: &str) -> Block {
        Block::For { var: var.into(), iterable: iterable.into() }
    }

    #[test]
    fn nested_loops_match_innermost_first() {
        let mut builder = Builder::new();
        builder.push(for_loop("a", "xs"), pos()).unwrap();
        builder.push_literal(b"x");
        builder.push(for_loop("b", "ys"), pos()).unwrap();
        builder.push(Block::EndFor, pos()).unwrap();
        builder.push(Block::EndFor, pos()).unwrap();

        let seq = builder.finish().unwrap();
        assert_eq!(seq.loop_end(0), Some(4));
        assert_eq!(seq.loop_end(2), Some(3));
        assert_eq!(seq.loop_body(0), Some(1..4));
        assert_eq!(seq.loop_end(1), None);
    }

    #[test]
    fn unbalanced_loops_are_rejected() {
        let mut builder = Builder::new();
        assert_eq!(builder.push(Block::EndFor, pos()), Err(ParseErrorKind::UnmatchedEndFor));

        let mut builder = Builder::new();
        let start = Position { line: 2, column: 5 };
        builder.push(for_loop("a", "xs"), start).unwrap();
        let (kind, position, block) = builder.finish().unwrap_err();
        assert_eq!((kind, position, block), (ParseErrorKind::UnmatchedFor, start, for_loop("a", "xs")));
    }

    #[test]
    fn template_placement_is_checked() {
        let template = Block::Template { name: "base".into(), bindings: Bindings::new() };

        let mut builder = Builder::new();
        builder.push(template.clone(), pos()).unwrap();
        assert_eq!(builder.push(template.clone(), pos()), Err(ParseErrorKind::DuplicateTemplate));

        let mut builder = Builder::new();
        builder.push(for_loop("a", "xs"), pos()).unwrap();
        assert_eq!(builder.push(template, pos()), Err(ParseErrorKind::NestedTemplate));
        assert_eq!(builder.push(Block::OutOnly, pos()), Err(ParseErrorKind::NestedOutOnly));
    }

    #[test]
    fn body_skips_template_and_out_only_tail() {
        let mut builder = Builder::new();
        builder.push_literal(b"a");
        builder.push(Block::Template { name: "base".into(), bindings: Bindings::new() }, pos()).unwrap();
        builder.push_literal(b"b");
        builder.push(Block::OutOnly, pos()).unwrap();
        builder.push_literal(b"c");

        let seq = builder.finish().unwrap();
        assert_eq!(seq.body(), [0..1, 2..3]);
        assert_eq!(seq.tail(), 4..5);
        assert_eq!(seq.template().map(|(i, name, _)| (i, &**name)), Some((1, "base")));
    }

    #[test]
    fn bindings_keep_order_and_reject_duplicates() {
        let mut bindings = Bindings::new();
        assert!(bindings.insert("b", "1"));
        assert!(bindings.insert("a", "2"));
        assert!(!bindings.insert("b", "3"));

        let keys: Vec<_> = bindings.iter().map(|(k, _)| &**k).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(bindings.get("b").map(|v| &**v), Some("1"));
    }

    #[test]
    fn directives_display_in_source_form() {
        let mut bindings = Bindings::new();
        bindings.insert("title", "Hello there");
        let expand = Block::Expand { name: "nav".into(), bindings };

        assert_eq!(expand.to_string(), "{% expand nav title='Hello there' %}");
        assert_eq!(for_loop("i", "items").to_string(), "{% for i in items %}");
        assert_eq!(Block::EndFor.to_string(), "{% endfor %}");
        assert_eq!(Block::literal("<p>").to_string(), "<p>");
    }
}
