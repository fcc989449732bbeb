use std::fmt;

use crate::error::ErrorClass;
use crate::template::Keyword;

/// A 1-based line and column into a source file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Computes the position of byte `offset` in `input`. Columns count bytes.
    pub fn locate(input: &[u8], offset: usize) -> Position {
        let prefix = &input[..offset.min(input.len())];
        let line = memchr::memchr_iter(b'\n', prefix).count() + 1;
        let column = match memchr::memrchr(b'\n', prefix) {
            Some(i) => offset - i,
            None => offset + 1,
        };

        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Why one file's source could not be turned into a block sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("directives cannot nest: `{{%` found inside an open directive")]
    NestedDelimiter,
    #[error("`%}}` closes a directive that was never opened")]
    UnopenedDelimiter,
    #[error("directive opened with `{{%` is never closed")]
    UnterminatedDelimiter,
    #[error("directive is empty")]
    EmptyDirective,
    #[error("unrecognized directive `{0}`")]
    UnrecognizedDirective(String),
    #[error("`{0}` directive requires a name")]
    MissingName(Keyword),
    #[error("`{keyword}` directive expects {expected}")]
    Arity { keyword: Keyword, expected: &'static str },
    #[error("`for` directive expects the keyword `in`, found `{0}`")]
    MissingIn(String),
    #[error("malformed binding `{0}`: expected `key=value` with non-empty sides")]
    MalformedBinding(String),
    #[error("`{0}` is bound more than once")]
    DuplicateBinding(String),
    #[error("quoted string is never closed")]
    UnterminatedQuote,
    #[error("directive is not valid UTF-8")]
    InvalidUtf8,
    #[error("`for` is never closed by a matching `endfor`")]
    UnmatchedFor,
    #[error("`endfor` has no matching `for`")]
    UnmatchedEndFor,
    #[error("a file may declare at most one `template`")]
    DuplicateTemplate,
    #[error("`template` must be declared at the top level, not inside a loop")]
    NestedTemplate,
    #[error("`outonly` must appear at the top level, not inside a loop")]
    NestedOutOnly,
}

impl ParseErrorKind {
    pub fn class(&self) -> ErrorClass {
        use ParseErrorKind::*;

        match self {
            UnmatchedFor | UnmatchedEndFor | DuplicateTemplate
                | NestedTemplate | NestedOutOnly => ErrorClass::Structural,
            _ => ErrorClass::Syntax,
        }
    }
}

/// A [`ParseErrorKind`] located in its source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
    /// The offending directive as it appears in the source, delimiters
    /// included, when there is one.
    pub directive: Option<String>,
}

impl ParseError {
    pub(crate) fn at(kind: ParseErrorKind, input: &[u8], offset: usize) -> Self {
        ParseError { kind, position: Position::locate(input, offset), directive: None }
    }

    pub(crate) fn with_directive(mut self, source: &[u8]) -> Self {
        self.directive = Some(String::from_utf8_lossy(source).into_owned());
        self
    }

    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }
}

impl crate::error::ErrorDetail for ParseError {
    fn context(&self) -> Vec<(Option<String>, String)> {
        let mut context = vec![(Some("at".into()), self.position.to_string())];
        if let Some(directive) = &self.directive {
            context.push((Some("directive".into()), directive.clone()));
        }

        context
    }

    fn class(&self) -> Option<ErrorClass> {
        Some(self.kind.class())
    }
}
