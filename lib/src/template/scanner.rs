use memchr::{memchr2, memchr_iter};

use crate::template::block::{BlockSeq, Builder};
use crate::template::{directive, ParseError, ParseErrorKind, Position};

pub const OPEN: &[u8] = b"{%";
pub const CLOSE: &[u8] = b"%}";

/// Tracks line and column for monotonically increasing offsets without
/// rescanning the input from the start.
struct Locator<'a> {
    input: &'a [u8],
    offset: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Locator<'a> {
    fn new(input: &'a [u8]) -> Self {
        Locator { input, offset: 0, line: 1, line_start: 0 }
    }

    fn locate(&mut self, offset: usize) -> Position {
        debug_assert!(offset >= self.offset);
        for i in memchr_iter(b'\n', &self.input[self.offset..offset]) {
            self.line += 1;
            self.line_start = self.offset + i + 1;
        }

        self.offset = offset;
        Position { line: self.line, column: offset - self.line_start + 1 }
    }
}

/// Splits `input` into literal and directive spans in a single pass, parsing
/// each directive as it closes.
pub fn scan(input: &[u8]) -> Result<BlockSeq, ParseError> {
    let mut builder = Builder::new();
    let mut locator = Locator::new(input);

    // Start of the open directive's `{%`, if one is open.
    let mut open: Option<usize> = None;
    // Start of the bytes not yet emitted as a block.
    let mut cut = 0;
    let mut i = 0;

    while let Some(j) = memchr2(b'{', b'%', &input[i..]) {
        let at = i + j;
        match &input[at..input.len().min(at + 2)] {
            delim if delim == OPEN => {
                if open.is_some() {
                    return Err(ParseError::at(ParseErrorKind::NestedDelimiter, input, at));
                }

                builder.push_literal(&input[cut..at]);
                open = Some(at);
                cut = at + 2;
                i = at + 2;
            }
            delim if delim == CLOSE => {
                let Some(start) = open.take() else {
                    return Err(ParseError::at(ParseErrorKind::UnopenedDelimiter, input, at));
                };

                let source = &input[start..(at + 2)];
                let position = locator.locate(start);
                let fail = |kind| ParseError { kind, position, directive: None }.with_directive(source);

                let block = directive::parse(&input[cut..at]).map_err(fail)?;
                builder.push(block, position).map_err(fail)?;
                cut = at + 2;
                i = at + 2;
            }
            _ => i = at + 1,
        }
    }

    if let Some(start) = open {
        let error = ParseError::at(ParseErrorKind::UnterminatedDelimiter, input, start);
        let end = input.len().min(start + 64);
        return Err(error.with_directive(&input[start..end]));
    }

    builder.push_literal(&input[cut..]);
    builder.finish().map_err(|(kind, position, block)| ParseError {
        kind,
        position,
        directive: Some(block.to_string()),
    })
}
