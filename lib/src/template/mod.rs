//! Scanning and parsing of source files into block sequences.
//!
//! A source file is a byte string of literal markup interleaved with
//! directives delimited by `{%` and `%}`. [`BlockSeq::parse()`] scans the
//! file once, parsing each directive as its closing delimiter is found, and
//! validates loop nesting and `template`/`outonly` placement on the way.
//!
//! ```rust
//! use sssg::template::{Block, BlockSeq};
//!
//! let seq = BlockSeq::parse("Hello {% use name %}!").unwrap();
//! assert_eq!(seq.as_slice(), &[
//!     Block::literal("Hello "),
//!     Block::Use("name".into()),
//!     Block::literal("!"),
//! ]);
//! ```

mod error;
mod block;
mod directive;
mod scanner;

pub use error::*;
pub use block::{Block, BlockSeq, Bindings, Keyword};
pub use scanner::{OPEN, CLOSE};

#[cfg(test)]
static_assertions::assert_impl_all!(BlockSeq: Send, Sync);
