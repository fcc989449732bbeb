use std::borrow::Cow;

use crate::template::{Block, Bindings, Keyword, ParseErrorKind};
use ParseErrorKind::*;

/// Entities that HTML converters substitute for a plain `'`.
const ENTITIES: &[(&str, &str)] = &[("&rsquo;", "'"), ("&lsquo;", "'")];

fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut text = text.to_string();
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }

    Cow::Owned(text)
}

/// Splits directive text into tokens.
///
/// Tokens are separated by whitespace. Within a token, a single-quoted span
/// contributes its contents verbatim (whitespace included) and a backslash
/// escapes a following `\` or `'`. Adjacent pieces join, so `key='a b'` is
/// the single token `key=a b`.
fn tokenize(text: &str) -> Result<Vec<String>, ParseErrorKind> {
    let mut tokens = vec![];
    let mut chars = text.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() { }
        if chars.peek().is_none() {
            return Ok(tokens);
        }

        let mut token = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
            match c {
                '\'' => loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => token.push(c),
                        None => return Err(UnterminatedQuote),
                    }
                },
                '\\' => match chars.next_if(|&c| c == '\\' || c == '\'') {
                    Some(escaped) => token.push(escaped),
                    None => token.push('\\'),
                },
                c => token.push(c),
            }
        }

        tokens.push(token);
    }
}

/// Splits a `key=value` token on its first `=`. Both sides must be non-empty.
fn binding(token: &str) -> Result<(&str, &str), ParseErrorKind> {
    match token.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => Ok((key, value)),
        _ => Err(MalformedBinding(token.to_string())),
    }
}

fn bindings(tokens: &[String]) -> Result<Bindings, ParseErrorKind> {
    let mut bindings = Bindings::new();
    for token in tokens {
        let (key, value) = binding(token)?;
        if !bindings.insert(key, value) {
            return Err(DuplicateBinding(key.to_string()));
        }
    }

    Ok(bindings)
}

/// Parses the raw text between a directive's delimiters into a block.
pub fn parse(raw: &[u8]) -> Result<Block, ParseErrorKind> {
    let text = std::str::from_utf8(raw).map_err(|_| InvalidUtf8)?;
    let tokens = tokenize(&unescape(text))?;
    let (first, rest) = tokens.split_first().ok_or(EmptyDirective)?;

    let word = first.split_whitespace().next().unwrap_or("").to_lowercase();
    let Some(keyword) = Keyword::from_word(&word) else {
        return Err(UnrecognizedDirective(word));
    };

    let block = match (keyword, rest) {
        (Keyword::Template | Keyword::Expand, []) => return Err(MissingName(keyword)),
        (Keyword::Template, [name, pairs @ ..]) => Block::Template {
            name: name.as_str().into(),
            bindings: bindings(pairs)?,
        },
        (Keyword::Expand, [name, pairs @ ..]) => Block::Expand {
            name: name.as_str().into(),
            bindings: bindings(pairs)?,
        },
        (Keyword::Content, []) => Block::Content,
        (Keyword::EndFor, []) => Block::EndFor,
        (Keyword::OutOnly, []) => Block::OutOnly,
        (Keyword::Content | Keyword::EndFor | Keyword::OutOnly, _) => {
            return Err(Arity { keyword, expected: "no arguments" });
        }
        (Keyword::Use, [name]) => Block::Use(name.as_str().into()),
        (Keyword::Use, _) => return Err(Arity { keyword, expected: "exactly one variable name" }),
        (Keyword::For, [var, in_, iterable]) if in_ == "in" => Block::For {
            var: var.as_str().into(),
            iterable: iterable.as_str().into(),
        },
        (Keyword::For, [_, other, _]) => return Err(MissingIn(other.clone())),
        (Keyword::For, _) => return Err(Arity { keyword, expected: "`<var> in <iterable>`" }),
        (Keyword::Var, [pair]) => {
            let (key, value) = binding(pair)?;
            Block::Var { key: key.into(), value: value.into() }
        }
        (Keyword::Var, _) => return Err(Arity { keyword, expected: "exactly one `key=value` binding" }),
    };

    Ok(block)
}
