//! Conversion of source formats into HTML bytes before scanning.

mod notebook;

use pulldown_cmark::{html, Options, Parser};

/// Why a source file could not be converted to HTML.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("unsupported source file extension `{0}`")]
    UnsupportedExtension(String),
    #[error("source file has no extension")]
    MissingExtension,
    #[error("markdown source is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("malformed notebook")]
    Notebook(#[from] serde_json::Error),
}

impl_error_detail_with_std_error!(ConvertError, Some(Io));

/// Turns the raw bytes of a source file into HTML.
pub trait Convert: Sync {
    /// Converts `bytes`, the contents of a file with extension `ext`.
    fn convert(&self, ext: Option<&str>, bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError>;
}

impl<F> Convert for F
    where F: Fn(Option<&str>, Vec<u8>) -> Result<Vec<u8>, ConvertError> + Sync
{
    fn convert(&self, ext: Option<&str>, bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
        self(ext, bytes)
    }
}

/// The default converter: `.html` passes through, `.md` is rendered as
/// markdown, `.ipynb` notebooks have their cells rendered in order.
#[derive(Debug, Clone)]
pub struct Converter {
    options: Options,
}

impl Default for Converter {
    fn default() -> Self {
        Converter {
            // Smart punctuation rewrites the quotes directives rely on, and
            // heading attributes swallow a trailing `{% ... %}` on a heading.
            options: Options::all()
                .difference(Options::ENABLE_SMART_PUNCTUATION | Options::ENABLE_HEADING_ATTRIBUTES),
        }
    }
}

impl Converter {
    pub fn markdown(&self, source: &str) -> String {
        let mut output = String::with_capacity(source.len() + source.len() / 2);
        html::push_html(&mut output, Parser::new_ext(source, self.options));
        output
    }
}

impl Convert for Converter {
    fn convert(&self, ext: Option<&str>, bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
        match ext {
            Some("html") => Ok(bytes),
            Some("md") => Ok(self.markdown(&String::from_utf8(bytes)?).into_bytes()),
            Some("ipynb") => Ok(notebook::render(self, &bytes)?.into_bytes()),
            Some(other) => Err(ConvertError::UnsupportedExtension(other.into())),
            None => Err(ConvertError::MissingExtension),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_passes_through_untouched() {
        let input = b"<p>{% use x %}</p>".to_vec();
        assert_eq!(Converter::default().convert(Some("html"), input.clone()).unwrap(), input);
    }

    #[test]
    fn markdown_keeps_directives_intact() {
        let output = Converter::default()
            .convert(Some("md"), b"# Title\n\n{% var name='World' %}{% use name %}\n".to_vec())
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("<h1>Title</h1>"));
        assert!(output.contains("{% var name='World' %}{% use name %}"));
    }

    #[test]
    fn heading_directives_survive() {
        let output = Converter::default()
            .convert(Some("md"), b"# Hello {% use name %}\n\n## {% var a=b %}\n".to_vec())
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("<h1>Hello {% use name %}</h1>"));
        assert!(output.contains("<h2>{% var a=b %}</h2>"));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let converter = Converter::default();
        assert!(matches!(
            converter.convert(Some("txt"), vec![]),
            Err(ConvertError::UnsupportedExtension(ext)) if ext == "txt"
        ));

        assert!(matches!(converter.convert(None, vec![]), Err(ConvertError::MissingExtension)));
        assert!(matches!(converter.convert(Some("md"), vec![0xff]), Err(ConvertError::Utf8(_))));
    }
}
