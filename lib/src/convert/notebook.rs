use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Tag, TagEnd};
use serde::Deserialize;

use crate::convert::Converter;

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    metadata: Metadata,
    cells: Vec<Cell>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    language_info: Option<LanguageInfo>,
}

#[derive(Debug, Deserialize)]
struct LanguageInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: Text,
}

/// Notebook text fields are either one string or a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Text {
    Lines(Vec<String>),
    Whole(String),
}

impl Default for Text {
    fn default() -> Self {
        Text::Whole(String::new())
    }
}

impl Text {
    fn into_string(self) -> String {
        match self {
            Text::Lines(lines) => lines.concat(),
            Text::Whole(string) => string,
        }
    }
}

/// Renders a Jupyter notebook as HTML: markdown cells as markdown, code cells
/// as fenced code blocks labelled with the kernel language, raw cells as-is.
/// Outputs are not rendered.
pub fn render(converter: &Converter, bytes: &[u8]) -> Result<String, serde_json::Error> {
    let notebook: Notebook = serde_json::from_slice(bytes)?;
    let language = notebook.metadata.language_info
        .map(|info| info.name)
        .unwrap_or_default();

    let mut output = String::new();
    for cell in notebook.cells {
        let source = cell.source.into_string();
        match cell.cell_type.as_str() {
            "markdown" => output.push_str(&converter.markdown(&source)),
            "code" => {
                let label = CowStr::from(language.as_str());
                html::push_html(&mut output, [
                    Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(label))),
                    Event::Text(source.into()),
                    Event::End(TagEnd::CodeBlock),
                ].into_iter());
            }
            _ => output.push_str(&source),
        }
    }

    Ok(output)
}
