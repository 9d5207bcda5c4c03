//! Text extraction for the supported source formats.
//!
//! Every loader yields a list of [`PageText`] units: one per PDF page, a
//! single page 1 for everything else.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser, TagEnd};
use regex::Regex;
use scraper::{Html, Node};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("unsupported file type: {0}")]
    Unsupported(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse PDF {path}: {source}")]
    Pdf {
        path: PathBuf,
        source: lopdf::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Html,
    Css,
    Markdown,
    PlainText,
}

impl SourceKind {
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "html" | "htm" => Some(Self::Html),
            "css" => Some(Self::Css),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::PlainText),
            _ => None,
        }
    }
}

#[must_use]
pub fn is_supported(path: &Path) -> bool {
    SourceKind::from_path(path).is_some()
}

/// Text of one page (1-based) of a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// Load the text of a source document, page by page.
pub fn load_pages(path: &Path) -> Result<Vec<PageText>, LoadError> {
    let kind = SourceKind::from_path(path).ok_or_else(|| LoadError::Unsupported(path.into()))?;

    if kind == SourceKind::Pdf {
        let doc = lopdf::Document::load(path).map_err(|source| LoadError::Pdf {
            path: path.into(),
            source,
        })?;
        return Ok(pdf_pages(&doc, path));
    }

    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.into(),
        source,
    })?;

    let text = match kind {
        SourceKind::Html => html_to_text(&raw),
        SourceKind::Markdown => markdown_to_text(&raw),
        SourceKind::Css | SourceKind::PlainText => raw,
        SourceKind::Pdf => unreachable!("handled above"),
    };

    Ok(vec![PageText { page: 1, text }])
}

/// Extract per-page text from a parsed PDF. Pages whose text cannot be
/// decoded are kept with empty text so their images can still be indexed.
pub fn pdf_pages(doc: &lopdf::Document, path: &Path) -> Vec<PageText> {
    doc.get_pages()
        .into_keys()
        .map(|page| {
            let text = doc.extract_text(&[page]).unwrap_or_else(|e| {
                warn!("No text extracted from {} page {page}: {e}", path.display());
                String::new()
            });
            PageText {
                page,
                text: normalize_whitespace(&text),
            }
        })
        .collect()
}

static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f\v]+").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

/// Collapse runs of spaces and blank lines, keeping paragraph breaks.
fn normalize_whitespace(text: &str) -> String {
    let text = INLINE_SPACE.replace_all(text, " ");
    BLANK_LINES.replace_all(text.trim(), "\n\n").into_owned()
}

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "nav", "aside", "li", "ul",
    "ol", "dl", "dt", "dd", "table", "tr", "td", "th", "pre", "blockquote", "h1", "h2", "h3",
    "h4", "h5", "h6", "br", "hr", "figcaption", "title",
];

/// Visible text of an HTML document; block elements become paragraphs.
pub fn html_to_text(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let mut out = String::new();
    let mut last_block = None;

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        // Nearest enclosing block decides where paragraph breaks go
        let mut block = None;
        let mut skipped = false;
        for ancestor in node.ancestors() {
            if let Some(element) = ancestor.value().as_element() {
                let name = element.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    skipped = true;
                    break;
                }
                if block.is_none() && BLOCK_ELEMENTS.contains(&name) {
                    block = Some(ancestor.id());
                }
            }
        }
        if skipped {
            continue;
        }

        if block != last_block {
            out.push_str("\n\n");
            last_block = block;
        }
        out.push_str(text);
    }

    normalize_whitespace(&out)
}

/// Plain text of a Markdown document, one paragraph per block.
pub fn markdown_to_text(raw: &str) -> String {
    let mut out = String::new();

    for event in Parser::new(raw) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::TableRow,
            ) => out.push_str("\n\n"),
            _ => {}
        }
    }

    normalize_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_source_kind_from_path() {
        assert_eq!(
            SourceKind::from_path(Path::new("a/Guide.PDF")),
            Some(SourceKind::Pdf)
        );
        assert_eq!(
            SourceKind::from_path(Path::new("index.htm")),
            Some(SourceKind::Html)
        );
        assert_eq!(SourceKind::from_path(Path::new("style.css")), Some(SourceKind::Css));
        assert_eq!(SourceKind::from_path(Path::new("image.png")), None);
        assert_eq!(SourceKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_html_to_text_drops_scripts_and_styles() {
        let html = r#"<html><head><title>Ignored</title><style>p { color: red; }</style></head>
            <body><h1>HTML Basics</h1><p>An <b>element</b> has tags.</p>
            <script>alert("x")</script><p>Attributes&nbsp;configure&amp;tweak.</p></body></html>"#;
        let text = html_to_text(html);

        assert!(text.starts_with("HTML Basics"));
        assert!(text.contains("An element has tags."));
        assert!(text.contains("configure&tweak"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("Ignored"));
        assert!(text.contains("\n\n"), "blocks become paragraphs: {text:?}");
    }

    #[test]
    fn test_markdown_to_text() {
        let md = "# Selectors\n\nA *class* selector uses `.name`.\n\n- item one\n- item two\n";
        let text = markdown_to_text(md);
        assert_eq!(
            text,
            "Selectors\n\nA class selector uses .name.\n\nitem one\n\nitem two"
        );
    }

    #[test]
    fn test_load_pages_plain_formats() {
        let dir = tempdir().unwrap();
        let css = dir.path().join("site.css");
        fs::write(&css, "body { margin: 0; }").unwrap();

        let pages = load_pages(&css).unwrap();
        assert_eq!(
            pages,
            vec![PageText {
                page: 1,
                text: "body { margin: 0; }".into()
            }]
        );
    }

    #[test]
    fn test_load_pages_errors() {
        assert!(matches!(
            load_pages(Path::new("photo.jpg")),
            Err(LoadError::Unsupported(_))
        ));
        assert!(matches!(
            load_pages(Path::new("/nonexistent/page.html")),
            Err(LoadError::Io { .. })
        ));

        let dir = tempdir().unwrap();
        let bogus = dir.path().join("broken.pdf");
        fs::write(&bogus, "not a pdf").unwrap();
        assert!(matches!(load_pages(&bogus), Err(LoadError::Pdf { .. })));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  a \t b\n\n\n\nc  \n \n d "),
            "a b\n\nc \n\n d"
        );
    }
}
