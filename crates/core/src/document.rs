//! Flat document model consumed by the weapon parser.
//!
//! A page is reduced to its headings, paragraphs and list items in document
//! order, plus the table of contents when the page has one. The parser never
//! sees HTML; [`Document::from_html`] is the only place that does.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

use crate::extractor::normalize_whitespace;

static EDIT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\[\s*edit[^\]]*\]\s*$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem(String),
}

/// One table-of-contents line. Level 1 mirrors a second-level heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub level: u8,
    pub text: String,
}

impl TocEntry {
    pub fn new(level: u8, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    blocks: Vec<Block>,
    toc: Option<Vec<TocEntry>>,
}

impl Document {
    pub fn heading(mut self, level: u8, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Heading {
            level,
            text: text.into(),
        });
        self
    }

    pub fn paragraph(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Paragraph(text.into()));
        self
    }

    pub fn list_item(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::ListItem(text.into()));
        self
    }

    pub fn with_toc(mut self, entries: Vec<TocEntry>) -> Self {
        self.toc = Some(entries);
        self
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn toc(&self) -> Option<&[TocEntry]> {
        self.toc.as_deref()
    }

    pub fn has_toc(&self) -> bool {
        self.toc.is_some()
    }

    pub fn heading_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::Heading { .. }))
            .count()
    }

    /// Text of the first paragraph after `index`, stopping at the next heading.
    pub fn following_paragraph(&self, index: usize) -> Option<&str> {
        self.blocks
            .iter()
            .skip(index + 1)
            .take_while(|b| !matches!(b, Block::Heading { .. }))
            .find_map(|b| match b {
                Block::Paragraph(text) if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
    }

    /// Build the model from a MediaWiki page.
    pub fn from_html(html: &str) -> Self {
        if html.trim().is_empty() {
            return Self::default();
        }
        let page = Html::parse_document(html);
        Self {
            blocks: collect_blocks(&page),
            toc: collect_toc(&page),
        }
    }
}

fn collect_blocks(page: &Html) -> Vec<Block> {
    let Ok(sel) = Selector::parse("h1, h2, h3, h4, h5, h6, p, li") else {
        return Vec::new();
    };
    let mut blocks = Vec::new();
    for el in page.select(&sel) {
        if inside_toc(&el) {
            continue;
        }
        let name = el.value().name();
        match name.as_bytes() {
            [b'h', digit] if digit.is_ascii_digit() => {
                let text = heading_text(&el);
                if !text.is_empty() {
                    blocks.push(Block::Heading {
                        level: digit - b'0',
                        text,
                    });
                }
            }
            b"p" => {
                let text = normalize_whitespace(&el.text().collect::<String>());
                if !text.is_empty() {
                    blocks.push(Block::Paragraph(text));
                }
            }
            _ => {
                let text = normalize_whitespace(&el.text().collect::<String>());
                if !text.is_empty() {
                    blocks.push(Block::ListItem(text));
                }
            }
        }
    }
    blocks
}

fn collect_toc(page: &Html) -> Option<Vec<TocEntry>> {
    let toc_sel = Selector::parse("#toc, .toc").ok()?;
    let entry_sel = Selector::parse(r#"li[class*="toclevel-"]"#).ok()?;
    let text_sel = Selector::parse(".toctext").ok()?;

    let toc = page.select(&toc_sel).next()?;
    let entries = toc
        .select(&entry_sel)
        .filter_map(|li| {
            let level = li
                .value()
                .classes()
                .find_map(|c| c.strip_prefix("toclevel-"))
                .and_then(|n| n.parse::<u8>().ok())?;
            let span = li.select(&text_sel).next()?;
            let text = normalize_whitespace(&span.text().collect::<String>());
            (!text.is_empty()).then(|| TocEntry::new(level, text))
        })
        .collect();
    Some(entries)
}

fn inside_toc(el: &ElementRef) -> bool {
    el.ancestors().filter_map(ElementRef::wrap).any(|a| {
        let v = a.value();
        v.id() == Some("toc") || v.classes().any(|c| c == "toc")
    })
}

/// Heading text without MediaWiki's "[edit]" links.
pub(crate) fn heading_text(el: &ElementRef) -> String {
    if let Ok(headline) = Selector::parse(".mw-headline")
        && let Some(span) = el.select(&headline).next()
    {
        return normalize_whitespace(&span.text().collect::<String>());
    }
    let raw = normalize_whitespace(&el.text().collect::<String>());
    EDIT_SUFFIX.replace(&raw, "").trim().to_string()
}
