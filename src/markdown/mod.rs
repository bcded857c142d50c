//! Markdown document model: classified segments grouped by source page.

pub mod formatter;

pub use formatter::MarkdownFormatter;

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::document::DocumentMetadata;
use crate::error::{DocError, Result};
use crate::utils::text_processor::cached_regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMarker {
    Bullet,
    Ordered(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// ATX heading, level 1..=6.
    Heading(u8),
    Paragraph,
    ListItem(ListMarker),
    /// Emitted verbatim (code fences, tables, quotes).
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

impl Segment {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Heading(level.clamp(1, 6)),
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Paragraph,
            text: text.into(),
        }
    }

    pub fn list_item(marker: ListMarker, text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::ListItem(marker),
            text: text.into(),
        }
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Raw,
            text: text.into(),
        }
    }

    pub fn render(&self) -> String {
        match self.kind {
            SegmentKind::Heading(level) => format!("{} {}", "#".repeat(level as usize), self.text),
            SegmentKind::Paragraph | SegmentKind::Raw => self.text.clone(),
            SegmentKind::ListItem(ListMarker::Bullet) => format!("- {}", self.text),
            SegmentKind::ListItem(ListMarker::Ordered(n)) => format!("{}. {}", n, self.text),
        }
    }

    fn is_list_item(&self) -> bool {
        matches!(self.kind, SegmentKind::ListItem(_))
    }
}

/// The segments produced from one source page (or chapter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub ordinal: usize,
    pub segments: Vec<Segment>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkdownDocument {
    pub title: Option<String>,
    pub author: Option<String>,
    pub sections: Vec<Section>,
}

impl MarkdownDocument {
    pub fn new(metadata: &DocumentMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            author: metadata.author.clone(),
            sections: Vec::new(),
        }
    }

    /// All segments in document order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.sections.iter().flat_map(|section| section.segments.iter())
    }

    /// Render to Markdown text. Blocks are separated by one blank line,
    /// consecutive list items by a single newline.
    pub fn render(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();

        if let Some(title) = &self.title {
            blocks.push(format!("# {}", title));
        }
        if let Some(author) = &self.author {
            blocks.push(format!("*By {}*", author));
        }

        let mut previous_was_item = false;
        for segment in self.segments() {
            let rendered = segment.render();
            match blocks.last_mut() {
                Some(last) if previous_was_item && segment.is_list_item() => {
                    last.push('\n');
                    last.push_str(&rendered);
                }
                _ => blocks.push(rendered),
            }
            previous_was_item = segment.is_list_item();
        }

        if blocks.is_empty() {
            return String::new();
        }
        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }

    /// Segment text joined by blank lines, without Markdown markers.
    pub fn plain_text(&self) -> String {
        self.title
            .iter()
            .chain(self.author.iter())
            .map(String::as_str)
            .chain(self.segments().map(|segment| segment.text.as_str()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// True when the document contains any letter or digit.
    pub fn has_text(&self) -> bool {
        self.plain_text().chars().any(char::is_alphanumeric)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(DocError::io(parent))?;
            }
        }
        fs::write(path, self.render()).map_err(DocError::io(path))
    }

    /// Read existing Markdown back into segments, as one section.
    ///
    /// Fenced code blocks, block quotes and tables are kept as raw
    /// segments; everything else is split into headings, list items and
    /// paragraphs.
    pub fn parse(markdown: &str) -> Self {
        static ATX: OnceLock<Regex> = OnceLock::new();
        static BULLET: OnceLock<Regex> = OnceLock::new();
        static ORDERED: OnceLock<Regex> = OnceLock::new();

        let atx = cached_regex(&ATX, r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+)?[ \t]*$");
        let bullet = cached_regex(&BULLET, r"^[ \t]*[-*+][ \t]+(.*)$");
        let ordered = cached_regex(&ORDERED, r"^[ \t]*(\d{1,9})[.)][ \t]+(.*)$");

        let mut segments = Vec::new();
        let mut paragraph: Vec<&str> = Vec::new();
        let mut raw: Vec<&str> = Vec::new();
        let mut fence: Option<&str> = None;

        fn flush(buffer: &mut Vec<&str>, segments: &mut Vec<Segment>, raw: bool) {
            if !buffer.is_empty() {
                let text = buffer.join("\n");
                segments.push(if raw {
                    Segment::raw(text)
                } else {
                    Segment::paragraph(text)
                });
                buffer.clear();
            }
        }

        for line in markdown.lines() {
            let trimmed = line.trim_start();

            if let Some(marker) = fence {
                raw.push(line);
                if trimmed.starts_with(marker) {
                    fence = None;
                    flush(&mut raw, &mut segments, true);
                }
                continue;
            }

            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                flush(&mut paragraph, &mut segments, false);
                flush(&mut raw, &mut segments, true);
                fence = Some(&trimmed[..3]);
                raw.push(line);
                continue;
            }

            if trimmed.is_empty() {
                flush(&mut paragraph, &mut segments, false);
                flush(&mut raw, &mut segments, true);
                continue;
            }

            if trimmed.starts_with('>') || trimmed.starts_with('|') {
                flush(&mut paragraph, &mut segments, false);
                raw.push(line);
                continue;
            }
            flush(&mut raw, &mut segments, true);

            if let Some(caps) = atx.captures(line) {
                flush(&mut paragraph, &mut segments, false);
                segments.push(Segment::heading(caps[1].len() as u8, caps[2].trim()));
            } else if let Some(caps) = bullet.captures(line) {
                flush(&mut paragraph, &mut segments, false);
                segments.push(Segment::list_item(ListMarker::Bullet, caps[1].trim()));
            } else if let Some(caps) = ordered.captures(line) {
                flush(&mut paragraph, &mut segments, false);
                let n = caps[1].parse().unwrap_or(1);
                segments.push(Segment::list_item(ListMarker::Ordered(n), caps[2].trim()));
            } else if paragraph.is_empty() && line.starts_with([' ', '\t']) {
                // Indented continuation of the previous list item.
                match segments.last_mut() {
                    Some(last) if last.is_list_item() => {
                        last.text.push(' ');
                        last.text.push_str(trimmed.trim_end());
                    }
                    _ => paragraph.push(line.trim_end()),
                }
            } else {
                paragraph.push(line.trim_end());
            }
        }

        flush(&mut paragraph, &mut segments, false);
        flush(&mut raw, &mut segments, true);

        Self {
            title: None,
            author: None,
            sections: vec![Section {
                ordinal: 1,
                segments,
            }],
        }
    }
}
