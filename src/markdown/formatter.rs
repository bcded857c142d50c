use regex::Regex;
use std::sync::OnceLock;

use super::{ListMarker, MarkdownDocument, Section, Segment, SegmentKind};
use crate::document::DocumentMetadata;
use crate::utils::ocr::ExtractedText;
use crate::utils::text_processor::{
    cached_regex, clean_text, collapse_whitespace, join_wrapped_lines, split_blocks,
};

const TOC_HEADING: &str = "Table of Contents";
const TOC_PLACEHOLDER: &str = "*[TOC content omitted in conversion]*";
/// How far past the contents heading to look for dotted-leader entries.
const TOC_SCAN_LIMIT: usize = 50;
const TOC_MIN_ENTRIES: usize = 3;


fn atx_heading(line: &str) -> Option<(u8, String)> {
    static ATX: OnceLock<Regex> = OnceLock::new();
    let caps = cached_regex(&ATX, r"^(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").captures(line.trim())?;
    Some((caps[1].len() as u8, collapse_whitespace(&caps[2])))
}

fn list_item(line: &str) -> Option<(ListMarker, String)> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    let caps = cached_regex(&ITEM, r"^(?:([-*+•◦▪●])|(\d{1,3})[.)])[ \t]+(\S.*)$").captures(line.trim())?;
    let marker = match caps.get(2) {
        Some(n) => ListMarker::Ordered(n.as_str().parse().unwrap_or(1)),
        None => ListMarker::Bullet,
    };
    Some((marker, collapse_whitespace(&caps[3])))
}

fn is_toc_entry(text: &str) -> bool {
    static LEADER: OnceLock<Regex> = OnceLock::new();
    cached_regex(&LEADER, r".*\.{2,}.*\d+").is_match(text)
}

fn is_toc_heading(text: &str) -> bool {
    static TOC: OnceLock<Regex> = OnceLock::new();
    cached_regex(&TOC, r"(?i)^\s*(?:table\s+of\s+contents|contents|toc)\s*$").is_match(text)
}

fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase)
}

fn is_chapter_line(text: &str) -> bool {
    static CHAPTER: OnceLock<Regex> = OnceLock::new();
    cached_regex(&CHAPTER, r"(?i)^(?:chapter|section|part)\s+(?:\d+|[ivxlcdm]+)\b").is_match(text)
}

/// Heading level for a line of OCR text, if it looks like one.
///
/// - all-caps lines of 6..=80 characters are level 2;
/// - `Chapter 3`, `Section IV`, `Part 2` lines are level 3;
/// - short numbered titles (`1. Introduction`, `2.3 Scope`) are level 3,
///   or 4 when they carry a sub-number.
pub fn detect_heading(text: &str) -> Option<u8> {
    static NUMBERED: OnceLock<Regex> = OnceLock::new();

    let text = text.trim();
    let len = text.chars().count();
    if len < 3 {
        return None;
    }

    if is_all_caps(text) && len > 5 && len <= 80 {
        return Some(2);
    }
    if is_chapter_line(text) && len <= 80 {
        return Some(3);
    }

    let numbered = cached_regex(&NUMBERED, r"^\d+((?:\.\d+)*)(\.)?\s+\p{Lu}");
    if let Some(caps) = numbered.captures(text) {
        let sub_numbered = !caps[1].is_empty();
        let dotted = caps.get(2).is_some();
        let terminal = text.ends_with(['.', '!', '?', ',', ';', ':']);
        if (sub_numbered || dotted) && len <= 60 && !terminal {
            return Some(if sub_numbered { 4 } else { 3 });
        }
    }

    None
}

/// Infers Markdown structure from raw extracted text.
///
/// The rules are heuristics with no hidden state: the same input always
/// gives the same document.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownFormatter {
    detect_toc: bool,
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self { detect_toc: true }
    }
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave tables of contents in place instead of collapsing them.
    pub fn keep_toc(mut self) -> Self {
        self.detect_toc = false;
        self
    }

    /// Format a single block of raw text as one section.
    pub fn format(&self, raw_text: &str, metadata: &DocumentMetadata) -> MarkdownDocument {
        self.format_sections([(1, raw_text)], metadata)
    }

    /// Format extracted pages, one section per page in the given order.
    /// Failed pages become empty sections.
    pub fn format_pages(
        &self,
        pages: &[ExtractedText],
        metadata: &DocumentMetadata,
    ) -> MarkdownDocument {
        self.format_sections(
            pages.iter().map(|page| (page.ordinal, page.text.as_str())),
            metadata,
        )
    }

    fn format_sections<'a>(
        &self,
        pages: impl IntoIterator<Item = (usize, &'a str)>,
        metadata: &DocumentMetadata,
    ) -> MarkdownDocument {
        let mut doc = MarkdownDocument::new(metadata);

        for (ordinal, text) in pages {
            let cleaned = clean_text(text);
            let segments = split_blocks(&cleaned)
                .into_iter()
                .flat_map(classify_block)
                .collect();
            doc.sections.push(Section { ordinal, segments });
        }

        if self.detect_toc {
            collapse_toc(&mut doc.sections);
        }
        doc
    }
}

fn classify_block(block: &str) -> Vec<Segment> {
    let lines: Vec<&str> = block
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect();
    let Some(first) = lines.first() else {
        return Vec::new();
    };

    // Headings already in Markdown form keep their level.
    if let Some((level, text)) = atx_heading(first) {
        let mut segments = vec![Segment::heading(level, text)];
        segments.extend(classify_block(&lines[1..].join("\n")));
        return segments;
    }

    if lines.len() > 1 && lines.iter().all(|line| list_item(line).is_some()) {
        return lines
            .iter()
            .filter_map(|line| list_item(line))
            .map(|(marker, text)| Segment::list_item(marker, text))
            .collect();
    }

    if lines.len() > 1 && lines.iter().all(|line| is_toc_entry(line)) {
        return lines
            .iter()
            .map(|line| Segment::paragraph(collapse_whitespace(line)))
            .collect();
    }

    // A title line set directly above its text.
    let first_text = collapse_whitespace(first);
    if lines.len() > 1 && (is_all_caps(&first_text) || is_chapter_line(&first_text)) {
        if let Some(level) = detect_heading(&first_text) {
            let mut segments = vec![Segment::heading(level, first_text)];
            segments.extend(classify_block(&lines[1..].join("\n")));
            return segments;
        }
    }

    let joined = join_wrapped_lines(&lines.join("\n"));
    if let Some(level) = detect_heading(&joined) {
        vec![Segment::heading(level, joined)]
    } else if let Some((marker, text)) = list_item(&joined) {
        vec![Segment::list_item(marker, text)]
    } else {
        vec![Segment::paragraph(joined)]
    }
}

/// Replace a table of contents (a "Contents" line followed by at least three
/// dotted-leader entries) with a heading and a short note.
fn collapse_toc(sections: &mut [Section]) {
    let positions: Vec<(usize, usize)> = sections
        .iter()
        .enumerate()
        .flat_map(|(s, section)| (0..section.segments.len()).map(move |i| (s, i)))
        .collect();
    let text_at = |idx: usize| {
        let (s, i) = positions[idx];
        sections[s].segments[i].text.as_str()
    };

    let Some(start) = (0..positions.len()).find(|&idx| is_toc_heading(text_at(idx))) else {
        return;
    };

    let scan_end = (start + TOC_SCAN_LIMIT).min(positions.len());
    let mut consecutive = 0;
    let mut end = None;
    for idx in start + 1..scan_end {
        if is_toc_entry(text_at(idx)) {
            consecutive += 1;
        } else if consecutive >= TOC_MIN_ENTRIES {
            end = Some(idx - 1);
            break;
        } else {
            consecutive = 0;
        }
    }
    if end.is_none() && consecutive >= TOC_MIN_ENTRIES && scan_end == positions.len() {
        end = Some(scan_end - 1);
    }
    let Some(end) = end else {
        return;
    };

    let (start_section, start_index) = positions[start];
    let dropped: Vec<(usize, usize)> = positions[start + 1..=end].to_vec();

    for (s, section) in sections.iter_mut().enumerate() {
        let mut kept = Vec::with_capacity(section.segments.len());
        for (i, segment) in section.segments.drain(..).enumerate() {
            if (s, i) == (start_section, start_index) {
                kept.push(Segment::heading(2, TOC_HEADING));
                kept.push(Segment::paragraph(TOC_PLACEHOLDER));
            } else if !dropped.contains(&(s, i)) {
                kept.push(segment);
            }
        }
        section.segments = kept;
    }
}

/// Count of segments by kind, handy for logging.
pub fn describe(doc: &MarkdownDocument) -> String {
    let (mut headings, mut paragraphs, mut items, mut raw) = (0, 0, 0, 0);
    for segment in doc.segments() {
        match segment.kind {
            SegmentKind::Heading(_) => headings += 1,
            SegmentKind::Paragraph => paragraphs += 1,
            SegmentKind::ListItem(_) => items += 1,
            SegmentKind::Raw => raw += 1,
        }
    }
    format!(
        "{} headings, {} paragraphs, {} list items, {} raw blocks",
        headings, paragraphs, items, raw
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_metadata() -> DocumentMetadata {
        DocumentMetadata::default()
    }

    #[test]
    fn test_detect_heading() {
        assert_eq!(detect_heading("INTRODUCTION"), Some(2));
        assert_eq!(detect_heading("Chapter 1: Introduction"), Some(3));
        assert_eq!(detect_heading("PART IV"), Some(2));
        assert_eq!(detect_heading("Section iv overview"), Some(3));
        assert_eq!(detect_heading("1. Getting Started"), Some(3));
        assert_eq!(detect_heading("2.3 Scope of Work"), Some(4));
        assert_eq!(detect_heading("1. The first thing to do is to read the manual."), None);
        assert_eq!(detect_heading("This is a normal paragraph with some text."), None);
        assert_eq!(detect_heading("OK"), None);
        assert_eq!(detect_heading("第一章 总论"), None);
    }

    #[test]
    fn test_format_classifies_blocks() {
        let raw = "CHAPTER ONE\n\nIt was a bright cold day in April, and the\nclocks were strik-\ning thirteen.\n\n- bread\n- milk\n\n1. Getting Started\n";
        let doc = MarkdownFormatter::new().format(raw, &no_metadata());
        let segments: Vec<&Segment> = doc.segments().collect();

        assert_eq!(segments[0], &Segment::heading(2, "CHAPTER ONE"));
        assert_eq!(
            segments[1],
            &Segment::paragraph(
                "It was a bright cold day in April, and the clocks were striking thirteen."
            )
        );
        assert_eq!(segments[2], &Segment::list_item(ListMarker::Bullet, "bread"));
        assert_eq!(segments[3], &Segment::list_item(ListMarker::Bullet, "milk"));
        assert_eq!(segments[4], &Segment::heading(3, "1. Getting Started"));
    }

    #[test]
    fn test_heading_split_from_following_text() {
        let raw = "Chapter 2\nThe morning came slowly.";
        let doc = MarkdownFormatter::new().format(raw, &no_metadata());
        assert_eq!(
            doc.render(),
            "### Chapter 2\n\nThe morning came slowly.\n"
        );
    }

    #[test]
    fn test_existing_markdown_headings_kept() {
        let raw = "## Already Marked\n\nBody.";
        let doc = MarkdownFormatter::new().format(raw, &no_metadata());
        assert_eq!(doc.render(), "## Already Marked\n\nBody.\n");
    }

    #[test]
    fn test_metadata_placement() {
        let metadata = DocumentMetadata {
            title: Some("The Book".into()),
            author: Some("A. Writer".into()),
        };
        let rendered = MarkdownFormatter::new()
            .format("Some body text here.", &metadata)
            .render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "# The Book");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "*By A. Writer*");
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let raw = "TABLE OF THINGS\n\nSome text\nwrapped here.\n\n* a\n* b\n\n2.1 Details\n\nEnd.";
        let formatter = MarkdownFormatter::new();
        let first = formatter.format(raw, &no_metadata()).render();
        let second = formatter.format(raw, &no_metadata()).render();
        assert_eq!(first, second);
    }

    #[test]
    fn test_table_of_contents_collapsed() {
        let raw = "Contents\n\nIntroduction ........ 1\nThe Journey ........ 15\nHome Again ........ 42\n\nINTRODUCTION\n\nThe story begins.";
        let doc = MarkdownFormatter::new().format(raw, &no_metadata());
        assert_eq!(
            doc.render(),
            "## Table of Contents\n\n*[TOC content omitted in conversion]*\n\n## INTRODUCTION\n\nThe story begins.\n"
        );
    }

    #[test]
    fn test_toc_kept_when_requested() {
        let raw = "Contents\n\nA ..... 1\nB ..... 2\nC ..... 3\n\nBody.";
        let doc = MarkdownFormatter::new().keep_toc().format(raw, &no_metadata());
        assert!(doc.render().contains("B ..... 2"));
    }

    #[test]
    fn test_format_pages_keeps_empty_sections() {
        let pages = vec![
            ExtractedText::success(1, "First page."),
            ExtractedText::failed(2, "ocr error"),
            ExtractedText::success(3, "Third page."),
        ];
        let doc = MarkdownFormatter::new().format_pages(&pages, &no_metadata());
        let ordinals: Vec<usize> = doc.sections.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert!(doc.sections[1].is_empty());
        assert_eq!(doc.render(), "First page.\n\nThird page.\n");
    }

    #[test]
    fn test_describe_counts_kinds() {
        let doc = MarkdownFormatter::new().format("HEADING LINE\n\n- a\n- b\n\ntext", &no_metadata());
        assert_eq!(describe(&doc), "1 headings, 1 paragraphs, 2 list items, 0 raw blocks");
    }
}
