use epub::doc::EpubDoc;
use regex::{Captures, Regex};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::document::{DocumentMetadata, Page, PageRange};
use crate::error::{DocError, Result};
use crate::utils::text_processor::{cached_regex, collapse_whitespace};

/// Spine entries of an EPUB, read in reading order one chapter at a time.
pub struct EpubChapters {
    doc: EpubDoc<BufReader<File>>,
    next: usize,
    last: usize,
}

impl EpubChapters {
    /// Open an EPUB and position the reader at the start of `range`.
    pub fn open(path: &Path, range: Option<PageRange>) -> Result<(Self, DocumentMetadata)> {
        info!("Opening EPUB: {:?}", path);

        let doc = EpubDoc::new(path).map_err(|e| DocError::Document {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let metadata = DocumentMetadata {
            title: doc.mdata("title").filter(|t| !t.trim().is_empty()),
            author: doc.mdata("creator").filter(|a| !a.trim().is_empty()),
        };
        info!(
            "EPUB: {} by {} ({} spine entries)",
            metadata.title.as_deref().unwrap_or("Unknown"),
            metadata.author.as_deref().unwrap_or("Unknown"),
            doc.spine.len()
        );

        let range = PageRange::resolve(range, doc.spine.len())?;
        Ok((
            Self {
                doc,
                next: range.start,
                last: range.end,
            },
            metadata,
        ))
    }

    pub fn range(&self) -> PageRange {
        PageRange {
            start: self.next,
            end: self.last,
        }
    }
}

impl Iterator for EpubChapters {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        if self.next > self.last {
            return None;
        }
        let ordinal = self.next;
        self.next += 1;

        self.doc.set_current_page(ordinal - 1);
        let page = match self.doc.get_current_str() {
            Some((html, _mime)) => Page::text(ordinal, chapter_text(&html, ordinal)),
            None => {
                warn!("Spine entry {} could not be read", ordinal);
                Page::unavailable(ordinal, format!("spine entry {} is unreadable", ordinal))
            }
        };
        Some(page)
    }
}

/// Text of one spine entry, opened by a level-2 heading so every chapter
/// starts a split boundary. A leading `#` heading is demoted to `##`; an
/// entry without a leading heading gets `## Chapter N`.
pub fn chapter_text(html: &str, ordinal: usize) -> String {
    let text = html_to_text(html);
    let first = text.lines().next().unwrap_or("");

    if first.starts_with("## ") {
        text
    } else if first.starts_with("# ") {
        format!("#{}", text)
    } else if text.is_empty() {
        format!("## Chapter {}", ordinal)
    } else {
        format!("## Chapter {}\n\n{}", ordinal, text)
    }
}

/// Convert chapter XHTML to plain text that keeps its structure: headings
/// become ATX headings, list items become `- ` lines and block elements are
/// separated by blank lines. Script, style and head content is dropped.
pub fn html_to_text(html: &str) -> String {
    static HIDDEN: OnceLock<Regex> = OnceLock::new();
    static HEADING: OnceLock<Regex> = OnceLock::new();
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    static LIST_ITEM_END: OnceLock<Regex> = OnceLock::new();
    static LINE_BREAK: OnceLock<Regex> = OnceLock::new();
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    static DANGLING_BULLET: OnceLock<Regex> = OnceLock::new();
    static NEWLINES: OnceLock<Regex> = OnceLock::new();

    let text = cached_regex(
        &HIDDEN,
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>",
    )
    .replace_all(html, "");

    let text = cached_regex(&HEADING, r"(?is)<h([1-6])\b[^>]*>(.*?)</h[1-6]\s*>").replace_all(
        &text,
        |caps: &Captures| {
            let level: usize = caps[1].parse().unwrap_or(1);
            let inner = strip_tags(&caps[2]);
            if inner.is_empty() {
                "\n\n".to_string()
            } else {
                format!("\n\n{} {}\n\n", "#".repeat(level), inner)
            }
        },
    );

    let text = cached_regex(&LIST_ITEM, r"(?i)<li\b[^>]*>").replace_all(&text, "\n- ");
    let text = cached_regex(&LIST_ITEM_END, r"(?i)</li\s*>").replace_all(&text, "");
    let text = cached_regex(&LINE_BREAK, r"(?i)<br\s*/?>").replace_all(&text, "\n");
    let text = cached_regex(
        &BLOCK,
        r"(?i)</?(?:p|div|ul|ol|blockquote|section|article|table|tr|pre|hr|body)\b[^>]*>",
    )
    .replace_all(&text, "\n\n");
    let text = cached_regex(&TAG, r"<[^>]*>").replace_all(&text, "");
    let text = decode_entities(&text);

    let text = text
        .lines()
        .map(collapse_whitespace)
        .collect::<Vec<_>>()
        .join("\n");

    let text = cached_regex(&DANGLING_BULLET, r"(?m)^-\n+").replace_all(&text, "- ");
    let text = cached_regex(&NEWLINES, r"\n{3,}").replace_all(&text, "\n\n");

    text.trim().to_string()
}

fn strip_tags(fragment: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let text = cached_regex(&TAG, r"<[^>]*>").replace_all(fragment, " ");
    collapse_whitespace(&decode_entities(&text))
}

fn decode_entities(text: &str) -> String {
    static ENTITY: OnceLock<Regex> = OnceLock::new();

    cached_regex(&ENTITY, r"&(#[xX][0-9a-fA-F]+|#\d+|[a-zA-Z]+);")
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                "mdash" => Some('\u{2014}'),
                "ndash" => Some('\u{2013}'),
                "hellip" => Some('\u{2026}'),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => {
                    name[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Minimal EPUB 2 package with one XHTML document per chapter body.
#[cfg(test)]
pub(crate) fn write_test_epub(path: &Path, title: &str, author: &str, chapters: &[&str]) {
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    let manifest: String = (1..=chapters.len())
        .map(|n| {
            format!(
                "<item id=\"ch{n}\" href=\"ch{n}.xhtml\" media-type=\"application/xhtml+xml\"/>"
            )
        })
        .collect();
    let spine: String = (1..=chapters.len())
        .map(|n| format!("<itemref idref=\"ch{n}\"/>"))
        .collect();
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="book-id">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
<dc:title>{title}</dc:title>
<dc:creator>{author}</dc:creator>
<dc:identifier id="book-id">doc2md-test</dc:identifier>
<dc:language>en</dc:language>
</metadata>
<manifest>{manifest}</manifest>
<spine>{spine}</spine>
</package>"#
    );
    let container = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
<rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    let mut files = vec![
        ("mimetype".to_string(), "application/epub+zip".to_string()),
        ("META-INF/container.xml".to_string(), container.to_string()),
        ("OEBPS/content.opf".to_string(), opf),
    ];
    for (idx, body) in chapters.iter().enumerate() {
        files.push((
            format!("OEBPS/ch{}.xhtml", idx + 1),
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>ch</title></head>\
                 <body>{}</body></html>",
                body
            ),
        ));
    }

    let mut zip = zip::ZipWriter::new(File::create(path).expect("create test epub"));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in files {
        zip.start_file(name, options).expect("start epub entry");
        zip.write_all(content.as_bytes()).expect("write epub entry");
    }
    zip.finish().expect("finish test epub");
}
