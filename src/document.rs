//! Source documents and the lazy page streams read from them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::error::{DocError, Result};
use crate::utils::epub_parser::EpubChapters;
use crate::utils::pdf_parser::{self, PdfPages};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Epub,
}

impl DocumentKind {
    /// Detect the document kind from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "epub" => Ok(DocumentKind::Epub),
            _ => Err(DocError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pdf => write!(f, "PDF"),
            DocumentKind::Epub => write!(f, "EPUB"),
        }
    }
}

/// Inclusive, 1-based range of pages (PDF) or spine entries (EPUB).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start == 0 || start > end {
            return Err(DocError::InvalidPageRange(format!("{}:{}", start, end)));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Resolve an optional range against the document's page count.
    pub fn resolve(range: Option<PageRange>, available: usize) -> Result<PageRange> {
        match range {
            Some(range) if range.end > available => Err(DocError::PageRange {
                range: range.to_string(),
                available,
            }),
            Some(range) => Ok(range),
            None if available == 0 => Err(DocError::PageRange {
                range: "1:1".to_string(),
                available,
            }),
            None => Ok(PageRange {
                start: 1,
                end: available,
            }),
        }
    }
}

impl FromStr for PageRange {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DocError::InvalidPageRange(s.to_string());
        let (start, end) = s.split_once(':').ok_or_else(invalid)?;
        let start = start.trim().parse::<usize>().map_err(|_| invalid())?;
        let end = end.trim().parse::<usize>().map_err(|_| invalid())?;
        PageRange::new(start, end).map_err(|_| invalid())
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Title and author, either embedded in the document or supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

impl DocumentMetadata {
    /// Fill missing fields from `fallback`.
    pub fn or(self, fallback: DocumentMetadata) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.or(fallback.title),
            author: self.author.or(fallback.author),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    /// Rendered page image awaiting OCR.
    Image(PathBuf),
    /// Text read directly from the document.
    Text(String),
    /// The page could not be rendered or read.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub ordinal: usize,
    pub content: PageContent,
}

impl Page {
    pub fn image(ordinal: usize, path: PathBuf) -> Self {
        Self {
            ordinal,
            content: PageContent::Image(path),
        }
    }

    pub fn text(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            content: PageContent::Text(text.into()),
        }
    }

    pub fn unavailable(ordinal: usize, reason: impl Into<String>) -> Self {
        Self {
            ordinal,
            content: PageContent::Unavailable(reason.into()),
        }
    }
}

/// How PDF pages are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Render each page to an image for OCR.
    Rasterize { dpi: u32 },
    /// Use the text layer embedded in the PDF.
    TextLayer,
}

#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    kind: DocumentKind,
    range: Option<PageRange>,
}

impl Document {
    pub fn open(path: &Path, range: Option<PageRange>) -> Result<Self> {
        let kind = DocumentKind::from_path(path)?;
        if !path.is_file() {
            return Err(DocError::Document {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            range,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// True when pages come out as images and need OCR.
    pub fn needs_ocr(&self, mode: ReadMode) -> bool {
        self.kind == DocumentKind::Pdf && matches!(mode, ReadMode::Rasterize { .. })
    }

    /// Start a single forward pass over the requested pages.
    ///
    /// Fails with [`DocError::PageRange`] when the range runs past the end
    /// of the document.
    pub fn pages(&self, mode: ReadMode) -> Result<PageStream> {
        let stream = match (self.kind, mode) {
            (DocumentKind::Pdf, ReadMode::Rasterize { dpi }) => {
                let available = pdf_parser::page_count(&self.path)?;
                let range = PageRange::resolve(self.range, available)?;
                PageStream {
                    source: PageSource::Pdf(PdfPages::new(&self.path, range, dpi)?),
                    metadata: DocumentMetadata::default(),
                    range,
                }
            }
            (DocumentKind::Pdf, ReadMode::TextLayer) => {
                let pages = pdf_parser::extract_text_pages(&self.path)?;
                let range = PageRange::resolve(self.range, pages.len())?;
                let selected: Vec<Page> = pages
                    .into_iter()
                    .enumerate()
                    .map(|(idx, text)| Page::text(idx + 1, text))
                    .skip(range.start - 1)
                    .take(range.len())
                    .collect();
                PageStream {
                    source: PageSource::Buffered(selected.into_iter()),
                    metadata: DocumentMetadata::default(),
                    range,
                }
            }
            (DocumentKind::Epub, _) => {
                let (chapters, metadata) = EpubChapters::open(&self.path, self.range)?;
                let range = chapters.range();
                PageStream {
                    source: PageSource::Epub(Box::new(chapters)),
                    metadata,
                    range,
                }
            }
        };

        info!(
            "Reading {} pages {} of {:?}",
            self.kind, stream.range, self.path
        );
        Ok(stream)
    }
}

enum PageSource {
    Pdf(PdfPages),
    Buffered(std::vec::IntoIter<Page>),
    Epub(Box<EpubChapters>),
}

/// Lazy, finite, non-restartable sequence of pages in ordinal order.
pub struct PageStream {
    source: PageSource,
    metadata: DocumentMetadata,
    range: PageRange,
}

impl PageStream {
    /// Metadata embedded in the document (EPUB only).
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn range(&self) -> PageRange {
        self.range
    }
}

impl Iterator for PageStream {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        match &mut self.source {
            PageSource::Pdf(pages) => pages.next(),
            PageSource::Buffered(pages) => pages.next(),
            PageSource::Epub(chapters) => chapters.next(),
        }
    }
}
