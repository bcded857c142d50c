use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ConvertConfig;
use crate::document::{Document, DocumentMetadata, Page, PageRange, ReadMode};
use crate::error::{DocError, Result};
use crate::markdown::formatter::describe;
use crate::markdown::{MarkdownDocument, MarkdownFormatter};
use crate::utils::ocr::{ExtractedText, PassthroughExtractor, TesseractExtractor, TextExtractor};

/// Per-run conversion settings.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub dpi: u32,
    pub language: Option<String>,
    pub page_range: Option<PageRange>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub preprocess: bool,
    pub text_layer: bool,
    /// Write the raw extracted text instead of Markdown.
    pub skip_markdown: bool,
    /// Also write the raw extracted text next to the Markdown output.
    pub keep_text: bool,
    /// Leave a detected table of contents in the output.
    pub keep_toc: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from_config(&ConvertConfig::default())
    }
}

impl ConvertOptions {
    pub fn from_config(config: &ConvertConfig) -> Self {
        Self {
            dpi: config.dpi,
            language: config.language.clone(),
            page_range: None,
            title: None,
            author: None,
            preprocess: config.preprocess,
            text_layer: config.text_layer,
            skip_markdown: false,
            keep_text: false,
            keep_toc: false,
        }
    }

    pub fn formatter(&self) -> MarkdownFormatter {
        if self.keep_toc {
            MarkdownFormatter::new().keep_toc()
        } else {
            MarkdownFormatter::new()
        }
    }

    pub fn read_mode(&self) -> ReadMode {
        if self.text_layer {
            ReadMode::TextLayer
        } else {
            ReadMode::Rasterize { dpi: self.dpi }
        }
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            title: self.title.clone(),
            author: self.author.clone(),
        }
    }
}

/// Result of one conversion: every page's extracted text, in source order,
/// and the formatted document built from it.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub pages: Vec<ExtractedText>,
    pub markdown: MarkdownDocument,
}

impl Conversion {
    pub fn failed_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|page| !page.is_success())
            .map(|page| page.ordinal)
            .collect()
    }

    /// Extracted text of all pages separated by blank lines.
    pub fn raw_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Write the run's output files, overwriting existing ones. Returns the
    /// paths written.
    pub fn write(&self, output: &Path, options: &ConvertOptions) -> Result<Vec<PathBuf>> {
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(DocError::io(parent))?;
            }
        }

        if options.skip_markdown {
            fs::write(output, self.raw_text()).map_err(DocError::io(output))?;
            info!("Text file saved to: {:?}", output);
            return Ok(vec![output.to_path_buf()]);
        }

        self.markdown.write(output)?;
        info!("Markdown saved to: {:?}", output);
        let mut written = vec![output.to_path_buf()];

        if options.keep_text {
            let text_path = output.with_extension("txt");
            fs::write(&text_path, self.raw_text()).map_err(DocError::io(&text_path))?;
            info!("Text file saved to: {:?}", text_path);
            written.push(text_path);
        }
        Ok(written)
    }
}

/// Document → pages → extracted text → Markdown.
pub struct ConversionPipeline<E: TextExtractor> {
    extractor: E,
    formatter: MarkdownFormatter,
}

impl<E: TextExtractor> ConversionPipeline<E> {
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            formatter: MarkdownFormatter::new(),
        }
    }

    pub fn with_formatter(mut self, formatter: MarkdownFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Convert a document. User-supplied title/author take precedence over
    /// metadata embedded in the document.
    pub fn convert(&self, document: &Document, options: &ConvertOptions) -> Result<Conversion> {
        info!("Processing document: {:?}", document.path());
        let pages = document.pages(options.read_mode())?;
        let metadata = options.metadata().or(pages.metadata().clone());
        Ok(self.convert_pages(pages, &metadata))
    }

    /// Extract and format pages one at a time, in the order given. Failed
    /// pages are logged and kept as empty entries.
    pub fn convert_pages(
        &self,
        pages: impl IntoIterator<Item = Page>,
        metadata: &DocumentMetadata,
    ) -> Conversion {
        let mut extracted: Vec<ExtractedText> = Vec::new();

        for page in pages {
            let ordinal = page.ordinal;
            let mut text = self.extractor.extract(page);
            debug_assert_eq!(text.ordinal, ordinal);
            text.ordinal = ordinal;

            match &text.failure {
                Some(reason) => warn!("Page {} produced no text: {}", ordinal, reason),
                None => info!("Page {}: {} characters", ordinal, text.text.len()),
            }
            extracted.push(text);
        }

        let markdown = self.formatter.format_pages(&extracted, metadata);
        let conversion = Conversion {
            pages: extracted,
            markdown,
        };

        let failed = conversion.failed_pages();
        if failed.is_empty() {
            info!("Converted {} pages", conversion.pages.len());
        } else {
            warn!(
                "Converted {} pages; {} failed: {:?}",
                conversion.pages.len(),
                failed.len(),
                failed
            );
        }
        info!("Markdown structure: {}", describe(&conversion.markdown));
        conversion
    }

    pub fn convert_to_file(
        &self,
        document: &Document,
        options: &ConvertOptions,
        output: &Path,
    ) -> Result<Conversion> {
        let conversion = self.convert(document, options)?;
        conversion.write(output, options)?;
        Ok(conversion)
    }
}

/// Open `input`, pick the extractor its pages need and write the result to
/// `output`. Tesseract is only required when pages are rasterized.
pub fn convert_file(input: &Path, output: &Path, options: &ConvertOptions) -> Result<Conversion> {
    let document = Document::open(input, options.page_range)?;
    if document.needs_ocr(options.read_mode()) {
        let extractor = TesseractExtractor::new(options.language.as_deref(), options.preprocess)?;
        ConversionPipeline::new(extractor)
            .with_formatter(options.formatter())
            .convert_to_file(&document, options, output)
    } else {
        ConversionPipeline::new(PassthroughExtractor)
            .with_formatter(options.formatter())
            .convert_to_file(&document, options, output)
    }
}

/// `<input stem>.md` (or `.txt` for raw text) in the current directory.
pub fn default_output_path(input: &Path, skip_markdown: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = if skip_markdown { "txt" } else { "md" };
    PathBuf::from(format!("{}.{}", stem, ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::ChapterSplitter;
    use crate::utils::epub_parser::write_test_epub;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Fails the listed pages and records the order pages arrive in.
    struct FlakyExtractor {
        failing: Vec<usize>,
        seen: RefCell<Vec<usize>>,
    }

    impl TextExtractor for FlakyExtractor {
        fn extract(&self, page: Page) -> ExtractedText {
            self.seen.borrow_mut().push(page.ordinal);
            if self.failing.contains(&page.ordinal) {
                ExtractedText::failed(page.ordinal, "engine timeout")
            } else {
                ExtractedText::success(page.ordinal, format!("Text of page {}.", page.ordinal))
            }
        }
    }

    fn ten_pages() -> Vec<Page> {
        (1..=10).map(|n| Page::text(n, format!("page {}", n))).collect()
    }

    #[test]
    fn test_failed_page_keeps_its_slot() {
        let pipeline = ConversionPipeline::new(FlakyExtractor {
            failing: vec![5],
            seen: RefCell::new(Vec::new()),
        });
        let conversion = pipeline.convert_pages(ten_pages(), &DocumentMetadata::default());

        assert_eq!(conversion.pages.len(), 10);
        assert_eq!(conversion.markdown.sections.len(), 10);
        let ordinals: Vec<usize> = conversion.markdown.sections.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, (1..=10).collect::<Vec<_>>());
        assert!(conversion.markdown.sections[4].is_empty());
        assert!(conversion.pages[4].text.is_empty());
        assert_eq!(conversion.failed_pages(), vec![5]);
        assert!(!conversion.markdown.sections[5].is_empty());
    }

    #[test]
    fn test_pages_processed_in_source_order() {
        let extractor = FlakyExtractor {
            failing: vec![],
            seen: RefCell::new(Vec::new()),
        };
        let pipeline = ConversionPipeline::new(extractor);
        let conversion = pipeline.convert_pages(ten_pages(), &DocumentMetadata::default());

        assert_eq!(*pipeline.extractor.seen.borrow(), (1..=10).collect::<Vec<_>>());
        let rendered = conversion.markdown.render();
        let first = rendered.find("page 1.").unwrap();
        let tenth = rendered.find("page 10.").unwrap();
        assert!(first < tenth);
    }

    #[test]
    fn test_user_metadata_rendered_first() {
        let pipeline = ConversionPipeline::new(PassthroughExtractor);
        let metadata = DocumentMetadata {
            title: Some("Field Notes".into()),
            author: Some("R. Observer".into()),
        };
        let conversion = pipeline.convert_pages(vec![Page::text(1, "Body text.")], &metadata);
        assert!(conversion
            .markdown
            .render()
            .starts_with("# Field Notes\n\n*By R. Observer*\n\nBody text."));
    }

    #[test]
    fn test_write_outputs() {
        let dir = TempDir::new().unwrap();
        let pipeline = ConversionPipeline::new(PassthroughExtractor);
        let conversion = pipeline.convert_pages(
            vec![Page::text(1, "ONE TITLE\n\nfirst"), Page::unavailable(2, "bad"), Page::text(3, "third")],
            &DocumentMetadata::default(),
        );

        let output = dir.path().join("out").join("book.md");
        let options = ConvertOptions {
            keep_text: true,
            ..ConvertOptions::default()
        };
        let written = conversion.write(&output, &options).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "## ONE TITLE\n\nfirst\n\nthird\n"
        );
        assert_eq!(
            fs::read_to_string(output.with_extension("txt")).unwrap(),
            "ONE TITLE\n\nfirst\n\n\n\nthird"
        );

        // Overwrites silently.
        let raw_only = ConvertOptions {
            skip_markdown: true,
            ..ConvertOptions::default()
        };
        conversion.write(&output, &raw_only).unwrap();
        assert!(fs::read_to_string(&output).unwrap().starts_with("ONE TITLE"));
    }

    #[test]
    fn test_convert_file_rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.docx");
        fs::write(&input, "not a book").unwrap();
        let result = convert_file(&input, &dir.path().join("notes.md"), &ConvertOptions::default());
        assert!(matches!(result, Err(DocError::UnsupportedFormat { .. })));
        assert!(!dir.path().join("notes.md").exists());
    }

    #[test]
    fn test_epub_chapters_without_headings_split_apart() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("improv.epub");
        write_test_epub(
            &input,
            "Improv",
            "The Cast",
            &[
                "<p>The first scene opens in a crowded rehearsal room where nobody has read the script.</p>",
                "<p>The second scene moves the whole company outside, into the rain, and they keep going.</p>",
            ],
        );

        let output = dir.path().join("improv.md");
        let conversion = convert_file(&input, &output, &ConvertOptions::default()).unwrap();
        assert_eq!(conversion.pages.len(), 2);

        let markdown = fs::read_to_string(&output).unwrap();
        let split = ChapterSplitter::new(2).unwrap().chapters(&markdown).unwrap();
        let titles: Vec<&str> = split.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Improv", "Chapter 1", "Chapter 2"]);
        assert!(split.chapters[2].content.contains("The second scene"));
        assert!(!split.chapters[1].content.contains("The second scene"));
    }

    #[test]
    fn test_keep_toc_option_selects_formatter() {
        let raw = "Contents\n\nA ..... 1\nB ..... 2\nC ..... 3\n\nBody.";
        let metadata = DocumentMetadata::default();

        let collapsed = ConvertOptions::default().formatter().format(raw, &metadata);
        assert!(!collapsed.render().contains("B ..... 2"));

        let options = ConvertOptions {
            keep_toc: true,
            ..ConvertOptions::default()
        };
        let kept = ConversionPipeline::new(PassthroughExtractor)
            .with_formatter(options.formatter())
            .convert_pages(vec![Page::text(1, raw)], &metadata);
        assert!(kept.markdown.render().contains("B ..... 2"));
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/books/novel.epub"), false),
            PathBuf::from("novel.md")
        );
        assert_eq!(
            default_output_path(Path::new("scan.pdf"), true),
            PathBuf::from("scan.txt")
        );
    }
}
