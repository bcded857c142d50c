use pdf_extract::extract_text_by_pages;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::document::{Page, PageRange};
use crate::error::{DocError, Result};
use crate::utils::text_processor::cached_regex;

/// Number of pages in a PDF, read with `pdfinfo` (poppler-utils).
pub fn page_count(path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .map_err(|e| DocError::Tool {
            tool: "pdfinfo",
            message: format!(
                "{} (install poppler-utils: apt-get install poppler-utils / brew install poppler)",
                e
            ),
        })?;

    if !output.status.success() {
        return Err(DocError::Document {
            path: path.to_path_buf(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        DocError::Document {
            path: path.to_path_buf(),
            message: "pdfinfo reported no page count".to_string(),
        }
    })
}

fn parse_page_count(pdfinfo: &str) -> Option<usize> {
    static PAGES: OnceLock<Regex> = OnceLock::new();
    cached_regex(&PAGES, r"(?m)^Pages:\s+(\d+)\s*$")
        .captures(pdfinfo)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Renders PDF pages to PNG one at a time with `pdftoppm`.
///
/// Only the most recently yielded page image is kept on disk; it is removed
/// when the next page is requested, and the scratch directory goes away when
/// the iterator is dropped.
pub struct PdfPages {
    source: PathBuf,
    dpi: u32,
    next: usize,
    last: usize,
    workdir: TempDir,
    previous: Option<PathBuf>,
}

impl PdfPages {
    pub fn new(source: &Path, range: PageRange, dpi: u32) -> Result<Self> {
        let workdir = tempfile::Builder::new()
            .prefix("doc2md_pages_")
            .tempdir()
            .map_err(DocError::io(&std::env::temp_dir()))?;

        Ok(Self {
            source: source.to_path_buf(),
            dpi,
            next: range.start,
            last: range.end,
            workdir,
            previous: None,
        })
    }

    fn render(&self, ordinal: usize) -> Result<PathBuf> {
        let prefix = self.workdir.path().join(format!("page-{}", ordinal));
        let output = Command::new("pdftoppm")
            .arg("-f")
            .arg(ordinal.to_string())
            .arg("-l")
            .arg(ordinal.to_string())
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg(&self.source)
            .arg(&prefix)
            .output()
            .map_err(|e| DocError::Tool {
                tool: "pdftoppm",
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(DocError::Tool {
                tool: "pdftoppm",
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let image = prefix.with_extension("png");
        if !image.exists() {
            return Err(DocError::Tool {
                tool: "pdftoppm",
                message: format!("no image produced for page {}", ordinal),
            });
        }
        Ok(image)
    }
}

impl Iterator for PdfPages {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        if let Some(previous) = self.previous.take() {
            let _ = fs::remove_file(previous);
        }
        if self.next > self.last {
            return None;
        }

        let ordinal = self.next;
        self.next += 1;

        debug!("Rendering page {} at {} dpi", ordinal, self.dpi);
        let page = match self.render(ordinal) {
            Ok(image) => {
                self.previous = Some(image.clone());
                Page::image(ordinal, image)
            }
            Err(e) => {
                warn!("Failed to render page {}: {}", ordinal, e);
                Page::unavailable(ordinal, e.to_string())
            }
        };
        Some(page)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last + 1).saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Read the embedded text layer of a PDF, one entry per page.
pub fn extract_text_pages(path: &Path) -> Result<Vec<String>> {
    info!("Extracting text layer from PDF: {:?}", path);

    let pages = extract_text_by_pages(path).map_err(|e| DocError::Document {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if pages.iter().all(|page| page.trim().is_empty()) {
        warn!(
            "PDF appears to be scanned or has no extractable text: {:?}",
            path
        );
    }

    info!("Extracted {} pages from PDF", pages.len());
    Ok(pages)
}

/// Minimal PDF with one line of Helvetica text per page.
#[cfg(test)]
pub(crate) fn write_text_pdf(path: &Path, pages: &[&str]) {
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, object));
    }
    let xref = pdf.len();
    pdf.push_str(&format!(
        "xref\n0 {}\n0000000000 65535 f \n",
        objects.len() + 1
    ));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    fs::write(path, pdf).expect("write test pdf");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_count() {
        let info = "Title:          Sample\nProducer:       poppler\nPages:          42\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), Some(42));
        assert_eq!(parse_page_count("Title: nothing"), None);
    }

    #[test]
    fn test_text_layer_read_per_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("three.pdf");
        write_text_pdf(&path, &["Page number 1", "Page number 2", "Page number 3"]);

        let pages = extract_text_pages(&path).unwrap();
        assert_eq!(pages.len(), 3);
        for (idx, page) in pages.iter().enumerate() {
            assert!(page.contains(&format!("Page number {}", idx + 1)), "{:?}", page);
        }
        assert!(!pages[0].contains("Page number 2"));
    }

    #[test]
    fn test_unreadable_pdf_is_document_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, "not a pdf").unwrap();
        assert!(matches!(
            extract_text_pages(&path),
            Err(DocError::Document { .. })
        ));
    }

    #[test]
    fn test_pdf_pages_stop_after_range() {
        let range = PageRange::new(3, 4).unwrap();
        let pages = PdfPages::new(Path::new("missing.pdf"), range, 150).unwrap();
        assert_eq!(pages.size_hint(), (2, Some(2)));

        // Rendering a missing file fails per page; ordinals stay contiguous.
        let ordinals: Vec<usize> = pages.map(|page| page.ordinal).collect();
        assert_eq!(ordinals, vec![3, 4]);
    }
}
