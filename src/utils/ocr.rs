use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::document::{Page, PageContent};
use crate::error::{DocError, Result};

/// Raw text recovered from one page.
///
/// A failed page keeps its ordinal and carries empty text, so assembling
/// pages never shifts content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub ordinal: usize,
    pub text: String,
    pub failure: Option<String>,
}

impl ExtractedText {
    pub fn success(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
            failure: None,
        }
    }

    pub fn failed(ordinal: usize, reason: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: String::new(),
            failure: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Turns a page into text. Implementations never fail the whole document:
/// a page that cannot be read comes back as [`ExtractedText::failed`].
pub trait TextExtractor {
    fn extract(&self, page: Page) -> ExtractedText;
}

/// Passes text pages through unchanged. Used for EPUB chapters and PDF text
/// layers, where no OCR is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughExtractor;

impl TextExtractor for PassthroughExtractor {
    fn extract(&self, page: Page) -> ExtractedText {
        match page.content {
            PageContent::Text(text) => ExtractedText::success(page.ordinal, text),
            PageContent::Unavailable(reason) => ExtractedText::failed(page.ordinal, reason),
            PageContent::Image(path) => ExtractedText::failed(
                page.ordinal,
                format!("page image {:?} needs OCR", path),
            ),
        }
    }
}

/// OCR through the `tesseract` executable.
///
/// Note: This requires Tesseract to be installed on the system.
/// Install:
/// - Linux: sudo apt-get install tesseract-ocr
/// - Mac: brew install tesseract
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    language: Option<String>,
    preprocess: bool,
}

impl TesseractExtractor {
    /// Check that Tesseract is installed and knows `language`
    /// (e.g. `eng`, `chi_sim`, or a combination like `eng+deu`).
    pub fn new(language: Option<&str>, preprocess: bool) -> Result<Self> {
        let installed = installed_languages()?;
        if let Some(code) = language {
            validate_language(code, &installed)?;
        }
        info!(
            "Tesseract ready (language: {}, preprocess: {})",
            language.unwrap_or("default"),
            preprocess
        );

        Ok(Self {
            language: language.map(str::to_string),
            preprocess,
        })
    }

    fn recognize(&self, image: &Path) -> std::result::Result<String, String> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image).arg("stdout");
        if let Some(language) = &self.language {
            cmd.arg("-l").arg(language);
        }
        cmd.args(["--oem", "1", "--psm", "3"]);

        let output = cmd.output().map_err(|e| format!("tesseract: {}", e))?;
        if !output.status.success() {
            return Err(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl TextExtractor for TesseractExtractor {
    fn extract(&self, page: Page) -> ExtractedText {
        let image = match page.content {
            PageContent::Image(path) => path,
            PageContent::Text(text) => return ExtractedText::success(page.ordinal, text),
            PageContent::Unavailable(reason) => {
                return ExtractedText::failed(page.ordinal, reason)
            }
        };

        let input = if self.preprocess {
            match preprocess_image(&image) {
                Ok(prepared) => prepared,
                Err(e) => {
                    warn!("Preprocessing failed for page {}: {}", page.ordinal, e);
                    image.clone()
                }
            }
        } else {
            image.clone()
        };

        debug!("OCR processing page {}...", page.ordinal);
        let result = self.recognize(&input);
        if input != image {
            let _ = std::fs::remove_file(&input);
        }

        match result {
            Ok(text) => ExtractedText::success(page.ordinal, text),
            Err(reason) => {
                warn!("Tesseract failed for page {}: {}", page.ordinal, reason);
                ExtractedText::failed(page.ordinal, reason)
            }
        }
    }
}

/// Grayscale and contrast-boost a page image to help recognition. The result
/// is written next to the original.
pub fn preprocess_image(image: &Path) -> std::result::Result<PathBuf, image::ImageError> {
    let prepared = image.with_file_name(format!(
        "{}-prepared.png",
        image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("page")
    ));

    image::open(image)?
        .grayscale()
        .adjust_contrast(20.0)
        .save(&prepared)?;

    Ok(prepared)
}

/// Languages reported by `tesseract --list-langs`.
pub fn installed_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .map_err(|e| DocError::Tool {
            tool: "tesseract",
            message: format!(
                "{} (Tesseract OCR is not installed or not in PATH: \
                 https://github.com/tesseract-ocr/tesseract)",
                e
            ),
        })?;

    // Older releases print the list on stderr.
    let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
    listing.push('\n');
    listing.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(parse_language_list(&listing))
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .filter(|line| {
            line.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
        .map(str::to_string)
        .collect()
}

/// Check every component of a `+`-joined language code against the
/// installed models.
pub fn validate_language(code: &str, installed: &[String]) -> Result<()> {
    let unsupported = || DocError::UnsupportedLanguage {
        code: code.to_string(),
        available: installed.to_vec(),
    };

    if code.trim().is_empty() {
        return Err(unsupported());
    }
    for part in code.split('+') {
        if !installed.iter().any(|lang| lang == part) {
            return Err(unsupported());
        }
    }
    Ok(())
}
