use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

use crate::config::SplitConfig;
use crate::error::{DocError, Result};
use crate::utils::text_processor::{cached_regex, slugify};

const FRONT_MATTER_SLUG: &str = "front_matter";

/// One chapter cut from a larger Markdown document. `content` starts with
/// the heading that opened the chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub ordinal: usize,
    pub title: String,
    pub content: String,
}

/// Chapters of a document plus whatever came before the first boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDocument {
    pub front_matter: Option<String>,
    pub chapters: Vec<Chapter>,
}

/// Splits Markdown into chapter files at headings of a configured level or
/// higher. Headings inside fenced code blocks are ignored.
#[derive(Debug, Clone, Copy)]
pub struct ChapterSplitter {
    level: u8,
}

impl ChapterSplitter {
    pub fn new(level: u8) -> Result<Self> {
        SplitConfig { level }.validate()?;
        Ok(Self { level })
    }

    pub fn from_config(config: &SplitConfig) -> Result<Self> {
        Self::new(config.level)
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Cut `markdown` at every boundary heading. Fails with
    /// [`DocError::NoBoundariesFound`] when there is none.
    pub fn chapters(&self, markdown: &str) -> Result<SplitDocument> {
        let boundaries = self.boundaries(markdown);
        if boundaries.is_empty() {
            return Err(DocError::NoBoundariesFound { level: self.level });
        }

        let front = trim_trailing_newlines(&markdown[..boundaries[0].0]);
        let front_matter = (!front.trim().is_empty()).then(|| front.to_string());

        let chapters = boundaries
            .iter()
            .enumerate()
            .map(|(idx, (start, title))| {
                let end = boundaries
                    .get(idx + 1)
                    .map(|(next, _)| *next)
                    .unwrap_or(markdown.len());
                Chapter {
                    ordinal: idx + 1,
                    title: title.clone(),
                    content: trim_trailing_newlines(&markdown[*start..end]).to_string(),
                }
            })
            .collect();

        Ok(SplitDocument {
            front_matter,
            chapters,
        })
    }

    /// Byte offset and title of every boundary heading line.
    fn boundaries(&self, markdown: &str) -> Vec<(usize, String)> {
        static HEADING: OnceLock<Regex> = OnceLock::new();
        let heading = cached_regex(&HEADING, r"^(#{1,6})[ \t]+(.*?)(?:[ \t]+#+)?[ \t]*$");

        let mut found = Vec::new();
        let mut offset = 0;
        // Opening marker of the fence we are inside; only the same marker closes it.
        let mut fence: Option<&str> = None;

        for line in markdown.split_inclusive('\n') {
            let content = line.trim_end_matches(['\n', '\r']);
            let trimmed = content.trim_start();
            match fence {
                Some(marker) => {
                    if trimmed.starts_with(marker) {
                        fence = None;
                    }
                }
                None if trimmed.starts_with("```") || trimmed.starts_with("~~~") => {
                    fence = Some(&trimmed[..3]);
                }
                None => {
                    if let Some(caps) = heading.captures(content) {
                        if caps[1].len() as u8 <= self.level {
                            found.push((offset, caps[2].trim().to_string()));
                        }
                    }
                }
            }
            offset += line.len();
        }
        found
    }

    /// Write one file per chapter into `output_dir`, named `NN_slug.md` in
    /// chapter order. Front matter, if any, goes to `00_front_matter.md`.
    pub fn split(&self, markdown: &str, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let split = self.chapters(markdown)?;
        fs::create_dir_all(output_dir).map_err(DocError::io(output_dir))?;

        let width = split.chapters.len().to_string().len().max(2);
        let mut written = Vec::new();

        if let Some(front) = &split.front_matter {
            let path = output_dir.join(format!("{:0width$}_{}.md", 0, FRONT_MATTER_SLUG));
            write_chapter(&path, front)?;
            written.push(path);
        }

        for chapter in &split.chapters {
            let path = output_dir.join(format!(
                "{:0width$}_{}.md",
                chapter.ordinal,
                slugify(&chapter.title)
            ));
            write_chapter(&path, &chapter.content)?;
            written.push(path);
        }

        info!(
            "Split into {} chapters at level {} in {:?}",
            split.chapters.len(),
            self.level,
            output_dir
        );
        Ok(written)
    }

    pub fn split_file(&self, input: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let markdown = fs::read_to_string(input).map_err(DocError::io(input))?;
        self.split(&markdown, output_dir)
    }
}

impl Default for ChapterSplitter {
    fn default() -> Self {
        Self {
            level: SplitConfig::default().level,
        }
    }
}

/// Chapter text without trailing line breaks. Shared with the aggregator so
/// that joining and splitting agree on chapter boundaries.
pub(crate) fn trim_trailing_newlines(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r'])
}

fn write_chapter(path: &Path, content: &str) -> Result<()> {
    let mut text = content.to_string();
    text.push('\n');
    fs::write(path, text).map_err(DocError::io(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BOOK: &str = "# The Book\n\nPreface text.\n\n## First Steps\n\nAlpha.\n\n### Detail\n\nMore alpha.\n\n## Second: Home!\n\nBeta.\n\n\n";

    #[test]
    fn test_chapters_at_level_two() {
        let split = ChapterSplitter::new(2).unwrap().chapters(BOOK).unwrap();
        assert_eq!(split.chapters.len(), 3);
        assert_eq!(split.front_matter, None);
        assert_eq!(split.chapters[0].title, "The Book");
        assert_eq!(split.chapters[0].content, "# The Book\n\nPreface text.");
        assert_eq!(split.chapters[1].title, "First Steps");
        assert_eq!(
            split.chapters[1].content,
            "## First Steps\n\nAlpha.\n\n### Detail\n\nMore alpha."
        );
        assert_eq!(split.chapters[2].content, "## Second: Home!\n\nBeta.");
    }

    #[test]
    fn test_front_matter_kept() {
        let markdown = "Intro line.\n\n## Only\n\nBody.\n";
        let split = ChapterSplitter::new(2).unwrap().chapters(markdown).unwrap();
        assert_eq!(split.front_matter.as_deref(), Some("Intro line."));
        assert_eq!(split.chapters.len(), 1);
    }

    #[test]
    fn test_no_boundaries_is_an_error() {
        let splitter = ChapterSplitter::new(1).unwrap();
        let result = splitter.chapters("## Not level one\n\nText.\n");
        assert!(matches!(
            result,
            Err(DocError::NoBoundariesFound { level: 1 })
        ));
    }

    #[test]
    fn test_headings_in_code_fences_ignored() {
        let markdown = "## Real\n\n```sh\n## not a heading\n```\n\nEnd.\n";
        let split = ChapterSplitter::new(2).unwrap().chapters(markdown).unwrap();
        assert_eq!(split.chapters.len(), 1);
    }

    #[test]
    fn test_fence_closes_only_on_its_own_marker() {
        let markdown = "## Real\n\n~~~\n```\n## hidden\n~~~\n\n## Shown\n\nText.\n";
        let split = ChapterSplitter::new(2).unwrap().chapters(markdown).unwrap();
        let titles: Vec<&str> = split.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Real", "Shown"]);

        let nested = "## A\n\n```md\n~~~\n## inside\n```\n\n## B\n";
        let split = ChapterSplitter::new(2).unwrap().chapters(nested).unwrap();
        let titles: Vec<&str> = split.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn test_split_writes_numbered_files() {
        let dir = TempDir::new().unwrap();
        let markdown = "Front.\n\n## First Steps\n\nAlpha.\n\n## Second: Home!\n\nBeta.\n";
        let paths = ChapterSplitter::new(2).unwrap().split(markdown, dir.path()).unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["00_front_matter.md", "01_first_steps.md", "02_second_home.md"]
        );
        assert_eq!(
            fs::read_to_string(&paths[2]).unwrap(),
            "## Second: Home!\n\nBeta.\n"
        );
    }

    #[test]
    fn test_invalid_level_rejected() {
        assert!(ChapterSplitter::new(0).is_err());
        assert!(ChapterSplitter::new(7).is_err());
    }
}
