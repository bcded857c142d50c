//! Chunked summarization of Markdown files through a completion API.

pub mod client;

pub use client::{CompletionClient, OpenAiClient};

use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::SummarizeConfig;
use crate::error::{DocError, Result};
use crate::markdown::MarkdownDocument;
use crate::utils::text_processor::split_blocks;

const COMBINE_INSTRUCTION: &str = "The following are summaries of consecutive parts of one \
document. Merge them into a single hierarchical summary without losing any topic.";

/// Outcome of a multi-file run.
#[derive(Debug, Default)]
pub struct SummaryReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl SummaryReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Summarizer<C: CompletionClient> {
    client: C,
    config: SummarizeConfig,
}

impl<C: CompletionClient> Summarizer<C> {
    pub fn new(client: C, config: SummarizeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    /// Summarize one Markdown text. Fails with [`DocError::EmptyInput`]
    /// before any request when the text has nothing to summarize.
    pub fn summarize(&self, markdown: &str) -> Result<String> {
        if !MarkdownDocument::parse(markdown).has_text() {
            return Err(DocError::EmptyInput);
        }

        let chunks = chunk_text(markdown, self.config.max_chunk_chars);
        info!("Summarizing {} chunk(s) with {}", chunks.len(), self.client.model());

        let mut summaries = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            let summary = self.client.complete(&self.config.prompt, chunk)?;
            info!("Chunk {}/{} summarized", idx + 1, chunks.len());
            summaries.push(summary.trim().to_string());
        }

        let joined = summaries.join("\n\n");
        if self.config.combine_chunks && summaries.len() > 1 {
            let combined = self.client.complete(COMBINE_INSTRUCTION, &joined)?;
            return Ok(combined.trim().to_string());
        }
        Ok(joined)
    }

    /// `{prefix}{model}_{file name}` next to the source file.
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        source.with_file_name(format!(
            "{}{}_{}",
            self.config.output_prefix,
            self.client.model(),
            name
        ))
    }

    pub fn summarize_file(&self, path: &Path) -> Result<PathBuf> {
        let markdown = fs::read_to_string(path).map_err(DocError::io(path))?;
        let mut summary = self.summarize(&markdown)?;
        summary.push('\n');

        let output = self.output_path(path);
        fs::write(&output, summary).map_err(DocError::io(&output))?;
        info!("Summary saved to: {:?}", output);
        Ok(output)
    }

    /// Summarize a single file, or every Markdown file under a directory.
    ///
    /// A failing file is recorded and the run moves on, except for rejected
    /// credentials, which abort the run.
    pub fn summarize_path(&self, path: &Path) -> Result<SummaryReport> {
        let files = if path.is_file() {
            vec![path.to_path_buf()]
        } else if path.is_dir() {
            self.collect_sources(path)?
        } else {
            return Err(DocError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "neither a file nor a directory"),
            });
        };

        if files.is_empty() {
            return Err(DocError::EmptyDirectory(path.to_path_buf()));
        }
        info!(
            "Generating summaries for {} file(s) using {}",
            files.len(),
            self.client.model()
        );

        let mut report = SummaryReport::default();
        for file in files {
            match self.summarize_file(&file) {
                Ok(output) => report.written.push(output),
                Err(e) if e.is_auth_failure() => {
                    error!("Authentication rejected, stopping: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Error processing {:?}: {}", file, e);
                    report.failed.push((file, e.to_string()));
                }
            }
        }

        info!(
            "Summaries written: {}, failed: {}",
            report.written.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Markdown files under `dir`, recursively, skipping earlier summaries.
    fn collect_sources(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| DocError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let is_markdown = entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("md"))
                .unwrap_or(false);
            if is_markdown && !name.starts_with(&self.config.output_prefix) {
                files.push(entry.path().to_path_buf());
            }
        }
        Ok(files)
    }
}

/// Pack paragraphs greedily into chunks of at most `max_chars` characters.
/// A paragraph longer than the budget is cut on character boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for block in split_blocks(text) {
        let len = block.chars().count();

        if len > max_chars {
            if !current.is_empty() {
                chunks.push(mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = block.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        if !current.is_empty() && current_len + 2 + len > max_chars {
            chunks.push(mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(block);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
