use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::splitter::trim_trailing_newlines;
use crate::error::{DocError, Result};
use crate::markdown::MarkdownDocument;

/// Markdown files directly inside `dir`, ordered by file name.
///
/// Ordering is lexical, so chapter files need zero-padded numbers
/// (`01.md`, `02.md`, ... `10.md`) to come out in reading order.
pub fn collect_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DocError::Io {
            path: dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| DocError::Io {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        let is_markdown = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("md"))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_markdown {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Join file contents in order, one blank line between files, ending with a
/// single newline.
pub fn concatenate(files: &[PathBuf]) -> Result<String> {
    let mut parts = Vec::with_capacity(files.len());
    for file in files {
        let content = fs::read_to_string(file).map_err(DocError::io(file))?;
        let content = trim_trailing_newlines(&content);
        if content.trim().is_empty() {
            warn!("Skipping empty file {:?}", file);
            continue;
        }
        parts.push(content.to_string());
    }

    let mut out = parts.join("\n\n");
    out.push('\n');
    Ok(out)
}

/// Concatenate every Markdown file in `input_dir` into `output_path`.
///
/// The output file is skipped if it already sits in `input_dir`. Fails with
/// [`DocError::EmptyDirectory`] when there is nothing to join.
pub fn aggregate(input_dir: &Path, output_path: &Path) -> Result<MarkdownDocument> {
    let output_identity = fs::canonicalize(output_path).ok();
    let files: Vec<PathBuf> = collect_markdown_files(input_dir)?
        .into_iter()
        .filter(|file| {
            output_identity.is_none() || fs::canonicalize(file).ok() != output_identity
        })
        .collect();

    if files.is_empty() {
        return Err(DocError::EmptyDirectory(input_dir.to_path_buf()));
    }
    info!("Found {} markdown files in {:?}", files.len(), input_dir);

    let content = concatenate(&files)?;
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(DocError::io(parent))?;
        }
    }
    fs::write(output_path, &content).map_err(DocError::io(output_path))?;
    info!("Successfully created {:?}", output_path);

    Ok(MarkdownDocument::parse(&content))
}
