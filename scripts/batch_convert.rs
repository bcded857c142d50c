use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use doc2md::config::AppConfig;
use doc2md::pipeline::{convert_file, ConvertOptions};
use doc2md::DocumentKind;

#[derive(Debug, Parser)]
#[command(author, version, about = "Convert every PDF/EPUB under a directory to Markdown")]
struct Args {
    /// Input directory containing PDF/EPUB files
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for Markdown files
    #[arg(short, long = "output-dir", alias = "output_dir")]
    output_dir: PathBuf,

    /// Path to configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read PDF text layers instead of running OCR
    #[arg(long = "text-layer", alias = "text_layer")]
    text_layer: bool,
}

#[derive(Debug, Serialize)]
struct ConvertedDocument {
    source: PathBuf,
    output: PathBuf,
    pages: usize,
    failed_pages: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct BatchManifest {
    total_documents: usize,
    converted: Vec<ConvertedDocument>,
    failed: Vec<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Input directory: {:?}", args.input);
    info!("Output directory: {:?}", args.output_dir);

    let config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => AppConfig::default(),
    };
    let mut options = ConvertOptions::from_config(&config.convert);
    options.text_layer |= args.text_layer;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", args.output_dir))?;

    let documents = find_documents(&args.input);
    info!("Found {} documents", documents.len());
    if documents.is_empty() {
        anyhow::bail!("No PDF or EPUB files found in {:?}", args.input);
    }

    let mut manifest = BatchManifest {
        total_documents: documents.len(),
        converted: Vec::new(),
        failed: Vec::new(),
    };

    for (idx, source) in documents.iter().enumerate() {
        info!("Processing {}/{}: {:?}", idx + 1, documents.len(), source);
        let output = output_path(&args.output_dir, source);

        match convert_file(source, &output, &options) {
            Ok(conversion) => manifest.converted.push(ConvertedDocument {
                source: source.clone(),
                output,
                pages: conversion.pages.len(),
                failed_pages: conversion.failed_pages(),
            }),
            Err(e) => {
                warn!("Failed to convert {:?}: {}", source, e);
                manifest.failed.push(source.clone());
            }
        }
    }

    let manifest_path = args.output_dir.join("manifest.json");
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("Failed to write manifest: {:?}", manifest_path))?;
    info!("Manifest saved to: {:?}", manifest_path);

    info!("Batch conversion complete!");
    info!("  - Converted: {}", manifest.converted.len());
    info!("  - Failed: {}", manifest.failed.len());

    if manifest.converted.is_empty() {
        anyhow::bail!("No document could be converted");
    }
    Ok(())
}

fn find_documents(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| DocumentKind::from_path(path).is_ok())
        .collect()
}

/// `<output_dir>/<input stem>.md`
fn output_path(output_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    output_dir.join(format!("{}.md", stem))
}
