use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use doc2md::config::AppConfig;
use doc2md::document::{DocumentMetadata, PageRange};
use doc2md::markdown::formatter::describe;
use doc2md::pipeline::{convert_file, default_output_path, ConvertOptions};
use doc2md::summarize::{OpenAiClient, Summarizer};
use doc2md::{aggregate, ChapterSplitter, MarkdownFormatter};

#[derive(Debug, Parser)]
#[command(author, version, about = "Convert PDF and EPUB documents to Markdown")]
struct Cli {
    /// Path to configuration JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert a PDF or EPUB document to Markdown
    Convert(ConvertArgs),
    /// Format an extracted plain-text file as Markdown
    Format(FormatArgs),
    /// Split a Markdown file into chapter files
    Split(SplitArgs),
    /// Concatenate the Markdown files of a directory
    Aggregate(AggregateArgs),
    /// Write AI summaries of a Markdown file or directory
    Summarize(SummarizeArgs),
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// PDF or EPUB file
    input: PathBuf,
    /// Output path (default: <input stem>.md)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Rasterization resolution for OCR
    #[arg(long)]
    dpi: Option<u32>,
    /// Tesseract language code, e.g. eng or eng+deu
    #[arg(short, long)]
    language: Option<String>,
    /// Pages (or EPUB chapters) to convert, START:END, 1-based inclusive
    #[arg(long = "page-range", alias = "page_range")]
    page_range: Option<PageRange>,
    /// Document title
    #[arg(short, long)]
    title: Option<String>,
    /// Document author
    #[arg(short, long)]
    author: Option<String>,
    /// Skip grayscale/contrast preprocessing before OCR
    #[arg(long = "no-preprocess", alias = "no_preprocess")]
    no_preprocess: bool,
    /// Read the PDF's embedded text instead of running OCR
    #[arg(long = "text-layer", alias = "text_layer")]
    text_layer: bool,
    /// Write the raw extracted text instead of Markdown
    #[arg(long = "skip-markdown", alias = "skip_markdown")]
    skip_markdown: bool,
    /// Also keep the raw extracted text next to the Markdown
    #[arg(long = "keep-text", alias = "keep_text")]
    keep_text: bool,
    /// Leave a detected table of contents in the Markdown
    #[arg(long = "keep-toc", alias = "keep_toc")]
    keep_toc: bool,
}

#[derive(Debug, Args)]
struct FormatArgs {
    /// Plain-text file
    input: PathBuf,
    /// Output path (default: input with .md extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(short, long)]
    title: Option<String>,
    #[arg(short, long)]
    author: Option<String>,
    /// Leave a detected table of contents in the Markdown
    #[arg(long = "keep-toc", alias = "keep_toc")]
    keep_toc: bool,
}

#[derive(Debug, Args)]
struct SplitArgs {
    /// Markdown file to split
    input: PathBuf,
    /// Directory for chapter files (default: ./<input stem>_chapters)
    #[arg(long = "output-dir", alias = "output_dir")]
    output_dir: Option<PathBuf>,
    /// Headings at this level or higher start a chapter
    #[arg(long)]
    level: Option<u8>,
}

#[derive(Debug, Args)]
struct AggregateArgs {
    /// Directory of Markdown files
    directory: PathBuf,
    /// Output file
    #[arg(long, default_value = "all.md")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct SummarizeArgs {
    /// Markdown file or directory
    path: PathBuf,
    /// Model name
    #[arg(long)]
    model: Option<String>,
    /// Largest chunk sent in one request, in characters
    #[arg(long = "max-chunk-chars", alias = "max_chunk_chars")]
    max_chunk_chars: Option<usize>,
    /// Merge per-chunk summaries with one more request
    #[arg(long)]
    combine: bool,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert(args) => convert_command(args, &config),
        Commands::Format(args) => format_command(args),
        Commands::Split(args) => split_command(args, &config),
        Commands::Aggregate(args) => aggregate_command(args),
        Commands::Summarize(args) => summarize_command(args, &config),
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from: {:?}", path);
            AppConfig::load(path)
                .with_context(|| format!("Failed to load config file: {:?}", path))
        }
        None => Ok(AppConfig::default()),
    }
}

fn convert_command(args: ConvertArgs, config: &AppConfig) -> Result<()> {
    let mut convert = config.convert.clone();
    if let Some(dpi) = args.dpi {
        convert.dpi = dpi;
    }
    if args.language.is_some() {
        convert.language = args.language;
    }
    if args.no_preprocess {
        convert.preprocess = false;
    }
    if args.text_layer {
        convert.text_layer = true;
    }
    convert.validate()?;

    let options = ConvertOptions {
        page_range: args.page_range,
        title: args.title,
        author: args.author,
        skip_markdown: args.skip_markdown,
        keep_text: args.keep_text,
        keep_toc: args.keep_toc,
        ..ConvertOptions::from_config(&convert)
    };
    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input, options.skip_markdown));

    let conversion = convert_file(&args.input, &output, &options)
        .with_context(|| format!("Failed to convert {:?}", args.input))?;

    let failed = conversion.failed_pages();
    if !failed.is_empty() {
        warn!("Pages without text: {:?}", failed);
    }
    info!("Processing completed successfully!");
    Ok(())
}

fn format_command(args: FormatArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read text file: {:?}", args.input))?;
    let metadata = DocumentMetadata {
        title: args.title,
        author: args.author,
    };

    let formatter = if args.keep_toc {
        MarkdownFormatter::new().keep_toc()
    } else {
        MarkdownFormatter::new()
    };
    let markdown = formatter.format(&raw, &metadata);
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("md"));
    markdown.write(&output)?;

    info!("Markdown structure: {}", describe(&markdown));
    info!("Markdown conversion completed: {:?}", output);
    Ok(())
}

fn split_command(args: SplitArgs, config: &AppConfig) -> Result<()> {
    let mut split = config.split.clone();
    if let Some(level) = args.level {
        split.level = level;
    }
    let splitter = ChapterSplitter::from_config(&split)?;
    info!("Splitting {:?} at heading level {}", args.input, splitter.level());
    let output_dir = args.output_dir.unwrap_or_else(|| {
        let stem = args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        PathBuf::from(format!("{}_chapters", stem))
    });

    let written = splitter
        .split_file(&args.input, &output_dir)
        .with_context(|| format!("Failed to split {:?}", args.input))?;
    info!(
        "{} files have been saved in the {:?} directory",
        written.len(),
        output_dir
    );
    Ok(())
}

fn aggregate_command(args: AggregateArgs) -> Result<()> {
    let document = aggregate(&args.directory, &args.output)
        .with_context(|| format!("Failed to aggregate {:?}", args.directory))?;
    info!("Markdown structure: {}", describe(&document));
    Ok(())
}

fn summarize_command(args: SummarizeArgs, config: &AppConfig) -> Result<()> {
    dotenvy::dotenv().ok();

    let mut summarize = config.summarize.clone();
    if let Some(model) = args.model {
        summarize.model = model;
    }
    if let Some(max_chunk_chars) = args.max_chunk_chars {
        summarize.max_chunk_chars = max_chunk_chars;
    }
    if args.combine {
        summarize.combine_chunks = true;
    }
    summarize.validate()?;

    let api_key = env::var(&summarize.api_key_env).with_context(|| {
        format!(
            "{} is not set (export it or put it in a .env file)",
            summarize.api_key_env
        )
    })?;

    let client = OpenAiClient::new(&summarize, api_key)?;
    let summarizer = Summarizer::new(client, summarize)?;
    let report = summarizer
        .summarize_path(&args.path)
        .with_context(|| format!("Failed to summarize {:?}", args.path))?;

    for (file, reason) in &report.failed {
        warn!("No summary for {:?}: {}", file, reason);
    }
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} files could not be summarized",
            report.failed.len(),
            report.failed.len() + report.written.len()
        );
    }
    Ok(())
}
