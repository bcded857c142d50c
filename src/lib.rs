// Library exports for the doc2md binaries and scripts

pub mod chapters;
pub mod config;
pub mod document;
pub mod error;
pub mod markdown;
pub mod pipeline;
pub mod summarize;
pub mod utils;

// Re-export commonly used types
pub use chapters::{aggregate, ChapterSplitter};
pub use config::AppConfig;
pub use document::{Document, DocumentKind, DocumentMetadata, Page, PageRange};
pub use error::{DocError, Result};
pub use markdown::{MarkdownDocument, MarkdownFormatter};
pub use pipeline::{convert_file, ConversionPipeline, ConvertOptions};
pub use summarize::{OpenAiClient, Summarizer};
