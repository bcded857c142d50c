pub mod epub_parser;
pub mod ocr;
pub mod pdf_parser;
pub mod text_processor;

pub use epub_parser::html_to_text;
pub use ocr::{ExtractedText, PassthroughExtractor, TesseractExtractor, TextExtractor};
pub use text_processor::{clean_text, join_wrapped_lines, slugify};
