//! Splitting one Markdown file into chapters and joining chapters back.

pub mod aggregator;
pub mod splitter;

pub use aggregator::aggregate;
pub use splitter::{Chapter, ChapterSplitter, SplitDocument};
