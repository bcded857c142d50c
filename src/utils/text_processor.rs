use regex::Regex;
use std::sync::OnceLock;

/// Compile `pattern` once into `cell`. Patterns are literals, so a failure
/// here is a programming error.
pub(crate) fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex pattern"))
}

/// Normalize raw page text while keeping its line structure: drop form
/// feeds and trailing spaces, remove standalone page numbers, and collapse
/// runs of blank lines to a single blank line.
pub fn clean_text(text: &str) -> String {
    static TRAILING: OnceLock<Regex> = OnceLock::new();
    static PAGE_NUMS: OnceLock<Regex> = OnceLock::new();
    static NEWLINES: OnceLock<Regex> = OnceLock::new();

    let text = text.replace('\x0C', "\n").replace("\r\n", "\n");
    let text = cached_regex(&TRAILING, r"(?m)[ \t]+$").replace_all(&text, "");
    let text = cached_regex(&PAGE_NUMS, r"(?m)^[ \t]*\d{1,4}[ \t]*$").replace_all(&text, "");
    let text = cached_regex(&NEWLINES, r"\n{3,}").replace_all(&text, "\n\n");

    text.trim().to_string()
}

/// Join the lines of a wrapped block into one line. Words hyphenated
/// across a line break are rejoined.
pub fn join_wrapped_lines(block: &str) -> String {
    static HYPHENATED: OnceLock<Regex> = OnceLock::new();

    let joined = cached_regex(&HYPHENATED, r"(\w)-[ \t]*\n[ \t]*(\w)").replace_all(block, "$1$2");
    collapse_whitespace(&joined)
}

/// Collapse every whitespace run (newlines included) to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into blocks separated by blank lines.
pub fn split_blocks(text: &str) -> Vec<&str> {
    static BLANK: OnceLock<Regex> = OnceLock::new();

    cached_regex(&BLANK, r"\n\s*\n")
        .split(text)
        .map(|block| block.trim_matches('\n'))
        .filter(|block| !block.trim().is_empty())
        .collect()
}

/// File-name slug for a chapter title: lower case, punctuation dropped,
/// whitespace and dashes folded into underscores.
pub fn slugify(title: &str) -> String {
    static PUNCT: OnceLock<Regex> = OnceLock::new();
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();

    let lower = title.to_lowercase();
    let stripped = cached_regex(&PUNCT, r"[^\w\s-]").replace_all(&lower, "");
    let slug = cached_regex(&SEPARATORS, r"[-\s]+").replace_all(stripped.trim(), "_");
    let slug = slug.trim_matches('_');

    if slug.is_empty() {
        "chapter".to_string()
    } else {
        slug.chars().take(60).collect()
    }
}
