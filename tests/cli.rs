use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn doc2md() -> Command {
    Command::cargo_bin("doc2md").expect("Binary exists")
}

#[test]
fn split_then_aggregate_restores_the_book() {
    let dir = TempDir::new().unwrap();
    let book = "## One\n\nFirst chapter.\n\n## Two\n\nSecond chapter.\n";
    fs::write(dir.path().join("book.md"), book).unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["split", "book.md", "--output_dir", "chapters"])
        .assert()
        .success();

    let chapters = dir.path().join("chapters");
    assert_eq!(
        fs::read_to_string(chapters.join("01_one.md")).unwrap(),
        "## One\n\nFirst chapter.\n"
    );
    assert!(chapters.join("02_two.md").exists());

    doc2md()
        .current_dir(dir.path())
        .args(["aggregate", "chapters", "--output", "all.md"])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(dir.path().join("all.md")).unwrap(), book);
}

#[test]
fn split_without_boundaries_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("flat.md"), "Just a paragraph.\n").unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["split", "flat.md", "--level", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no headings of level 1"));
}

#[test]
fn aggregate_defaults_to_all_md() {
    let dir = TempDir::new().unwrap();
    let parts = dir.path().join("parts");
    fs::create_dir(&parts).unwrap();
    fs::write(parts.join("02.md"), "Second.\n").unwrap();
    fs::write(parts.join("01.md"), "First.\n").unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["aggregate", "parts"])
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(dir.path().join("all.md")).unwrap(),
        "First.\n\nSecond.\n"
    );
}

#[test]
fn aggregate_empty_directory_fails() {
    let dir = TempDir::new().unwrap();
    doc2md()
        .current_dir(dir.path())
        .args(["aggregate", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no markdown files found"));
}

#[test]
fn format_writes_markdown_next_to_input() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("scan.txt"),
        "INTRODUCTION\n\nSome body text here.\n\n12\n",
    )
    .unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["format", "scan.txt", "--title", "My Book"])
        .assert()
        .success();

    let markdown = fs::read_to_string(dir.path().join("scan.md")).unwrap();
    assert!(markdown.starts_with("# My Book\n\n## INTRODUCTION\n\nSome body text here."));
    assert!(!markdown.contains("12"));
}

#[test]
fn format_keep_toc_leaves_contents_listing() {
    let dir = TempDir::new().unwrap();
    let text = "Contents\n\nA ..... 1\nB ..... 2\nC ..... 3\n\nBody.\n";
    fs::write(dir.path().join("toc.txt"), text).unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["format", "toc.txt", "--output", "collapsed.md"])
        .assert()
        .success();
    let collapsed = fs::read_to_string(dir.path().join("collapsed.md")).unwrap();
    assert!(!collapsed.contains("B ..... 2"));

    doc2md()
        .current_dir(dir.path())
        .args(["format", "toc.txt", "--output", "kept.md", "--keep-toc"])
        .assert()
        .success();
    let kept = fs::read_to_string(dir.path().join("kept.md")).unwrap();
    assert!(kept.contains("B ..... 2"));
}

#[test]
fn convert_rejects_unsupported_format() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.docx"), "binary").unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["convert", "notes.docx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported document format"));
    assert!(!dir.path().join("notes.md").exists());
}

#[test]
fn convert_rejects_malformed_page_range() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("book.pdf"), "%PDF-1.4").unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["convert", "book.pdf", "--page_range", "9:3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("9:3"));
}

#[test]
fn summarize_requires_api_key() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.md"), "# Notes\n\nText.\n").unwrap();

    doc2md()
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .args(["summarize", "notes.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.json"), r#"{"split": {"level": 9}}"#).unwrap();
    fs::write(dir.path().join("book.md"), "## One\n").unwrap();

    doc2md()
        .current_dir(dir.path())
        .args(["--config", "config.json", "split", "book.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("split level"));
}
