//! Markdown rendering of errors for the terminal.

use std::path::Path;

use crate::config::CONFIG_FILE;
use crate::error::Error;

/// ANSI bold, for headings.
const BOLD: &str = "\x1b[1m";
/// ANSI reset.
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic: what happened and,
/// where there is one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::Cancelled => "# Cancelled\n\nThe scan was cancelled before it finished.\n".to_string(),
        Error::DocumentCorrupt { path, reason } => render_document_corrupt(path, reason),
        Error::DocumentNotFound { path } => render_document_not_found(path),
        Error::EmptySelection => render_empty_selection(),
        Error::Io(err) => format!("# Error: I/O\n\n{err}\n"),
        Error::Json(err) => format!("# Error: Invalid JSON\n\n{err}\n"),
        Error::NoFixes => "# Nothing To Fix\n\nNo fixes to apply.\n".to_string(),
        Error::NoLibraries { reason } => render_no_libraries(reason),
        Error::NodeLimitExceeded { count, limit } => render_node_limit(*count, *limit),
        Error::TokenSourceNotFound { path } => render_token_source_not_found(path),
        Error::TomlDe(err) => format!("# Error: Invalid TOML\n\n`{CONFIG_FILE}` could not be parsed:\n\n{err}\n"),
    };
}

/// Document exists but does not parse.
fn render_document_corrupt(path: &Path, reason: &str) -> String {
    return format!(
        "\
# Error: Document Corrupt

`{}` is not a valid document: {reason}

## Fix

Re-export the page from the design tool.
",
        path.display()
    );
}

/// Document path does not exist.
fn render_document_not_found(path: &Path) -> String {
    return format!(
        "\
# Error: Document Not Found

`{}` does not exist.

## Fix

Point `document` in `{CONFIG_FILE}` at an exported page, or run from the
project root with `--root`.
",
        path.display()
    );
}

/// Selection scan with nothing selected.
fn render_empty_selection() -> String {
    return "\
# Error: Empty Selection

A selection scan was requested but the document has no selected nodes.

## Fix

Select at least one layer, or scan the whole page:

    tokenlink scan
"
    .to_string();
}

/// No usable library tokens.
fn render_no_libraries(reason: &str) -> String {
    return format!(
        "\
# Error: No Token Libraries

{reason}

## Fix

Add a `*.tokens.json` library to the token directory and check it with:

    tokenlink libraries
"
    );
}

/// Scope over the node budget.
fn render_node_limit(count: usize, limit: usize) -> String {
    return format!(
        "\
# Error: Too Many Nodes

The scan scope holds {count} nodes, over the limit of {limit}. Nothing was scanned.

## Fix

Scan a smaller selection, or raise the limit:

    tokenlink scan --node-limit {count}
"
    );
}

/// Token directory path does not exist.
fn render_token_source_not_found(path: &Path) -> String {
    return format!(
        "\
# Error: Token Directory Not Found

`{}` does not exist.

## Fix

Set `libraries` in `{CONFIG_FILE}` to the directory holding your `*.tokens.json` files.
",
        path.display()
    );
}
