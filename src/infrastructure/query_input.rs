//! Query list files.
//!
//! Reads CSV (`,`), TSV (`\t`) or plain one-per-line text. A header row is
//! recognised when one of its cells is `Queries`/`Query`; an optional `Tier`
//! column supplies the tier label. Without a header the first column is the
//! query and the second, if any, the tier.

use std::collections::HashSet;
use std::io::{self, Write};
use std::mem::take;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::SearchQuery;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Field separator implied by the file extension.
#[must_use]
pub fn separator_for(path: &Path) -> char {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("tsv" | "tab") => '\t',
        _ => ',',
    }
}

/// Read and parse a query file.
pub async fn read_queries(path: &Path) -> Result<Vec<SearchQuery>, InputError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let queries = parse_queries(&text, separator_for(path));
    info!("📄 Loaded {} queries from {}", queries.len(), path.display());
    Ok(queries)
}

/// Queries in file order, blanks dropped, later duplicates of a canonical query dropped.
#[must_use]
pub fn parse_queries(text: &str, sep: char) -> Vec<SearchQuery> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = parse_rows(text, sep);
    if rows.is_empty() {
        return Vec::new();
    }

    let (query_col, tier_col) = match header_columns(&rows[0]) {
        Some(columns) => {
            rows.remove(0);
            columns
        }
        None => (0, Some(1)),
    };

    let mut seen = HashSet::new();
    let mut queries = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(raw) = row.get(query_col) else { continue };
        let mut query = SearchQuery::new(raw);
        if query.is_blank() {
            continue;
        }
        if let Some(tier) = tier_col.and_then(|col| row.get(col)) {
            query = query.with_tier(tier);
        }
        if seen.insert(query.canonical().to_string()) {
            queries.push(query);
        } else {
            debug!("Skipping repeated query '{}'", query);
        }
    }
    queries
}

fn header_columns(first: &[String]) -> Option<(usize, Option<usize>)> {
    let position = |names: &[&str]| {
        first
            .iter()
            .position(|cell| names.iter().any(|name| cell.trim().eq_ignore_ascii_case(name)))
    };
    let query_col = position(&["queries", "query"])?;
    Some((query_col, position(&["tier"])))
}

/// Row being assembled by [`parse_rows`].
#[derive(Default)]
struct RowBuilder {
    cells: Vec<String>,
    cell: String,
}

impl RowBuilder {
    fn end_cell(&mut self) {
        self.cells.push(take(&mut self.cell));
    }

    /// Close the row; rows whose cells are all blank are dropped.
    fn end_row(&mut self, rows: &mut Vec<Vec<String>>) {
        self.end_cell();
        let cells = take(&mut self.cells);
        if cells.iter().any(|cell| !cell.trim().is_empty()) {
            rows.push(cells);
        }
    }
}

/// Delimited rows from `text`. Quoted cells may hold separators, newlines and
/// `""` escapes; CRLF and LF both end a row.
#[must_use]
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = RowBuilder::default();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                row.cell.push('"');
            }
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => row.end_cell(),
            '\r' if !in_quotes => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.end_row(&mut rows);
            }
            '\n' if !in_quotes => row.end_row(&mut rows),
            _ => row.cell.push(ch),
        }
    }

    if in_quotes {
        debug!("Unterminated quote at end of input; keeping the partial cell");
    }
    row.end_row(&mut rows);
    rows
}

fn needs_quotes(field: &str, sep: char) -> bool {
    field.contains(sep) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write a single CSV/TSV row to any writer.
pub fn write_row<W: Write>(mut w: W, row: &[&str], sep: char) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{sep}")?;
        }
        if needs_quotes(cell, sep) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

/// Render queries in the same format [`parse_queries`] reads.
pub fn render_queries(queries: &[SearchQuery], sep: char) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    write_row(&mut out, &["Queries", "Tier"], sep)?;
    for query in queries {
        write_row(&mut out, &[query.canonical(), query.tier().unwrap_or_default()], sep)?;
    }
    Ok(out)
}

/// Write a query file, e.g. the list of queries to reprocess.
pub async fn write_queries(path: &Path, queries: &[SearchQuery]) -> Result<(), InputError> {
    let write_error = |source| InputError::Write {
        path: path.to_path_buf(),
        source,
    };
    let bytes = render_queries(queries, separator_for(path)).map_err(write_error)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    tokio::fs::write(path, bytes).await.map_err(write_error)?;
    info!("📝 Wrote {} queries to {}", queries.len(), path.display());
    Ok(())
}
