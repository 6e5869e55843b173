//! Result presentation and selection.

use std::io::{BufRead, Write};

use crate::{Book, Result, SearchError};

/// Marker appended to truncated text.
pub const TRUNCATION_MARKER: char = '…';

/// Terminal width the column layout is designed for.
pub const DEFAULT_WIDTH: usize = 80;

/// Outcome of a selection prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 0-based index into the result list.
    Chosen(usize),
    /// The user declined or typed something that is not a valid choice.
    Cancelled,
}

/// Shortens `s` to `n` characters, ending with [`TRUNCATION_MARKER`] when cut.
pub fn truncate(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    if s.chars().count() <= n {
        return s.to_string();
    }
    let mut out: String = s.chars().take(n.saturating_sub(1)).collect();
    out.push(TRUNCATION_MARKER);
    out
}

/// Truncates `s` to `n` characters and right-pads it with spaces to exactly `n`.
pub fn pad(s: &str, n: usize) -> String {
    let t = truncate(s, n);
    let len = t.chars().count();
    format!("{}{}", t, " ".repeat(n.saturating_sub(len)))
}

/// Column widths for a terminal `width` characters wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    /// Title column width.
    pub title: usize,
    /// Author column width.
    pub author: usize,
    /// Format column width, brackets included.
    pub format: usize,
    /// Source engine column width.
    pub source: usize,
}

impl Columns {
    /// Scales the 80-column layout to `width`.
    pub fn for_width(width: usize) -> Self {
        let scale = |share: usize, min: usize| (width * share / DEFAULT_WIDTH).max(min);
        Self {
            title: scale(40, 10),
            author: scale(20, 5),
            format: scale(7, 6),
            source: scale(10, 4),
        }
    }
}

/// Renders one table line per book, numbered from 1.
///
/// Books in a preferred format are flagged with `*`.
pub fn render_table(books: &[Book], preferred: &[String], width: usize) -> Vec<String> {
    let columns = Columns::for_width(width);
    books
        .iter()
        .enumerate()
        .map(|(i, book)| {
            format!(
                "[{}]{} {} {} {} {}",
                pad(&(i + 1).to_string(), 2),
                if book.has_format(preferred) { "*" } else { " " },
                pad(&book.title, columns.title),
                pad(&book.author, columns.author),
                pad(&format!("[{}]", book.format), columns.format),
                pad(&book.source, columns.source),
            )
            .trim_end()
            .to_string()
        })
        .collect()
}

/// Renders the books as an HTML table with the source linked to the locator.
pub fn render_html(books: &[Book]) -> String {
    let rows: String = books
        .iter()
        .map(|book| {
            format!(
                "\n    <tr>\n      <td>{}</td>\n      <td>{}</td>\n      <td>{}</td>\n      <td><a href='{}'>{}</a></td>\n    </tr>",
                escape_html(&book.title),
                escape_html(&book.author),
                escape_html(&book.format),
                escape_html(&book.locator),
                escape_html(&book.source),
            )
        })
        .collect();
    format!(
        "<table>\n  <thead>\n    <tr><th>Title</th><th>Author</th><th>Format</th><th>Source</th></tr>\n  </thead>\n  <tbody>{rows}\n  </tbody>\n</table>"
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
}

/// Parses a 1-based choice typed by the user.
pub fn parse_choice(input: &str, count: usize) -> Selection {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Selection::Chosen(n - 1),
        _ => Selection::Cancelled,
    }
}

/// Prints the table to `output` and reads one choice from `input`.
///
/// End of input, non-numeric text and out-of-range numbers all cancel.
pub fn select_interactive<R: BufRead, W: Write>(
    books: &[Book],
    preferred: &[String],
    width: usize,
    mut input: R,
    mut output: W,
) -> Result<Selection> {
    if books.is_empty() {
        return Ok(Selection::Cancelled);
    }

    for line in render_table(books, preferred, width) {
        writeln!(output, "{line}")?;
    }
    write!(output, "Choose a book [1-{}]: ", books.len())?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(Selection::Cancelled);
    }
    Ok(parse_choice(&line, books.len()))
}

/// Picks the first book whose format is in `formats`, trying formats in order.
pub fn select_first_format(books: &[Book], formats: &[String]) -> Result<usize> {
    formats
        .iter()
        .find_map(|format| {
            books
                .iter()
                .position(|book| book.format.eq_ignore_ascii_case(format))
        })
        .ok_or_else(|| SearchError::NoMatchingFormat(formats.to_vec()))
}

/// Validates a 1-based index given on the command line.
pub fn select_index(books: &[Book], index: usize) -> Result<usize> {
    if index == 0 || index > books.len() {
        return Err(SearchError::InvalidSelection {
            index,
            count: books.len(),
        });
    }
    Ok(index - 1)
}
