//! Conversion to Kindle formats through an external program.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{book_filename, Book, FormatOrigin, Result, SearchError};

/// Formats a Kindle accepts by mail without conversion.
pub const KINDLE_NATIVE_FORMATS: [&str; 5] = ["mobi", "azw", "azw3", "txt", "pdf"];

/// Default conversion program (calibre's command line converter).
pub const DEFAULT_CONVERTER: &str = "ebook-convert";

/// Format produced for formats a Kindle cannot read.
pub const TARGET_FORMAT: &str = "mobi";

/// Whether a book in `format` has to be converted before sending.
pub fn needs_conversion(format: &str) -> bool {
    !KINDLE_NATIVE_FORMATS
        .iter()
        .any(|native| native.eq_ignore_ascii_case(format))
}

/// How the converter expects its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterStyle {
    /// `program <input>`; output lands next to the input (kindlegen).
    InputOnly,
    /// `program <input> <output>` (calibre `ebook-convert`).
    InputOutput,
}

impl ConverterStyle {
    /// Guesses the argument style from the program name.
    pub fn for_program(program: &str) -> Self {
        let stem = Path::new(program)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(program);
        if stem == "ebook-convert" {
            ConverterStyle::InputOutput
        } else {
            ConverterStyle::InputOnly
        }
    }
}

/// Runs an external converter and checks that it produced its output.
///
/// The converter's exit status is not trusted (kindlegen exits non-zero on
/// warnings); success means the expected output file exists afterwards.
#[derive(Debug, Clone)]
pub struct Converter {
    program: String,
    style: ConverterStyle,
}

impl Converter {
    /// Creates a converter for `program`, guessing its argument style.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let style = ConverterStyle::for_program(&program);
        Self { program, style }
    }

    /// Overrides the argument style.
    pub fn with_style(mut self, style: ConverterStyle) -> Self {
        self.style = style;
        self
    }

    /// Returns the program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Where the converted file for `input` is expected.
    pub fn output_path(input: &Path, target_format: &str) -> PathBuf {
        input.with_extension(target_format)
    }

    /// Converts `input` to `target_format` and returns the output path.
    pub async fn convert(&self, input: &Path, target_format: &str) -> Result<PathBuf> {
        let output = Self::output_path(input, target_format);
        if output == input {
            return Ok(output);
        }

        let mut command = Command::new(&self.program);
        command.arg(input);
        if self.style == ConverterStyle::InputOutput {
            command.arg(&output);
        }

        info!("Converting {} with {}", input.display(), self.program);
        let result = command.output().await.map_err(|e| SearchError::Conversion {
            input: input.to_path_buf(),
            reason: format!("could not run {}: {e}", self.program),
        })?;

        if !result.status.success() {
            warn!("{} exited with {}", self.program, result.status);
        }
        debug!("{} stdout: {}", self.program, String::from_utf8_lossy(&result.stdout));

        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            Ok(output)
        } else {
            Err(SearchError::Conversion {
                input: input.to_path_buf(),
                reason: format!(
                    "{} did not produce {} ({})",
                    self.program,
                    output.display(),
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            })
        }
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERTER)
    }
}

/// The sniffed format wins over one the engine only assumed.
pub fn effective_format(book: &Book, detected: Option<&str>) -> String {
    match detected {
        Some(detected) if book.format_origin == FormatOrigin::Assumed => detected.to_string(),
        _ => book.format.clone(),
    }
}

/// A downloaded book ready to be attached to a mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// File to attach.
    pub path: PathBuf,
    /// Format of `path`.
    pub format: String,
    /// Attachment file name shown to the recipient.
    pub attachment_name: String,
    /// Every file created on the way, the download included.
    pub temp_files: Vec<PathBuf>,
}

/// Turns a download into something a Kindle accepts.
///
/// When the bytes turned out to be another format than the one the file
/// was saved under, the file is renamed to the detected extension first,
/// so the converter never sees its input and output as the same path.
pub async fn prepare_for_kindle(
    converter: &Converter,
    book: &Book,
    downloaded: &Path,
    detected: Option<&str>,
) -> Result<Prepared> {
    let mut format = effective_format(book, detected);
    let mut path = downloaded.to_path_buf();

    let extension = downloaded.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if !extension.eq_ignore_ascii_case(&format) {
        path = downloaded.with_extension(&format);
        debug!("Renaming {} to {}", downloaded.display(), path.display());
        tokio::fs::rename(downloaded, &path).await?;
    }
    let mut temp_files = vec![path.clone()];

    if needs_conversion(&format) {
        let converted = converter.convert(&path, TARGET_FORMAT).await?;
        temp_files.push(converted.clone());
        path = converted;
        format = TARGET_FORMAT.to_string();
    }

    Ok(Prepared {
        attachment_name: book_filename(book, &format),
        path,
        format,
        temp_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_conversion() {
        assert!(needs_conversion("epub"));
        assert!(needs_conversion("djvu"));
        assert!(!needs_conversion("mobi"));
        assert!(!needs_conversion("AZW3"));
        assert!(!needs_conversion("pdf"));
    }

    #[test]
    fn test_style_for_program() {
        assert_eq!(ConverterStyle::for_program("ebook-convert"), ConverterStyle::InputOutput);
        assert_eq!(
            ConverterStyle::for_program("/opt/calibre/ebook-convert"),
            ConverterStyle::InputOutput
        );
        assert_eq!(ConverterStyle::for_program("kindlegen"), ConverterStyle::InputOnly);
    }

    #[test]
    fn test_output_path_same_basename() {
        assert_eq!(
            Converter::output_path(Path::new("/tmp/.booksnake_1.epub"), "mobi"),
            PathBuf::from("/tmp/.booksnake_1.mobi")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_input_output_style() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("book.epub");
        std::fs::write(&input, b"epub bytes").unwrap();

        let converter = Converter::new("cp").with_style(ConverterStyle::InputOutput);
        let output = converter.convert(&input, "mobi").await.unwrap();

        assert_eq!(output, dir.path().join("book.mobi"));
        assert_eq!(std::fs::read(&output).unwrap(), b"epub bytes");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_missing_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("book.epub");
        std::fs::write(&input, b"epub bytes").unwrap();

        let err = Converter::new("true").convert(&input, "mobi").await.unwrap_err();

        match err {
            SearchError::Conversion { input: failed, reason } => {
                assert_eq!(failed, input);
                assert!(reason.contains("did not produce"));
            }
            other => panic!("expected conversion error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_convert_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("book.epub");
        std::fs::write(&input, b"x").unwrap();

        let err = Converter::new("booksnake-no-such-converter")
            .convert(&input, "mobi")
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Conversion { reason, .. } if reason.contains("could not run")));
    }

    #[test]
    fn test_effective_format_prefers_sniffed_for_assumed() {
        let assumed = Book::new("t", "a", "mobi", "Gutenberg", "u").assumed_format();
        let listed = Book::new("t", "a", "mobi", "LibGen", "u");
        assert_eq!(effective_format(&assumed, Some("epub")), "epub");
        assert_eq!(effective_format(&assumed, None), "mobi");
        assert_eq!(effective_format(&listed, Some("epub")), "mobi");
    }

    #[tokio::test]
    async fn test_prepare_matching_format_sends_download() {
        let dir = tempfile::tempdir().unwrap();
        let download = dir.path().join(".booksnake_1.mobi");
        std::fs::write(&download, b"BOOKMOBI").unwrap();
        let book = Book::new("Moby-Dick", "Melville", "mobi", "Gutenberg", "u").assumed_format();

        let prepared = prepare_for_kindle(
            &Converter::new("booksnake-no-such-converter"),
            &book,
            &download,
            Some("mobi"),
        )
        .await
        .unwrap();

        assert_eq!(prepared.path, download);
        assert_eq!(prepared.format, "mobi");
        assert_eq!(prepared.attachment_name, "Moby-Dick.mobi");
        assert_eq!(prepared.temp_files, vec![download]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_prepare_mislabeled_download_is_converted() {
        let dir = tempfile::tempdir().unwrap();
        let download = dir.path().join(".booksnake_1.mobi");
        std::fs::write(&download, b"epub bytes").unwrap();
        let book = Book::new("Moby-Dick", "Melville", "mobi", "Gutenberg", "u").assumed_format();
        let converter = Converter::new("cp").with_style(ConverterStyle::InputOutput);

        let prepared = prepare_for_kindle(&converter, &book, &download, Some("epub"))
            .await
            .unwrap();

        let epub = dir.path().join(".booksnake_1.epub");
        assert_eq!(prepared.path, download);
        assert_eq!(prepared.format, "mobi");
        assert_eq!(prepared.attachment_name, "Moby-Dick.mobi");
        assert_eq!(prepared.temp_files, vec![epub.clone(), download.clone()]);
        assert_eq!(std::fs::read(&epub).unwrap(), b"epub bytes");
        assert_eq!(std::fs::read(&download).unwrap(), b"epub bytes");
    }

    #[tokio::test]
    async fn test_prepare_mislabeled_download_fails_without_converter() {
        let dir = tempfile::tempdir().unwrap();
        let download = dir.path().join(".booksnake_1.mobi");
        std::fs::write(&download, b"epub bytes").unwrap();
        let book = Book::new("Moby-Dick", "Melville", "mobi", "Gutenberg", "u").assumed_format();

        let err = prepare_for_kindle(
            &Converter::new("booksnake-no-such-converter"),
            &book,
            &download,
            Some("epub"),
        )
        .await
        .unwrap_err();

        match err {
            SearchError::Conversion { input, .. } => {
                assert_eq!(input, dir.path().join(".booksnake_1.epub"))
            }
            other => panic!("expected conversion error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_convert_same_format_is_noop() {
        let input = Path::new("/nonexistent/book.mobi");
        let output = Converter::default().convert(input, "mobi").await.unwrap();
        assert_eq!(output, input);
    }
}
