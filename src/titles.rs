//! Title list loading

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading a titles file
#[derive(Debug, Error)]
pub enum TitlesError {
    /// The file does not exist
    #[error("Titles file not found: {0}")]
    NotFound(PathBuf),
    /// The file could not be read
    #[error("Failed to read titles file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Parse newline-delimited titles, skipping blanks and `#` comments.
///
/// # Examples
///
/// ```
/// use autosend::titles::parse_titles;
/// let titles = parse_titles("Dark\n\n# watched\n  Lost  \n");
/// assert_eq!(titles, vec!["Dark", "Lost"]);
/// ```
#[must_use]
pub fn parse_titles(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load titles from a UTF-8 file.
///
/// # Errors
///
/// Returns `TitlesError::NotFound` if the file is missing, or `Io` for any
/// other read failure (including invalid UTF-8).
pub async fn load_titles(path: impl AsRef<Path>) -> Result<Vec<String>, TitlesError> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(parse_titles(&raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TitlesError::NotFound(path.to_path_buf()))
        }
        Err(source) => Err(TitlesError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handles_crlf_and_comments() {
        let raw = "Тьма\r\n   \r\n#skip me\r\n  # also skipped\r\nLost (2004)\r\n";
        assert_eq!(parse_titles(raw), vec!["Тьма", "Lost (2004)"]);
    }

    #[tokio::test]
    async fn test_load_titles_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("titles.txt");
        tokio::fs::write(&path, "Dark\nLost\n").await?;

        assert_eq!(load_titles(&path).await?, vec!["Dark", "Lost"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = load_titles(dir.path().join("absent.txt")).await;
        assert!(matches!(result, Err(TitlesError::NotFound(_))));
        Ok(())
    }
}
