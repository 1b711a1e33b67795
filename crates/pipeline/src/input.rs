//! Input stream selection: a named file or standard input.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, BufReader};

/// Default read buffer size (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Where the newline-delimited records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// `None` or an empty path means standard input.
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) if !path.as_os_str().is_empty() => InputSource::File(path),
            _ => InputSource::Stdin,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            InputSource::Stdin => "<stdin>".to_string(),
            InputSource::File(path) => path.display().to_string(),
        }
    }

    /// Open the source as a buffered async reader.
    pub async fn open(&self, buffer_size: usize) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
        match self {
            InputSource::Stdin => Ok(Box::new(BufReader::with_capacity(
                buffer_size,
                tokio::io::stdin(),
            ))),
            InputSource::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open input file: {}", path.display()))?;
                Ok(Box::new(BufReader::with_capacity(buffer_size, file)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_from_path() {
        assert_eq!(InputSource::from_path(None), InputSource::Stdin);
        assert_eq!(
            InputSource::from_path(Some(PathBuf::new())),
            InputSource::Stdin
        );
        assert_eq!(
            InputSource::from_path(Some(PathBuf::from("data.csv"))),
            InputSource::File(PathBuf::from("data.csv"))
        );
    }

    #[tokio::test]
    async fn test_open_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("input.csv");
        std::fs::write(&file_path, "a,b\nc,d\n").unwrap();

        let source = InputSource::File(file_path);
        let reader = source.open(DEFAULT_BUFFER_SIZE).await.unwrap();
        let mut lines = reader.lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("a,b"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("c,d"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let source = InputSource::File(PathBuf::from("/nonexistent/input.csv"));
        let err = source.open(DEFAULT_BUFFER_SIZE).await.err().unwrap();
        assert!(format!("{err:#}").contains("Failed to open input file"));
    }
}
