//! Input reading for the CLI.
//!
//! Messages to chunk come from a file or from stdin (`-`). Files larger
//! than the relay could reasonably send are rejected up front.

use crate::error::{IoError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Maximum input size accepted for chunking (64MB).
const MAX_INPUT_SIZE: u64 = 64 * 1024 * 1024;

/// Reads a UTF-8 text file.
///
/// # Arguments
///
/// * `path` - Path to the file.
///
/// # Errors
///
/// Returns an error if the file is missing, too large, unreadable, or
/// not valid UTF-8.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path_ref = path.as_ref();
    let path_str = path_ref.to_string_lossy().to_string();

    if !path_ref.exists() {
        return Err(IoError::FileNotFound { path: path_str }.into());
    }

    let mut file = File::open(path_ref).map_err(|e| IoError::ReadFailed {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;

    let size = file
        .metadata()
        .map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?
        .len();

    if size > MAX_INPUT_SIZE {
        return Err(IoError::ReadFailed {
            path: path_str,
            reason: format!("file too large: {size} bytes (max: {MAX_INPUT_SIZE} bytes)"),
        }
        .into());
    }

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| IoError::ReadFailed {
            path: path_str,
            reason: e.to_string(),
        })?;
    Ok(content)
}

/// Reads input from a path, or from stdin when the path is `-`.
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<String> {
    let path_ref = path.as_ref();
    if path_ref.as_os_str() == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .map_err(|e| IoError::ReadFailed {
                path: "<stdin>".to_string(),
                reason: e.to_string(),
            })?;
        return Ok(content);
    }
    read_file(path_ref)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Hello, world!").unwrap();
        let content = read_file(file.path()).unwrap();
        assert_eq!(content, "Hello, world!");
    }

    #[test]
    fn test_read_file_not_found() {
        let result = read_file("/nonexistent/message.md");
        assert!(matches!(
            result,
            Err(crate::Error::Io(IoError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_read_file_invalid_utf8() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
        let result = read_file(file.path());
        assert!(matches!(
            result,
            Err(crate::Error::Io(IoError::ReadFailed { .. }))
        ));
    }

    #[test]
    fn test_read_input_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "# Title\n\nBody").unwrap();
        let content = read_input(file.path()).unwrap();
        assert!(content.starts_with("# Title"));
    }
}
