// Precondition checks, run before any process is started

use crate::error::{AppError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Source path must exist and be a regular file
pub async fn source_file(path: &Path) -> Result<()> {
    if path.to_str().is_none() {
        return Err(AppError::Validation(format!(
            "Path is not valid UTF-8: {}",
            path.display()
        )));
    }

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(AppError::Validation(format!(
            "Not a file: {}",
            path.display()
        ))),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound(path.to_path_buf())),
        Err(e) => Err(AppError::Validation(format!(
            "Cannot access {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Batch must be non-empty and every entry must pass `source_file`
pub async fn batch(paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        return Err(AppError::Validation(
            "No files specified to process".to_string(),
        ));
    }

    for path in paths {
        source_file(path).await?;
    }

    Ok(())
}
