//! Filesystem helpers for job inputs and intermediate artifacts.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::builder::concat_list;
use crate::error::{MediaError, MediaResult};

/// Check that `path` names an existing file.
pub async fn validate_file(path: impl AsRef<Path>) -> MediaResult<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(MediaError::validation("file path is empty"));
    }
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(MediaError::validation(format!(
            "not a regular file: {}",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(MediaError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Write a concat demuxer list for `inputs` into `dir` and return its path.
///
/// Inputs are made absolute so the list resolves independently of its location.
pub async fn write_concat_list(dir: &Path, name: &str, inputs: &[PathBuf]) -> MediaResult<PathBuf> {
    let mut absolute = Vec::with_capacity(inputs.len());
    for input in inputs {
        absolute.push(std::path::absolute(input)?);
    }

    fs::create_dir_all(dir).await?;
    let list_path = dir.join(format!("{name}_concat.txt"));
    fs::write(&list_path, concat_list(&absolute)?).await?;
    Ok(list_path)
}

/// Remove a file, logging instead of failing.
pub async fn remove_quietly(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_validate_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp4");
        fs::write(&file, b"x").await.unwrap();

        assert!(validate_file(&file).await.is_ok());
        assert!(matches!(
            validate_file(dir.path().join("missing.mp4")).await,
            Err(MediaError::FileNotFound(_))
        ));
        assert!(matches!(validate_file(dir.path()).await, Err(MediaError::Validation(_))));
        assert!(matches!(validate_file("").await, Err(MediaError::Validation(_))));
    }

    #[tokio::test]
    async fn test_write_concat_list() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");

        let list = write_concat_list(dir.path(), "job1", &[a.clone(), b.clone()])
            .await
            .unwrap();
        assert_eq!(list, dir.path().join("job1_concat.txt"));

        let contents = fs::read_to_string(&list).await.unwrap();
        assert_eq!(
            contents,
            format!("file '{}'\nfile '{}'\n", a.display(), b.display())
        );
    }

    #[tokio::test]
    async fn test_remove_quietly() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("tmp.mp4");
        fs::write(&file, b"x").await.unwrap();

        remove_quietly(&file).await;
        assert!(!file.exists());
        // missing files are ignored
        remove_quietly(&file).await;
    }
}
