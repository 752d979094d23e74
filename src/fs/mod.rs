pub mod cmd;

use std::path::Path;

use anyhow::{Context as _, Result};

/// Whether a directory exists and contains no entries.
///
/// Used as the gate for auto-mounting over a path: a non-empty directory
/// means something already lives there and we must not shadow it.
pub async fn dir_is_empty(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();

    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("Failed to read directory {path:?}"))?;

    Ok(entries.next_entry().await?.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(dir_is_empty(dir.path()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_empty_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("keep"), b"x").await?;
        assert!(!dir_is_empty(dir.path()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(dir_is_empty(&missing).await.is_err());
    }
}
