use std::path::Path;

use tokio::fs;

use crate::error::PortalError;

/// Write `contents` to `path`, creating parent directories as needed.
///
/// The bytes land in a sibling temp file first and are renamed into place, so a
/// reader (or a cancelled run) never observes a half-written file. An existing
/// file at `path` is replaced.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PortalError> {
    let io_err = |source| PortalError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp, contents).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("sites/abc123/pages/home.json");

        write_atomic(&path, br#"{"friendlyId":"home"}"#).await.unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, br#"{"friendlyId":"home"}"#);
    }

    #[tokio::test]
    async fn test_write_overwrites_and_leaves_no_temp_files() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("site.json");

        write_atomic(&path, b"{\"v\":1}").await.unwrap();
        write_atomic(&path, b"{\"v\":2}").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{\"v\":2}");
        let entries: Vec<_> = std::fs::read_dir(root.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["site.json".to_string()]);
    }

    #[tokio::test]
    async fn test_write_reports_path_on_failure() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("customcss");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("customcss.json");

        let err = write_atomic(&path, b"{}").await.unwrap_err();
        assert!(matches!(err, PortalError::Io { .. }));
        assert!(err.to_string().contains("customcss.json"));
    }
}
