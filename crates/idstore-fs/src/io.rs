//! Small file I/O helpers shared by the record and lookup modules.

use std::path::Path;

use idstore_storage::{StorageError, StorageResult};

/// Maps an I/O error into the storage taxonomy with a short context.
pub(crate) fn io_err(context: &str, err: std::io::Error) -> StorageError {
    StorageError::internal(format!("{context}: {err}"))
}

/// Reads a file to a string, mapping a missing file to `None`.
pub(crate) async fn read_optional(path: &Path) -> StorageResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err("reading file", e)),
    }
}

/// Replaces a file atomically: the contents are written to a sibling
/// temp file which is then renamed over the target. Callers serialize
/// writers per path, so the fixed temp name cannot collide.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> StorageResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::internal(format!("invalid file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| io_err("writing temp file", e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_err("replacing file", e))?;
    Ok(())
}

/// Removes a file; returns whether it existed.
pub(crate) async fn remove_optional(path: &Path) -> StorageResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err("removing file", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_optional_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent");
        assert!(read_optional(&path).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("f");

        write_atomic(&path, "one").await.expect("write");
        write_atomic(&path, "two").await.expect("rewrite");

        let contents = read_optional(&path).await.expect("read").expect("some");
        assert_eq!(contents, "two");
        // No temp file is left behind.
        assert!(read_optional(&dir.path().join("f.tmp")).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_remove_optional() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("f");
        write_atomic(&path, "x").await.expect("write");

        assert!(remove_optional(&path).await.expect("remove"));
        assert!(!remove_optional(&path).await.expect("remove again"));
    }
}
