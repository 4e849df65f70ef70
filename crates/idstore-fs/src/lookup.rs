//! Name→id lookup files.
//!
//! A lookup file is a flat sequence of alternating key/value lines. The
//! file is rewritten in full on every mutation — never appended — so no
//! stale duplicate entries can remain, and the rewrite goes through an
//! atomic replacement. A trailing unpaired line is a format error.

use std::collections::BTreeMap;
use std::path::Path;

use idstore_storage::{StorageError, StorageResult};

use crate::io::{read_optional, write_atomic};

/// Parses lookup-file contents into a key→value map.
///
/// # Errors
///
/// Returns `StorageError::InvalidRecord` when the line count is odd.
pub(crate) fn parse(contents: &str) -> StorageResult<BTreeMap<String, String>> {
    let lines: Vec<&str> = contents.lines().collect();
    if lines.len() % 2 != 0 {
        return Err(StorageError::invalid_record(
            "lookup file has a trailing unpaired line",
        ));
    }

    let mut map = BTreeMap::new();
    for pair in lines.chunks(2) {
        map.insert(pair[0].to_string(), pair[1].to_string());
    }
    Ok(map)
}

/// Renders a key→value map back into lookup-file contents.
pub(crate) fn render(map: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        out.push_str(key);
        out.push('\n');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Rejects keys and values that would corrupt the line-oriented format.
pub(crate) fn ensure_line_safe(value: &str) -> StorageResult<()> {
    if value.chars().any(|c| c == '\n' || c == '\r' || c == '\t') {
        return Err(StorageError::invalid_input(
            "lookup keys must not contain tabs or line breaks",
        ));
    }
    Ok(())
}

/// Loads a lookup file; a missing file is an empty map.
pub(crate) async fn load(path: &Path) -> StorageResult<BTreeMap<String, String>> {
    match read_optional(path).await? {
        Some(contents) => parse(&contents),
        None => Ok(BTreeMap::new()),
    }
}

/// Rewrites a lookup file in full.
pub(crate) async fn save(path: &Path, map: &BTreeMap<String, String>) -> StorageResult<()> {
    write_atomic(path, &render(map)).await
}

/// Inserts or replaces an entry. The caller must hold the file's write
/// lock.
pub(crate) async fn insert(path: &Path, key: &str, value: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_input("lookup key is empty"));
    }
    ensure_line_safe(key)?;
    ensure_line_safe(value)?;

    let mut map = load(path).await?;
    map.insert(key.to_string(), value.to_string());
    save(path, &map).await
}

/// Removes an entry if present. The caller must hold the file's write
/// lock.
pub(crate) async fn remove(path: &Path, key: &str) -> StorageResult<()> {
    let mut map = load(path).await?;
    if map.remove(key).is_some() {
        save(path, &map).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let mut map = BTreeMap::new();
        map.insert("alice".to_string(), "u1".to_string());
        map.insert("bob".to_string(), "u2".to_string());

        let rendered = render(&map);
        assert_eq!(parse(&rendered).unwrap(), map);
    }

    #[test]
    fn test_parse_rejects_odd_line_count() {
        let err = parse("alice\nu1\norphan\n").unwrap_err();
        assert!(err.is_invalid_record());
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), "2".to_string());
        a.insert("a".to_string(), "1".to_string());
        assert_eq!(render(&a), "a\n1\nb\n2\n");
        assert_eq!(render(&a), render(&a.clone()));
    }

    #[test]
    fn test_ensure_line_safe() {
        assert!(ensure_line_safe("alice").is_ok());
        assert!(ensure_line_safe("two\nlines").is_err());
        assert!(ensure_line_safe("tab\tbed").is_err());
    }

    #[tokio::test]
    async fn test_insert_rewrites_without_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("al");

        insert(&path, "alice", "u1").await.expect("insert");
        insert(&path, "alice", "u9").await.expect("replace");

        let map = load(&path).await.expect("load");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("alice").map(String::as_str), Some("u9"));
    }

    #[tokio::test]
    async fn test_rewrite_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("al");

        insert(&path, "alice", "u1").await.expect("insert");
        let first = read_optional(&path).await.expect("read").expect("some");

        insert(&path, "alice", "u1").await.expect("insert again");
        let second = read_optional(&path).await.expect("read").expect("some");

        assert_eq!(first, second);
    }
}
