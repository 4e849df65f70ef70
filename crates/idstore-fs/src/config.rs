//! Configuration types for the flat-file storage backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the flat-file storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Base directory of the identity store tree.
    pub base_path: PathBuf,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./idstore-data"),
        }
    }
}

impl FilesystemConfig {
    /// Creates a configuration rooted at the given base path.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let config = FilesystemConfig::new("/var/lib/idstore");
        assert_eq!(config.base_path, PathBuf::from("/var/lib/idstore"));
    }

    #[test]
    fn test_config_serialization() {
        let config = FilesystemConfig::new("/data");
        let json = serde_json::to_string(&config).expect("serialization failed");
        let deserialized: FilesystemConfig =
            serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(config.base_path, deserialized.base_path);
    }
}
