//! Lookup-key folding shared by the storage backends.
//!
//! The host supplies normalized (canonicalized) names and emails, but the
//! casing of that canonical form is the host's choice. Both backends fold
//! lookup keys once more to lowercase so that any case variant of a
//! normalized value finds the record: the relational backend lower-cases
//! both sides of the comparison, the file backend folds keys before they
//! enter a lookup file.

/// Folds a lookup key to its canonical comparison form (lowercase).
#[must_use]
pub fn fold(key: &str) -> String {
    key.to_lowercase()
}

/// Derives the lookup-file prefix for a folded key: its first character,
/// or first two characters when the key is longer than one.
///
/// Characters outside `[0-9a-z]` are mapped to `_` so the prefix is
/// always a safe file name.
#[must_use]
pub fn lookup_prefix(folded: &str) -> String {
    folded
        .chars()
        .take(if folded.chars().count() > 1 { 2 } else { 1 })
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitizes a provider name into a safe lookup file name.
///
/// Folds to lowercase and maps everything outside `[0-9a-z]` to `_`.
#[must_use]
pub fn file_safe(name: &str) -> String {
    fold(name)
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_lowercases() {
        assert_eq!(fold("ALICE"), "alice");
        assert_eq!(fold("Bob@Example.COM"), "bob@example.com");
    }

    #[test]
    fn test_lookup_prefix_lengths() {
        assert_eq!(lookup_prefix("alice"), "al");
        assert_eq!(lookup_prefix("a"), "a");
        assert_eq!(lookup_prefix("ab"), "ab");
    }

    #[test]
    fn test_lookup_prefix_sanitizes() {
        assert_eq!(lookup_prefix("@lice"), "_l");
        assert_eq!(lookup_prefix("ü"), "_");
    }

    #[test]
    fn test_file_safe_provider_names() {
        assert_eq!(file_safe("Google"), "google");
        assert_eq!(file_safe("my provider/v2"), "my_provider_v2");
    }
}
