//! Identifier generation, validation and conversion.
//!
//! Stores persist identifiers in a canonical string form. Hosts whose key
//! type is not a plain string supply an [`IdCodec`] at store construction:
//! a pair of statically known conversion functions between the external
//! string representation and the canonical persisted form.

use thiserror::Error;

/// Errors produced by identifier validation and conversion.
#[derive(Debug, Error)]
pub enum IdError {
    /// The identifier was empty.
    #[error("identifier is empty")]
    Empty,

    /// The identifier exceeded the maximum length.
    #[error("identifier exceeds {max} characters")]
    TooLong {
        /// Maximum permitted length.
        max: usize,
    },

    /// The identifier contained a character outside the permitted set.
    #[error("identifier contains invalid character {0:?}")]
    InvalidCharacter(char),

    /// The identifier was not a valid UUID.
    #[error("identifier is not a valid UUID: {0}")]
    NotAUuid(String),
}

/// Maximum identifier length accepted by the stores.
///
/// Matches the 128-character key columns of the relational schema.
pub const MAX_ID_LEN: usize = 128;

/// Generates a fresh identifier: a lowercase hyphenated UUID v4.
///
/// The first two characters are always hex digits, so generated ids map
/// directly onto the file backend's two-character bucket scheme.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generates a fresh opaque concurrency stamp.
#[must_use]
pub fn new_concurrency_stamp() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates an identifier in canonical form.
///
/// Accepts ASCII alphanumerics, `-` and `_`, up to [`MAX_ID_LEN`]
/// characters. The character set keeps ids safe to embed in file paths
/// and SQL parameters alike.
///
/// # Errors
///
/// Returns an [`IdError`] describing the first violation found.
pub fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.len() > MAX_ID_LEN {
        return Err(IdError::TooLong { max: MAX_ID_LEN });
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(IdError::InvalidCharacter(c));
    }
    Ok(())
}

/// Conversion function from an externally supplied id string to the
/// canonical persisted form.
pub type DecodeId = fn(&str) -> Result<String, IdError>;

/// Conversion function from the canonical persisted form back to the
/// external representation.
pub type EncodeId = fn(&str) -> String;

/// Conversion policy between host-side identifier strings and the
/// canonical form the stores persist.
///
/// Every inbound identifier passes through [`IdCodec::decode`] before any
/// I/O, which doubles as the precondition check for malformed ids. The
/// default policy accepts opaque ids verbatim after shape validation;
/// [`IdCodec::uuid`] additionally requires a parseable UUID and
/// canonicalizes it to lowercase hyphenated form.
#[derive(Clone, Copy)]
pub struct IdCodec {
    decode: DecodeId,
    encode: EncodeId,
}

impl IdCodec {
    /// Builds a codec from an explicit conversion function pair.
    #[must_use]
    pub fn new(decode: DecodeId, encode: EncodeId) -> Self {
        Self { decode, encode }
    }

    /// Opaque-string policy: ids are persisted as supplied, after shape
    /// validation.
    #[must_use]
    pub fn opaque() -> Self {
        Self::new(
            |raw| {
                validate_id(raw)?;
                Ok(raw.to_string())
            },
            str::to_string,
        )
    }

    /// UUID policy: ids must parse as UUIDs and are canonicalized to
    /// lowercase hyphenated form.
    #[must_use]
    pub fn uuid() -> Self {
        Self::new(
            |raw| {
                let parsed =
                    uuid::Uuid::parse_str(raw).map_err(|_| IdError::NotAUuid(raw.to_string()))?;
                Ok(parsed.to_string())
            },
            str::to_string,
        )
    }

    /// Converts an external id string to canonical form.
    ///
    /// # Errors
    ///
    /// Returns an [`IdError`] when the id fails the policy's validation.
    pub fn decode(&self, raw: &str) -> Result<String, IdError> {
        (self.decode)(raw)
    }

    /// Converts a canonical id back to its external representation.
    #[must_use]
    pub fn encode(&self, id: &str) -> String {
        (self.encode)(id)
    }
}

impl Default for IdCodec {
    fn default() -> Self {
        Self::opaque()
    }
}

impl std::fmt::Debug for IdCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_bucketable() {
        let id = generate_id();
        assert_eq!(id.len(), 36);
        let bucket: Vec<char> = id.chars().take(2).collect();
        assert!(bucket.iter().all(|c| c.is_ascii_hexdigit()));
        assert!(bucket.iter().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_validate_id_accepts_common_shapes() {
        assert!(validate_id(&generate_id()).is_ok());
        assert!(validate_id("u1").is_ok());
        assert!(validate_id("user_42-a").is_ok());
    }

    #[test]
    fn test_validate_id_rejects_bad_shapes() {
        assert!(matches!(validate_id(""), Err(IdError::Empty)));
        assert!(matches!(
            validate_id("a/b"),
            Err(IdError::InvalidCharacter('/'))
        ));
        assert!(matches!(
            validate_id("a.b"),
            Err(IdError::InvalidCharacter('.'))
        ));
        let long = "x".repeat(MAX_ID_LEN + 1);
        assert!(matches!(validate_id(&long), Err(IdError::TooLong { .. })));
    }

    #[test]
    fn test_opaque_codec_passes_through() {
        let codec = IdCodec::default();
        assert_eq!(codec.decode("u1").unwrap(), "u1");
        assert_eq!(codec.encode("u1"), "u1");
        assert!(codec.decode("").is_err());
    }

    #[test]
    fn test_uuid_codec_canonicalizes() {
        let codec = IdCodec::uuid();
        let canonical = codec
            .decode("D9428888-122B-11E1-B85C-61CD3CBB3210")
            .unwrap();
        assert_eq!(canonical, "d9428888-122b-11e1-b85c-61cd3cbb3210");
        assert!(codec.decode("not-a-uuid").is_err());
    }
}
