//! Content-addressed storage for hrönir text.
//!
//! A hrönir's identity is the Blake3 hash of its text: identical content is
//! stored once, stored content is immutable, and every retrieval verifies
//! the content against its hash before returning it.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::crypto::hash_content;
use crate::ids::HronirId;

/// Maximum hrönir text size (1 MB). Narrative chapters, not blobs.
pub const MAX_CONTENT_SIZE: usize = 1024 * 1024;

/// Errors that can occur during content store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    /// Content not found for the given id.
    #[error("hronir not found: {id}")]
    NotFound {
        /// The id that was not found.
        id: HronirId,
    },

    /// Stored content no longer matches its id.
    #[error("content corruption: stored text for {id} hashes to {actual}")]
    HashMismatch {
        /// The id the content was stored under.
        id: HronirId,
        /// What the stored bytes actually hash to (hex-encoded).
        actual: String,
    },

    /// Content exceeds the maximum allowed size.
    #[error("content too large: {size} bytes exceeds maximum of {max} bytes")]
    ContentTooLarge {
        /// The actual size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// Empty content is not allowed.
    #[error("empty content is not allowed")]
    EmptyContent,
}

/// Trait for content-addressed hrönir stores.
///
/// Implementations must ensure content is verified against its hash on
/// retrieval, duplicate content deduplicates, and stored content is
/// immutable.
pub trait ContentStore: Send + Sync {
    /// Stores text and returns its content-derived id.
    ///
    /// Storing identical text again is a no-op returning the same id.
    ///
    /// # Errors
    ///
    /// - [`ContentError::EmptyContent`] if the text is empty
    /// - [`ContentError::ContentTooLarge`] if the text exceeds the limit
    fn store_text(&self, text: &str) -> Result<HronirId, ContentError>;

    /// Retrieves text by id, verifying it against the id first.
    ///
    /// # Errors
    ///
    /// - [`ContentError::NotFound`] if nothing is stored under `id`
    /// - [`ContentError::HashMismatch`] if the stored bytes no longer hash
    ///   to `id` (corruption)
    fn get_text(&self, id: &HronirId) -> Result<String, ContentError>;

    /// Whether content with the given id exists.
    fn exists(&self, id: &HronirId) -> bool;
}

/// In-memory content store.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    storage: RwLock<HashMap<HronirId, String>>,
}

impl MemoryContentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryContentStore {
    fn store_text(&self, text: &str) -> Result<HronirId, ContentError> {
        if text.is_empty() {
            return Err(ContentError::EmptyContent);
        }
        if text.len() > MAX_CONTENT_SIZE {
            return Err(ContentError::ContentTooLarge {
                size: text.len(),
                max: MAX_CONTENT_SIZE,
            });
        }

        let id = HronirId::from_bytes(hash_content(text.as_bytes()));
        let mut storage = self.storage.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        storage.entry(id).or_insert_with(|| text.to_string());
        Ok(id)
    }

    fn get_text(&self, id: &HronirId) -> Result<String, ContentError> {
        let storage = self.storage.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        let text = storage.get(id).ok_or(ContentError::NotFound { id: *id })?;

        let actual = hash_content(text.as_bytes());
        if actual != *id.as_bytes() {
            return Err(ContentError::HashMismatch {
                id: *id,
                actual: hex::encode(actual),
            });
        }
        Ok(text.clone())
    }

    fn exists(&self, id: &HronirId) -> bool {
        self.storage
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(id)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_store_and_retrieve() {
        let store = MemoryContentStore::new();
        let id = store.store_text("hronir of the second degree").expect("store");
        assert!(store.exists(&id));
        assert_eq!(store.get_text(&id).expect("get"), "hronir of the second degree");
    }

    #[test]
    fn test_identical_text_deduplicates() {
        let store = MemoryContentStore::new();
        let a = store.store_text("mirror").expect("store");
        let b = store.store_text("mirror").expect("store");
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let store = MemoryContentStore::new();
        assert!(matches!(
            store.store_text(""),
            Err(ContentError::EmptyContent)
        ));
        let big = "x".repeat(MAX_CONTENT_SIZE + 1);
        assert!(matches!(
            store.store_text(&big),
            Err(ContentError::ContentTooLarge { .. })
        ));
    }

    #[test]
    fn test_missing_content() {
        let store = MemoryContentStore::new();
        let id = HronirId::from_bytes([0xee; 32]);
        assert!(!store.exists(&id));
        assert!(matches!(
            store.get_text(&id),
            Err(ContentError::NotFound { .. })
        ));
    }
}
