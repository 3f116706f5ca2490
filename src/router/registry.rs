//! Spoken-phrase field registry
//!
//! Fixed table mapping command phrases to form field ids. Built once at
//! startup and never modified; phrases match normalized utterances by
//! string equality only, never by substring or fuzzy matching.

use std::collections::HashMap;

/// Immutable spoken-phrase to field-id table
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    entries: HashMap<String, String>,
}

impl FieldRegistry {
    /// Build a registry from (phrase, field id) pairs
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(phrase, field)| (phrase.into(), field.into()))
            .collect();
        Self { entries }
    }

    /// The standard eye-exam phrase table
    pub fn standard() -> Self {
        Self::new([
            ("right eye observation", "right-eye"),
            ("right comments", "right-comments"),
            ("left eye observation", "left-eye"),
            ("left comments", "left-comments"),
        ])
    }

    /// Field id for an exact phrase match
    pub fn lookup(&self, phrase: &str) -> Option<&str> {
        self.entries.get(phrase).map(String::as_str)
    }

    /// Number of registered phrases
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let registry = FieldRegistry::standard();
        assert_eq!(registry.len(), 4);
        assert!(!registry.is_empty());
        assert_eq!(registry.lookup("right eye observation"), Some("right-eye"));
        assert_eq!(registry.lookup("right comments"), Some("right-comments"));
        assert_eq!(registry.lookup("left eye observation"), Some("left-eye"));
        assert_eq!(registry.lookup("left comments"), Some("left-comments"));
    }

    #[test]
    fn test_lookup_is_exact_match_only() {
        let registry = FieldRegistry::standard();
        assert_eq!(registry.lookup("right eye"), None);
        assert_eq!(registry.lookup("right eye observation please"), None);
        assert_eq!(registry.lookup("Right Eye Observation"), None);
        assert_eq!(registry.lookup(""), None);
    }
}
