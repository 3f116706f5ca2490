//! In-memory form document
//!
//! Stand-in for the clinical entry form: a fixed set of field ids with
//! string values plus the currently focused field. The voice router appends
//! dictated text into it, clip transcription replaces values, typed input
//! arrives over IPC, and submission reads the patient fields back out.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Patient fields included in a submission, in payload order
pub const SUBMIT_FIELDS: [&str; 7] = [
    "name",
    "place",
    "age",
    "gender",
    "symptoms",
    "diagnosis",
    "prescription",
];

/// Fields that accept per-clip voice input
pub const VOICE_CLIP_FIELDS: [&str; 5] = ["age", "symptoms", "diagnosis", "prescription", "place"];

/// Eye-exam fields reachable through spoken field phrases
pub const EYE_EXAM_FIELDS: [&str; 4] = ["right-eye", "right-comments", "left-eye", "left-comments"];

/// Errors from form document operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error(
        "field {0:?} does not take voice input; use one of: \
         age, symptoms, diagnosis, prescription, place"
    )]
    NotVoiceInput(String),

    #[error("no voice-input field focused")]
    NoVoiceFocus,
}

/// JSON payload for the save endpoint, one string per patient field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub name: String,
    pub place: String,
    pub age: String,
    pub gender: String,
    pub symptoms: String,
    pub diagnosis: String,
    pub prescription: String,
}

/// The form document: field values plus focus state
#[derive(Debug, Default)]
pub struct FormStore {
    values: BTreeMap<String, String>,
    focused: Option<String>,
}

impl FormStore {
    /// Create the standard clinical form (patient fields + eye-exam section)
    pub fn standard() -> Self {
        let mut values = BTreeMap::new();
        for field in SUBMIT_FIELDS.iter().chain(EYE_EXAM_FIELDS.iter()) {
            values.insert((*field).to_string(), String::new());
        }
        Self {
            values,
            focused: None,
        }
    }

    /// Current value of a field
    pub fn get(&self, field: &str) -> Result<&str, FormError> {
        self.values
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| FormError::UnknownField(field.to_string()))
    }

    /// Replace a field value
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> Result<(), FormError> {
        match self.values.get_mut(field) {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(FormError::UnknownField(field.to_string())),
        }
    }

    /// Append text to a field, space-separated when it already has content
    pub fn append(&mut self, field: &str, text: &str) -> Result<(), FormError> {
        match self.values.get_mut(field) {
            Some(slot) => {
                if !slot.is_empty() {
                    slot.push(' ');
                }
                slot.push_str(text);
                Ok(())
            }
            None => Err(FormError::UnknownField(field.to_string())),
        }
    }

    /// Move focus to a field
    pub fn focus(&mut self, field: &str) -> Result<(), FormError> {
        if !self.values.contains_key(field) {
            return Err(FormError::UnknownField(field.to_string()));
        }
        self.focused = Some(field.to_string());
        Ok(())
    }

    /// Currently focused field, if any
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Resolve the target field for a voice clip: the explicit field if
    /// given, otherwise the focused one. Must be a voice-input field.
    pub fn clip_target(&self, field: Option<&str>) -> Result<String, FormError> {
        let target = match field {
            Some(field) => field,
            None => self.focused().ok_or(FormError::NoVoiceFocus)?,
        };
        if !VOICE_CLIP_FIELDS.contains(&target) {
            return Err(FormError::NotVoiceInput(target.to_string()));
        }
        Ok(target.to_string())
    }

    /// Copy of every field value, keyed by field id
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.clone()
    }

    /// Build the patient-form payload for the save endpoint
    pub fn submission(&self) -> Submission {
        let value = |field: &str| self.get(field).unwrap_or_default().to_string();
        Submission {
            name: value("name"),
            place: value("place"),
            age: value("age"),
            gender: value("gender"),
            symptoms: value("symptoms"),
            diagnosis: value("diagnosis"),
            prescription: value("prescription"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_form_has_all_fields_empty() {
        let store = FormStore::standard();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), SUBMIT_FIELDS.len() + EYE_EXAM_FIELDS.len());
        assert!(snapshot.values().all(String::is_empty));
        assert_eq!(store.focused(), None);
    }

    #[test]
    fn test_set_replaces_value() {
        let mut store = FormStore::standard();
        store.set("symptoms", "itching").unwrap();
        store.set("symptoms", "blurred vision").unwrap();
        assert_eq!(store.get("symptoms").unwrap(), "blurred vision");
    }

    #[test]
    fn test_append_joins_with_single_space() {
        let mut store = FormStore::standard();
        store.append("left-comments", "one").unwrap();
        store.append("left-comments", "two").unwrap();
        assert_eq!(store.get("left-comments").unwrap(), "one two");
    }

    #[test]
    fn test_append_to_empty_field_has_no_leading_space() {
        let mut store = FormStore::standard();
        store.append("right-eye", "hello world").unwrap();
        assert_eq!(store.get("right-eye").unwrap(), "hello world");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut store = FormStore::standard();
        assert_eq!(
            store.set("blood-type", "AB"),
            Err(FormError::UnknownField("blood-type".to_string()))
        );
        assert_eq!(
            store.append("blood-type", "AB"),
            Err(FormError::UnknownField("blood-type".to_string()))
        );
        assert_eq!(
            store.focus("blood-type"),
            Err(FormError::UnknownField("blood-type".to_string()))
        );
    }

    #[test]
    fn test_clip_target_resolution() {
        let mut store = FormStore::standard();

        // No focus, no explicit field
        assert_eq!(store.clip_target(None), Err(FormError::NoVoiceFocus));

        // Explicit voice field
        assert_eq!(store.clip_target(Some("symptoms")).unwrap(), "symptoms");

        // Explicit non-voice field
        assert_eq!(
            store.clip_target(Some("name")),
            Err(FormError::NotVoiceInput("name".to_string()))
        );

        // Falls back to the focused field
        store.focus("diagnosis").unwrap();
        assert_eq!(store.clip_target(None).unwrap(), "diagnosis");

        // Focused field that does not take clips
        store.focus("right-eye").unwrap();
        assert_eq!(
            store.clip_target(None),
            Err(FormError::NotVoiceInput("right-eye".to_string()))
        );
    }

    #[test]
    fn test_submission_covers_patient_fields() {
        let mut store = FormStore::standard();
        store.set("name", "Jane Doe").unwrap();
        store.set("age", "43").unwrap();
        store.set("diagnosis", "allergic conjunctivitis").unwrap();

        let submission = store.submission();
        assert_eq!(submission.name, "Jane Doe");
        assert_eq!(submission.age, "43");
        assert_eq!(submission.gender, "");

        let json = serde_json::to_value(&submission).unwrap();
        for field in SUBMIT_FIELDS {
            assert!(json.get(field).is_some(), "missing {field} in payload");
        }
    }
}
