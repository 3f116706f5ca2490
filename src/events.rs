//! Form events emitted by the daemon
//!
//! Structured transition events for the voice router and the form flows.
//! Subscribed front-ends receive them as notifications; a UI moves its
//! focus on `FieldSelected` and refreshes a field on `FieldReplaced`.

use serde::{Deserialize, Serialize};

/// Events describing what just happened to the form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormEvent {
    /// A spoken field phrase switched the active field
    FieldSelected {
        field: String,
    },

    /// Dictation began into the active field
    DictationStarted {
        field: String,
    },

    /// Dictation ended
    DictationStopped {
        /// Duration in milliseconds that dictation was active
        duration_ms: u64,
    },

    /// Dictated text was appended to a field
    FieldAppended {
        field: String,
    },

    /// A transcribed audio clip replaced a field value
    FieldReplaced {
        field: String,
    },

    /// The form was sent to the save endpoint
    FormSubmitted,
}

impl std::fmt::Display for FormEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormEvent::FieldSelected { field } => write!(f, "FIELD_SELECTED ({})", field),
            FormEvent::DictationStarted { field } => write!(f, "DICTATION_STARTED ({})", field),
            FormEvent::DictationStopped { duration_ms } => {
                write!(f, "DICTATION_STOPPED ({}ms)", duration_ms)
            }
            FormEvent::FieldAppended { field } => write!(f, "FIELD_APPENDED ({})", field),
            FormEvent::FieldReplaced { field } => write!(f, "FIELD_REPLACED ({})", field),
            FormEvent::FormSubmitted => write!(f, "FORM_SUBMITTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = FormEvent::DictationStopped { duration_ms: 2300 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("dictation_stopped"));
        assert!(json.contains("2300"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"field_selected","field":"right-eye"}"#;
        let event: FormEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, FormEvent::FieldSelected { field } if field == "right-eye"));
    }

    #[test]
    fn test_event_display() {
        let event = FormEvent::FieldAppended {
            field: "left-comments".to_string(),
        };
        assert_eq!(event.to_string(), "FIELD_APPENDED (left-comments)");
    }
}
