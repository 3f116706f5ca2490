//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::FormEvent;
use crate::status::StatusUpdate;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to status and form event notifications
    Subscribe,

    /// A finalized utterance from the speech source
    Utterance { text: String },

    /// The speech source failed to recognize the last capture
    RecognitionError { error: String },

    /// Overwrite a form field directly (manual UI edit)
    SetField { field: String, value: String },

    /// Request the current form contents
    GetForm,

    /// Transcribe a recorded clip into a voice-input field; audio is
    /// base64-encoded WAV. Targets the focused field when `field` is
    /// omitted.
    TranscribeClip {
        field: Option<String>,
        audio: String,
    },

    /// Save the patient form through the backend
    SubmitForm,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Utterance or recognition error accepted for processing
    Accepted,

    /// Current form contents
    Form { fields: BTreeMap<String, String> },

    /// Clip transcription result, already written into the field
    Transcribed { field: String, text: String },

    /// Form saved; message is the backend's confirmation line
    Submitted { message: String },

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Status line changed
    Status { update: StatusUpdate },

    /// A form event occurred
    Event { event: FormEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether the startup delay has elapsed and utterances are processed
    pub listening: bool,

    /// Field the router is currently pointed at
    pub active_field: Option<String>,

    /// Whether dictation mode is on
    pub dictating: bool,

    /// Last status line shown to the user
    pub status_line: Option<String>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            listening: false,
            active_field: None,
            dictating: false,
            status_line: None,
            uptime_secs: 0,
        }
    }
}
