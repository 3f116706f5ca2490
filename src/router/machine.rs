//! Core voice command router
//!
//! Consumes finalized utterances one at a time and either switches the
//! active field, toggles dictation, or appends dictated text to the active
//! field's value. Command phrases always win over dictation content: an
//! utterance that matches "start", "stop", or a registry phrase is never
//! written into a field.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::events::FormEvent;
use crate::form::FormStore;
use crate::status::{StatusColor, StatusSink};

use super::registry::FieldRegistry;

/// Normalize a raw utterance: trim, lowercase, and rewrite the standalone
/// word "i" to "eye" (recognizers reliably mishear the eye-exam field
/// phrases that way). Idempotent.
pub fn normalize(raw: &str) -> String {
    rewrite_standalone_i(&raw.trim().to_lowercase())
}

/// Word characters for boundary detection
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn rewrite_standalone_i(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut word = String::new();
    for c in text.chars() {
        if is_word_char(c) {
            word.push(c);
        } else {
            flush_word(&mut out, &mut word);
            out.push(c);
        }
    }
    flush_word(&mut out, &mut word);
    out
}

fn flush_word(out: &mut String, word: &mut String) {
    if word == "i" {
        out.push_str("eye");
    } else {
        out.push_str(word);
    }
    word.clear();
}

/// The router that turns utterances into field switches and dictated text
pub struct Router {
    registry: FieldRegistry,
    store: Arc<RwLock<FormStore>>,
    status: StatusSink,
    /// Channel for emitting form events
    event_tx: broadcast::Sender<FormEvent>,
    /// Field selected by the last matched phrase; none until one is heard
    active_field: Option<String>,
    /// Dictation flag; only ever true while a field is active
    dictating: bool,
    /// Time dictation was entered, for duration reporting
    dictation_started_at: Option<Instant>,
    /// Turns true once the startup delay has elapsed
    listening: Arc<AtomicBool>,
    startup_delay: Duration,
}

impl Router {
    /// Create a router in its initial state: no field, not dictating
    pub fn new(
        registry: FieldRegistry,
        store: Arc<RwLock<FormStore>>,
        status: StatusSink,
        event_tx: broadcast::Sender<FormEvent>,
        startup_delay: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            status,
            event_tx,
            active_field: None,
            dictating: false,
            dictation_started_at: None,
            listening: Arc::new(AtomicBool::new(false)),
            startup_delay,
        }
    }

    /// Shared flag that turns true once the router consumes utterances
    pub fn listening_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.listening)
    }

    /// Currently selected field
    pub fn active_field(&self) -> Option<&str> {
        self.active_field.as_deref()
    }

    /// Whether dictation mode is on
    pub fn is_dictating(&self) -> bool {
        self.dictating
    }

    /// Run the router: wait out the startup delay, discard anything that
    /// arrived during it, then process utterances until the channel closes
    pub async fn run(&mut self, mut utterance_rx: mpsc::Receiver<String>) {
        tokio::time::sleep(self.startup_delay).await;

        let mut discarded = 0usize;
        while utterance_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "dropped utterances from the startup window");
        }

        self.listening.store(true, Ordering::SeqCst);
        self.status.set("Listening...", StatusColor::Green);
        info!(
            delay_ms = self.startup_delay.as_millis() as u64,
            "voice router listening"
        );

        while let Some(utterance) = utterance_rx.recv().await {
            self.process_utterance(&utterance).await;
        }

        info!("voice router stopped");
    }

    /// Process one finalized utterance
    pub async fn process_utterance(&mut self, raw: &str) {
        let text = normalize(raw);
        if text.is_empty() {
            return;
        }
        debug!(heard = %text, "utterance");

        if text == "start" {
            if self.active_field.is_some() {
                self.begin_dictation();
            } else {
                // Same outcome as an unmatched utterance: dropped
                debug!("start ignored: no field selected yet");
            }
        } else if text == "stop" {
            self.end_dictation();
        } else if let Some(field) = self.registry.lookup(&text).map(str::to_string) {
            self.select_field(&text, field).await;
        } else if self.dictating && self.active_field.is_some() {
            self.append_dictation(&text).await;
        } else {
            debug!(heard = %text, "utterance dropped");
        }
    }

    fn begin_dictation(&mut self) {
        let Some(field) = self.active_field.clone() else {
            return;
        };
        if !self.dictating {
            self.dictating = true;
            self.dictation_started_at = Some(Instant::now());
            info!(%field, "dictation started");
            self.emit(FormEvent::DictationStarted {
                field: field.clone(),
            });
        }
        self.status
            .set(format!("Dictating into {field}..."), StatusColor::Green);
    }

    fn end_dictation(&mut self) {
        if self.dictating {
            let duration_ms = self
                .dictation_started_at
                .take()
                .map(|entered| entered.elapsed().as_millis() as u64)
                .unwrap_or(0);
            self.dictating = false;
            info!(duration_ms, "dictation stopped");
            self.emit(FormEvent::DictationStopped { duration_ms });
        }
        self.status.set(
            "Dictation stopped. Say a field name to switch.",
            StatusColor::Green,
        );
    }

    /// Switch the active field and move the form focus to it. Dictation
    /// stays on across a switch; only "stop" turns it off.
    async fn select_field(&mut self, phrase: &str, field: String) {
        if let Err(e) = self.store.write().await.focus(&field) {
            warn!(%field, error = %e, "registry phrase points at a missing field");
            return;
        }
        self.active_field = Some(field.clone());
        info!(%phrase, %field, "field selected");
        self.emit(FormEvent::FieldSelected {
            field: field.clone(),
        });
        self.status.set(
            format!("Focused on: {phrase}. Say \"start\" to begin."),
            StatusColor::Green,
        );
    }

    async fn append_dictation(&mut self, text: &str) {
        let Some(field) = self.active_field.clone() else {
            return;
        };
        let result = self.store.write().await.append(&field, text);
        match result {
            Ok(()) => {
                debug!(%field, chars = text.len(), "dictated text appended");
                self.emit(FormEvent::FieldAppended {
                    field: field.clone(),
                });
            }
            Err(e) => warn!(%field, error = %e, "append failed"),
        }
    }

    fn emit(&self, event: FormEvent) {
        debug!(?event, "emitting form event");
        let _ = self.event_tx.send(event);
    }
}
