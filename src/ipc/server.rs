//! Unix domain socket server for IPC
//!
//! Provides request-response communication with the speech source and UI,
//! plus push notifications (status lines and form events) for subscribed
//! clients.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, BackendClient};
use crate::events::FormEvent;
use crate::form::{FormError, FormStore};
use crate::status::{StatusColor, StatusSink, StatusUpdate};

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// Clip audio arrives base64-encoded inside a single frame, so the cap is
/// sized for audio rather than control messages
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Shared context the server needs to process requests
pub struct ServerCtx {
    /// Where accepted utterances go (consumed by the router)
    pub utterance_tx: mpsc::Sender<String>,
    pub store: Arc<RwLock<FormStore>>,
    pub backend: Arc<BackendClient>,
    pub status: StatusSink,
    pub event_tx: broadcast::Sender<FormEvent>,
    /// True once the router's startup delay has elapsed
    pub listening: Arc<AtomicBool>,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    ctx: Arc<ServerCtx>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Router state mirrored for status queries
struct ServerState {
    active_field: Option<String>,
    dictating: bool,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, ctx: ServerCtx) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            active_field: None,
            dictating: false,
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            ctx: Arc::new(ctx),
            shutdown_tx,
        })
    }

    /// Mirror a form event into the status snapshot
    pub async fn apply_event(&self, event: &FormEvent) {
        let mut state = self.state.write().await;
        match event {
            FormEvent::FieldSelected { field } => {
                state.active_field = Some(field.clone());
            }
            FormEvent::DictationStarted { .. } => {
                state.dictating = true;
            }
            FormEvent::DictationStopped { .. } => {
                state.dictating = false;
            }
            _ => {}
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let ctx = Arc::clone(&self.ctx);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, ctx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        ctx: Arc<ServerCtx>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_FRAME_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            // A malformed frame fails this request only; the connection and
            // routing state stay intact
            let request: Request = match serde_json::from_slice(&msg_buf) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "unparsable request frame");
                    let response = Response::Error {
                        code: "bad_request".to_string(),
                        message: e.to_string(),
                    };
                    Self::send_message(&mut stream, &response).await?;
                    continue;
                }
            };

            debug!(?request, "received request");

            // A subscribed connection becomes a push-only stream. Receivers
            // are created before the reply so nothing sent after the client
            // sees Subscribed can be missed.
            if matches!(request, Request::Subscribe) {
                let status_rx = ctx.status.subscribe();
                let event_rx = ctx.event_tx.subscribe();
                Self::send_message(&mut stream, &Response::Subscribed).await?;
                debug!("client subscribed to notifications");
                return Self::stream_notifications(stream, status_rx, event_rx).await;
            }

            let response = Self::process_request(request, &state, &ctx).await;
            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Forward status updates and form events until the client goes away
    async fn stream_notifications(
        mut stream: UnixStream,
        mut status_rx: broadcast::Receiver<StatusUpdate>,
        mut event_rx: broadcast::Receiver<FormEvent>,
    ) -> Result<()> {
        loop {
            let notification = tokio::select! {
                update = status_rx.recv() => match update {
                    Ok(update) => Notification::Status { update },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "status stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
                event = event_rx.recv() => match event {
                    Ok(event) => Notification::Event { event },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event stream lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
            };
            Self::send_message(&mut stream, &notification).await?;
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        ctx: &Arc<ServerCtx>,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let state = state.read().await;
                Response::Status(DaemonStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    listening: ctx.listening.load(Ordering::SeqCst),
                    active_field: state.active_field.clone(),
                    dictating: state.dictating,
                    status_line: ctx.status.latest().map(|update| update.text),
                    uptime_secs: state.start_time.elapsed().as_secs(),
                })
            }

            // Intercepted in handle_client; answered here for completeness
            Request::Subscribe => Response::Subscribed,

            Request::Utterance { text } => {
                if ctx.utterance_tx.send(text).await.is_err() {
                    error!("router channel closed, dropping utterance");
                    Response::Error {
                        code: "router_down".to_string(),
                        message: "utterance router is not running".to_string(),
                    }
                } else {
                    Response::Accepted
                }
            }

            Request::RecognitionError { error } => {
                warn!(%error, "speech source reported a recognition error");
                ctx.status
                    .set(format!("Error: {error}"), StatusColor::Red);
                Response::Accepted
            }

            Request::SetField { field, value } => {
                let result = ctx.store.write().await.set(&field, value);
                match result {
                    Ok(()) => Response::Accepted,
                    Err(e) => form_error_response(e),
                }
            }

            Request::GetForm => {
                let fields = ctx.store.read().await.snapshot();
                Response::Form { fields }
            }

            Request::TranscribeClip { field, audio } => {
                Self::transcribe_clip(field, audio, ctx).await
            }

            Request::SubmitForm => Self::submit_form(ctx).await,
        }
    }

    /// Decode a clip, send it for transcription, and replace the target
    /// field's value with the result
    async fn transcribe_clip(
        field: Option<String>,
        audio: String,
        ctx: &Arc<ServerCtx>,
    ) -> Response {
        let target = {
            let store = ctx.store.read().await;
            match store.clip_target(field.as_deref()) {
                Ok(target) => target,
                Err(e) => return form_error_response(e),
            }
        };

        let wav_bytes = match STANDARD.decode(audio.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "clip audio is not valid base64");
                return Response::Error {
                    code: "bad_audio".to_string(),
                    message: e.to_string(),
                };
            }
        };

        ctx.status.set("Processing audio...", StatusColor::Green);

        match ctx.backend.transcribe(&target, wav_bytes).await {
            Ok(text) => {
                let write = ctx.store.write().await.set(&target, text.clone());
                if let Err(e) = write {
                    return form_error_response(e);
                }
                ctx.status.set(
                    "Voice input recorded and transcribed.",
                    StatusColor::Green,
                );
                let _ = ctx.event_tx.send(FormEvent::FieldReplaced {
                    field: target.clone(),
                });
                Response::Transcribed {
                    field: target,
                    text,
                }
            }
            Err(e @ ApiError::Backend(_)) => {
                ctx.status
                    .set("Error during transcription.", StatusColor::Red);
                Response::Error {
                    code: "transcription_failed".to_string(),
                    message: e.to_string(),
                }
            }
            Err(e) => {
                ctx.status
                    .set("Failed to upload or transcribe audio.", StatusColor::Red);
                Response::Error {
                    code: "upload_failed".to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    /// Save the patient form through the backend. The backend's confirmation
    /// message becomes the status line and rides in the response.
    async fn submit_form(ctx: &Arc<ServerCtx>) -> Response {
        let submission = ctx.store.read().await.submission();
        match ctx.backend.submit(&submission).await {
            Ok(message) => {
                let _ = ctx.event_tx.send(FormEvent::FormSubmitted);
                ctx.status.set(message.clone(), StatusColor::Green);
                Response::Submitted { message }
            }
            Err(e) => {
                warn!(error = %e, "form submission failed");
                ctx.status.set("Failed to save data.", StatusColor::Red);
                Response::Error {
                    code: "submit_failed".to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn form_error_response(error: FormError) -> Response {
    let code = match &error {
        FormError::UnknownField(_) => "unknown_field",
        FormError::NotVoiceInput(_) => "not_voice_input",
        FormError::NoVoiceFocus => "no_voice_focus",
    };
    Response::Error {
        code: code.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_server(name: &str) -> (Server, mpsc::Receiver<String>) {
        let socket_path = std::env::temp_dir().join(format!(
            "clinic-scribe-{}-{}.sock",
            std::process::id(),
            name
        ));
        let (utterance_tx, utterance_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(16);
        let ctx = ServerCtx {
            utterance_tx,
            store: Arc::new(RwLock::new(FormStore::standard())),
            backend: Arc::new(
                BackendClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap(),
            ),
            status: StatusSink::new(16),
            event_tx,
            listening: Arc::new(AtomicBool::new(false)),
        };
        let server = Server::new(&socket_path, ctx).unwrap();
        (server, utterance_rx)
    }

    async fn send_request(stream: &mut UnixStream, request: &Request) {
        let bytes = serde_json::to_vec(request).unwrap();
        stream
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .await
            .unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    async fn read_response(stream: &mut UnixStream) -> Response {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut msg_buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut msg_buf).await.unwrap();
        serde_json::from_slice(&msg_buf).unwrap()
    }

    #[tokio::test]
    async fn test_ping_over_socket() {
        let (server, _utterance_rx) = test_server("ping");
        let socket_path = server.socket_path.clone();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        send_request(&mut stream, &Request::Ping).await;
        assert!(matches!(read_response(&mut stream).await, Response::Pong));

        let _ = std::fs::remove_file(&socket_path);
    }

    #[tokio::test]
    async fn test_utterance_is_forwarded_to_the_router_channel() {
        let (server, mut utterance_rx) = test_server("utterance");
        let socket_path = server.socket_path.clone();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        send_request(
            &mut stream,
            &Request::Utterance {
                text: "left comments".to_string(),
            },
        )
        .await;
        assert!(matches!(
            read_response(&mut stream).await,
            Response::Accepted
        ));
        assert_eq!(utterance_rx.recv().await.unwrap(), "left comments");

        let _ = std::fs::remove_file(&socket_path);
    }

    #[tokio::test]
    async fn test_unknown_field_yields_error_and_connection_survives() {
        let (server, _utterance_rx) = test_server("set-field");
        let socket_path = server.socket_path.clone();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        send_request(
            &mut stream,
            &Request::SetField {
                field: "no-such-field".to_string(),
                value: "x".to_string(),
            },
        )
        .await;
        let response = read_response(&mut stream).await;
        assert!(matches!(
            response,
            Response::Error { ref code, .. } if code == "unknown_field"
        ));

        // Next request on the same connection still works
        send_request(&mut stream, &Request::Ping).await;
        assert!(matches!(read_response(&mut stream).await, Response::Pong));

        let _ = std::fs::remove_file(&socket_path);
    }

    #[tokio::test]
    async fn test_subscribed_client_receives_status_pushes() {
        let (server, _utterance_rx) = test_server("subscribe");
        let socket_path = server.socket_path.clone();
        let status = server.ctx.status.clone();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        send_request(&mut stream, &Request::Subscribe).await;
        assert!(matches!(
            read_response(&mut stream).await,
            Response::Subscribed
        ));

        status.set("Listening...", StatusColor::Green);

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut msg_buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut msg_buf).await.unwrap();
        let notification: Notification = serde_json::from_slice(&msg_buf).unwrap();
        assert!(matches!(
            notification,
            Notification::Status { ref update } if update.text == "Listening..."
        ));

        let _ = std::fs::remove_file(&socket_path);
    }
}
