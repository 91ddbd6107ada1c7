//! Stream transport
//!
//! Long-lived server-push connections carrying newline-delimited
//! `data: <json>` frames. Each [`StreamTransport::open`] call spawns a
//! session task that owns the connection and delivers [`StreamEvent`]s
//! over a channel; the returned [`StreamHandle`] is the only way to
//! consume or close the stream.
//!
//! Recovery is deliberately narrower than the request pipeline's: one
//! authentication reconnect and one transient reconnect per session,
//! after which the stream ends with a terminal `Error`.

use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::RequestSpec;
use crate::auth::types::{LogoutReason, RefreshError};
use crate::auth::SessionContext;
use crate::config::TransportConfig;
use crate::errors::{extract_error_message, TransportError};
use crate::health::HealthMonitor;
use crate::stream::events::StreamEvent;

/// Client identifier header attached to every request.
const CLIENT_ID_HEADER: &str = "x-stride-client";

/// Frame prefix for data lines.
const DATA_PREFIX: &str = "data:";

/// Event channel capacity; producers are paced by the socket, consumers by
/// the application.
const CHANNEL_CAPACITY: usize = 64;

/// Streaming transport over the shared session.
pub struct StreamTransport {
    http: Client,
    config: TransportConfig,
    session: Arc<SessionContext>,
    health: Arc<HealthMonitor>,
}

/// Consumer end of one open stream.
pub struct StreamHandle {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Next event, `None` once the channel is closed after a terminal
    /// event.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Close the stream and release the connection.
    ///
    /// Idempotent: the session emits exactly one `Complete` however many
    /// times this is called.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl StreamTransport {
    /// Create a stream transport over the shared session and health
    /// monitor.
    ///
    /// # Errors
    /// Returns the builder error message if the HTTP client cannot be
    /// constructed. The client carries no timeout: streams stay open until
    /// closed or broken.
    pub fn new(
        config: TransportConfig,
        session: Arc<SessionContext>,
        health: Arc<HealthMonitor>,
    ) -> Result<Self, String> {
        let http = Client::builder().build().map_err(|e| e.to_string())?;
        Ok(Self { http, config, session, health })
    }

    /// Open a stream for the given request.
    ///
    /// # Errors
    /// `AuthRequired` when the logout gate is set or no token is stored for
    /// a non-exempt endpoint; connection-level failures after this point
    /// arrive as `StreamEvent::Error`.
    pub async fn open(&self, spec: RequestSpec) -> Result<StreamHandle, TransportError> {
        if self.session.is_logging_out() && !spec.exempt {
            return Err(TransportError::AuthRequired);
        }
        let token = if spec.exempt {
            None
        } else {
            match self.session.tokens().access_token().await {
                Some(token) => Some(token),
                None => return Err(TransportError::AuthRequired),
            }
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let session = StreamSession {
            http: self.http.clone(),
            config: self.config.clone(),
            session: Arc::clone(&self.session),
            health: Arc::clone(&self.health),
            spec,
            events: tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(session.run(token));

        Ok(StreamHandle { events: rx, cancel })
    }
}

/// Per-connection state, destroyed when the session task exits.
struct StreamSession {
    http: Client,
    config: TransportConfig,
    session: Arc<SessionContext>,
    health: Arc<HealthMonitor>,
    spec: RequestSpec,
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

/// Outcome of one connection attempt, driving the reconnect decision.
enum ConnectionOutcome {
    /// Server finished or the consumer closed the stream.
    Finished,
    /// 401 on connect.
    AuthRejected,
    /// 403 on connect; carries the parsed body, if any.
    Forbidden(Option<Value>),
    /// Gateway status or connection-level failure.
    Transient(TransportError),
    /// Non-recoverable rejection.
    Terminal(TransportError),
}

impl StreamSession {
    async fn run(self, mut token: Option<String>) {
        let mut auth_retried = false;
        let mut transient_retried = false;

        loop {
            let outcome = tokio::select! {
                () = self.cancel.cancelled() => {
                    self.complete().await;
                    return;
                }
                outcome = self.connect_and_pump(token.as_deref()) => outcome,
            };

            match outcome {
                ConnectionOutcome::Finished => {
                    self.complete().await;
                    return;
                }
                ConnectionOutcome::AuthRejected => {
                    if auth_retried {
                        self.session.terminate(LogoutReason::ExpiredSession).await;
                        self.fail(TransportError::AuthExpired).await;
                        return;
                    }
                    auth_retried = true;
                    match self.session.refresh().refresh_now().await {
                        Ok(new_token) => {
                            debug!(path = %self.spec.path, "reopening stream with refreshed token");
                            token = Some(new_token);
                        }
                        Err(RefreshError::UserMissing) => {
                            self.session.terminate(LogoutReason::NotFound).await;
                            self.fail(TransportError::UserMissing).await;
                            return;
                        }
                        Err(RefreshError::NoRefreshToken) => {
                            self.session.terminate(LogoutReason::ExpiredSession).await;
                            self.fail(TransportError::AuthExpired).await;
                            return;
                        }
                        Err(RefreshError::Transient(reason)) => {
                            warn!(%reason, "stream refresh failed transiently");
                            self.fail(TransportError::AuthExpired).await;
                            return;
                        }
                    }
                }
                ConnectionOutcome::Forbidden(body) => {
                    if let Some(reason) = body
                        .as_ref()
                        .and_then(|b| b.get("account_status").or_else(|| b.get("status")))
                        .and_then(Value::as_str)
                        .and_then(LogoutReason::from_account_status)
                    {
                        self.session.terminate(reason).await;
                        self.fail(TransportError::AccountBlocked { reason }).await;
                    } else {
                        let message = body
                            .as_ref()
                            .and_then(extract_error_message)
                            .unwrap_or_else(|| "stream rejected".to_string());
                        self.fail(TransportError::Validation { status: 403, message }).await;
                    }
                    return;
                }
                ConnectionOutcome::Transient(error) => {
                    if transient_retried {
                        self.health.report_offline(error.to_string());
                        self.fail(error).await;
                        return;
                    }
                    transient_retried = true;
                    debug!(path = %self.spec.path, %error, "stream interrupted; reconnecting once");
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            self.complete().await;
                            return;
                        }
                        () = tokio::time::sleep(self.config.stream_reconnect_delay) => {}
                    }
                }
                ConnectionOutcome::Terminal(error) => {
                    self.fail(error).await;
                    return;
                }
            }
        }
    }

    /// Connect, classify the response, and pump frames until the
    /// connection ends. Cancellation is handled by the caller's select.
    async fn connect_and_pump(&self, token: Option<&str>) -> ConnectionOutcome {
        let url = self.config.url(&self.spec.path);
        let mut request = self
            .http
            .request(self.spec.method.clone(), &url)
            .header(ACCEPT, "text/event-stream")
            .header(CLIENT_ID_HEADER, &self.config.client_id);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &self.spec.body {
            request = request.json(body);
        }

        debug!(method = %self.spec.method, %url, "opening stream");

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                return ConnectionOutcome::Transient(TransportError::NetworkUnavailable(
                    error.to_string(),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return self.classify_rejection(status, response).await;
        }

        self.health.report_online();
        if self.events.send(StreamEvent::Open).await.is_err() {
            return ConnectionOutcome::Finished;
        }
        self.pump_frames(response).await
    }

    async fn classify_rejection(&self, status: StatusCode, response: Response) -> ConnectionOutcome {
        if status == StatusCode::UNAUTHORIZED && !self.spec.exempt {
            return ConnectionOutcome::AuthRejected;
        }
        if status == StatusCode::FORBIDDEN {
            let body = response.text().await.ok().and_then(|t| serde_json::from_str(&t).ok());
            return ConnectionOutcome::Forbidden(body);
        }
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            let message = format!("{} returned status {}", self.spec.path, status.as_u16());
            return ConnectionOutcome::Transient(TransportError::ServiceUnavailable(message));
        }

        let message = response
            .text()
            .await
            .ok()
            .and_then(|t| serde_json::from_str::<Value>(&t).ok())
            .as_ref()
            .and_then(extract_error_message)
            .unwrap_or_else(|| format!("{} returned status {}", self.spec.path, status.as_u16()));

        if status.is_client_error() {
            ConnectionOutcome::Terminal(TransportError::Validation {
                status: status.as_u16(),
                message,
            })
        } else {
            ConnectionOutcome::Terminal(TransportError::ServiceUnavailable(message))
        }
    }

    /// Read the byte stream, slicing it into newline-delimited frames.
    async fn pump_frames(&self, response: Response) -> ConnectionOutcome {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    return ConnectionOutcome::Transient(TransportError::NetworkUnavailable(
                        error.to_string(),
                    ));
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                if let Some(value) = parse_frame(line.trim_end_matches('\r')) {
                    if self.events.send(StreamEvent::Message(value)).await.is_err() {
                        return ConnectionOutcome::Finished;
                    }
                }
            }
        }

        info!(path = %self.spec.path, "stream finished");
        ConnectionOutcome::Finished
    }

    async fn complete(&self) {
        let _ = self.events.send(StreamEvent::Complete).await;
    }

    async fn fail(&self, error: TransportError) {
        let _ = self.events.send(StreamEvent::Error(error)).await;
    }
}

/// Decode one frame line; malformed frames are logged and dropped.
fn parse_frame(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        debug!("ignoring non-data stream line");
        return None;
    };
    match serde_json::from_str(payload.trim_start()) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%error, "dropping malformed stream frame");
            None
        }
    }
}
