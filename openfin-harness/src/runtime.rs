//! Control connection to a running desktop runtime.
//!
//! The vendor SDK exposes connect/disconnect and application queries as
//! callback pairs over a local websocket. Here every outbound frame
//! carries a correlation id and the matching ack resolves a oneshot
//! channel, so the whole surface is awaitable. Lifecycle events pushed by
//! the runtime fan out on a broadcast channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::HarnessError;
use crate::types::{ProcessInfo, RuntimeOptions, SessionSnapshot, WindowBounds};

// Reduce type complexity for Clippy
type AckResult = Result<Value, String>;
type PendingMap = HashMap<String, oneshot::Sender<AckResult>>;
type Pending = Arc<Mutex<PendingMap>>;

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    action: &'a str,
    message_id: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct AckPayload {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuntimeIncoming {
    Ack {
        correlation_id: String,
        payload: AckPayload,
    },
    Event {
        payload: AppEvent,
    },
}

/// Application lifecycle notification pushed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEvent {
    #[serde(rename = "type")]
    pub kind: AppEventKind,
    pub uuid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppEventKind {
    Started,
    CloseRequested,
    Closed,
}

/// An established control-channel session with the runtime.
///
/// Dropping the handle tears the socket down; [`disconnect`] does it
/// politely and is a no-op on an already-closed session.
///
/// [`disconnect`]: RuntimeConnection::disconnect
#[derive(Debug)]
pub struct RuntimeConnection {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Pending,
    events: broadcast::Sender<AppEvent>,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl RuntimeConnection {
    /// Connects to the runtime's local control port and performs the
    /// version handshake. Resolves once the runtime acknowledges, the
    /// way the SDK's `Connect(callback)` fires its callback.
    #[instrument(skip(options), fields(port = options.port))]
    pub async fn connect(options: &RuntimeOptions) -> Result<Self, HarnessError> {
        let url = format!("ws://127.0.0.1:{}/", options.port);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| HarnessError::Connection(format!("connect to {url}: {e}")))?;
        let (mut sink, mut stream) = ws_stream.split();

        let (outbound, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("runtime socket send error: {e}");
                    break;
                }
            }
        });

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(64);
        let connected = Arc::new(AtomicBool::new(true));

        let reader_pending = pending.clone();
        let reader_events = events.clone();
        let reader_connected = connected.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                let msg = match next {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("runtime socket error: {e}");
                        break;
                    }
                };
                if !msg.is_text() {
                    continue;
                }
                let txt = msg.into_text().unwrap_or_default();
                match serde_json::from_str::<RuntimeIncoming>(&txt) {
                    Ok(RuntimeIncoming::Ack {
                        correlation_id,
                        payload,
                    }) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&correlation_id) {
                            let _ = tx.send(if payload.success {
                                Ok(payload.data.unwrap_or(Value::Null))
                            } else {
                                Err(payload.reason.unwrap_or_else(|| "unknown error".into()))
                            });
                        } else {
                            warn!(id = %correlation_id, "ack for unknown request");
                        }
                    }
                    Ok(RuntimeIncoming::Event { payload }) => {
                        debug!(kind = ?payload.kind, uuid = %payload.uuid, "runtime event");
                        let _ = reader_events.send(payload);
                    }
                    Err(e) => warn!("invalid frame from runtime: {e}"),
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            // Fail anything still waiting so callers see the drop rather
            // than their full request timeout.
            for (_, tx) in reader_pending.lock().await.drain() {
                let _ = tx.send(Err("connection closed".into()));
            }
        });

        let conn = Self {
            outbound,
            pending,
            events,
            connected,
            request_timeout: Duration::from_millis(options.request_timeout_ms),
            reader_task,
            writer_task,
        };

        conn.request(
            "connect",
            json!({
                "version": options.version,
                "arguments": options.arguments,
            }),
        )
        .await?;
        info!(version = %options.version, "connected to runtime");
        Ok(conn)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribes to application lifecycle events. Events published
    /// before the call are not replayed.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    /// Asks the runtime whether the application identified by `uuid` is
    /// currently running. This is the usual predicate fed to
    /// [`wait_until`](crate::wait::wait_until) in lifecycle probes.
    pub async fn is_application_running(&self, uuid: &str) -> Result<bool, HarnessError> {
        let data = self
            .request("is-application-running", json!({ "uuid": uuid }))
            .await?;
        decode("is-application-running", data)
    }

    pub async fn application_window_bounds(
        &self,
        uuid: &str,
    ) -> Result<WindowBounds, HarnessError> {
        let data = self
            .request("get-window-bounds", json!({ "uuid": uuid }))
            .await?;
        decode("get-window-bounds", data)
    }

    pub async fn set_application_window_bounds(
        &self,
        uuid: &str,
        bounds: WindowBounds,
    ) -> Result<(), HarnessError> {
        self.request(
            "set-window-bounds",
            json!({ "uuid": uuid, "bounds": bounds }),
        )
        .await?;
        Ok(())
    }

    /// Runtime-reported stats for the application's process.
    pub async fn process_info(&self, uuid: &str) -> Result<ProcessInfo, HarnessError> {
        let data = self
            .request("get-process-info", json!({ "uuid": uuid }))
            .await?;
        decode("get-process-info", data)
    }

    /// Captures the application's current window layout.
    pub async fn snapshot(&self, uuid: &str) -> Result<SessionSnapshot, HarnessError> {
        let data = self.request("get-snapshot", json!({ "uuid": uuid })).await?;
        decode("get-snapshot", data)
    }

    /// Replays a previously captured layout.
    pub async fn restore_snapshot(
        &self,
        uuid: &str,
        snapshot: &SessionSnapshot,
    ) -> Result<(), HarnessError> {
        self.request(
            "restore-snapshot",
            json!({ "uuid": uuid, "snapshot": snapshot }),
        )
        .await?;
        Ok(())
    }

    /// Asks the application to close. With `force` the runtime skips the
    /// app's close-requested listener.
    pub async fn close_application(&self, uuid: &str, force: bool) -> Result<(), HarnessError> {
        self.request("close-application", json!({ "uuid": uuid, "force": force }))
            .await?;
        Ok(())
    }

    /// Politely closes the session. Calling this on an already-closed
    /// connection succeeds without sending anything.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<(), HarnessError> {
        if !self.is_connected() {
            return Ok(());
        }
        match self.request("disconnect", Value::Null).await {
            Ok(_) | Err(HarnessError::Connection(_)) => {}
            Err(e) => return Err(e),
        }
        self.connected.store(false, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
        info!("disconnected from runtime");
        Ok(())
    }

    async fn request(&self, action: &str, payload: Value) -> Result<Value, HarnessError> {
        if !self.is_connected() {
            return Err(HarnessError::Connection(format!(
                "not connected (request {action})"
            )));
        }
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel::<AckResult>();
        self.pending.lock().await.insert(id.clone(), tx);

        let frame = serde_json::to_string(&Envelope {
            action,
            message_id: id.clone(),
            payload,
        })
        .map_err(|e| HarnessError::Internal(format!("serialize {action}: {e}")))?;

        if self.outbound.send(Message::Text(frame)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(HarnessError::Connection(format!(
                "socket closed while sending {action}"
            )));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(reason))) => Err(HarnessError::Protocol(format!("{action}: {reason}"))),
            Ok(Err(_canceled)) => Err(HarnessError::Connection(format!(
                "connection closed while waiting for {action} ack"
            ))),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                Err(HarnessError::Timeout(format!(
                    "no ack for {action} within {:?}",
                    self.request_timeout
                )))
            }
        }
    }
}

impl Drop for RuntimeConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

fn decode<T: serde::de::DeserializeOwned>(action: &str, data: Value) -> Result<T, HarnessError> {
    serde_json::from_value(data)
        .map_err(|e| HarnessError::Protocol(format!("{action}: bad ack payload: {e}")))
}
