//! In-process stand-in for the vendor runtime's control channel.
//!
//! Speaks just enough of the harness's envelope/ack protocol to exercise
//! `RuntimeConnection` without a real desktop runtime: a websocket
//! listener, a per-connection writer task, and a scriptable application
//! state table.

// Each integration test binary compiles this module; not all of them use
// every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use openfin_harness::{SessionSnapshot, SnapshotWindow, WindowBounds};

#[derive(Default)]
pub struct MockState {
    pub running: HashMap<String, bool>,
    pub bounds: HashMap<String, WindowBounds>,
    pub connects: u32,
    pub disconnects: u32,
}

type Clients = Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>;

pub struct MockRuntime {
    pub port: u16,
    pub state: Arc<Mutex<MockState>>,
    clients: Clients,
    _accept_task: JoinHandle<()>,
}

impl MockRuntime {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state: Arc<Mutex<MockState>> = Arc::default();
        let clients: Clients = Arc::default();

        let accept_state = state.clone();
        let accept_clients = clients.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, _peer) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let conn_state = accept_state.clone();
                let conn_clients = accept_clients.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(s) => s,
                        Err(_) => return,
                    };
                    let (mut sink, mut stream) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                    let writer = tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            if sink.send(msg).await.is_err() {
                                break;
                            }
                        }
                    });

                    conn_clients.lock().await.push(tx.clone());

                    while let Some(Ok(msg)) = stream.next().await {
                        if !msg.is_text() {
                            continue;
                        }
                        let txt = msg.into_text().unwrap_or_default();
                        let frame: Value = match serde_json::from_str(&txt) {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        let reply = handle(&conn_state, &tx, &frame).await;
                        let _ = tx.send(Message::Text(reply.to_string()));
                    }

                    writer.abort();
                });
            }
        });

        Self {
            port,
            state,
            clients,
            _accept_task: accept_task,
        }
    }

    pub async fn set_running(&self, uuid: &str, running: bool) {
        self.state
            .lock()
            .await
            .running
            .insert(uuid.to_string(), running);
    }

    pub async fn set_bounds(&self, uuid: &str, bounds: WindowBounds) {
        self.state
            .lock()
            .await
            .bounds
            .insert(uuid.to_string(), bounds);
    }

    /// Scripts an application launch: the app flips to running (and a
    /// `started` event fires) after `delay`.
    pub fn start_application_after(&self, uuid: &str, delay: Duration) {
        let uuid = uuid.to_string();
        let state = self.state.clone();
        let clients = self.clients.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.lock().await.running.insert(uuid.clone(), true);
            broadcast(&clients, app_event("started", &uuid)).await;
        });
    }
}

async fn handle(
    state: &Arc<Mutex<MockState>>,
    tx: &mpsc::UnboundedSender<Message>,
    frame: &Value,
) -> Value {
    let action = frame["action"].as_str().unwrap_or_default();
    let id = frame["message_id"].as_str().unwrap_or_default();
    let payload = &frame["payload"];
    let uuid = payload["uuid"].as_str().unwrap_or_default().to_string();

    let mut state = state.lock().await;
    match action {
        "connect" => {
            state.connects += 1;
            ack(id, json!({ "version": payload["version"] }))
        }
        "disconnect" => {
            state.disconnects += 1;
            ack(id, Value::Null)
        }
        "is-application-running" => {
            let running = state.running.get(&uuid).copied().unwrap_or(false);
            ack(id, json!(running))
        }
        "get-window-bounds" => match state.bounds.get(&uuid) {
            Some(b) => ack(id, serde_json::to_value(b).unwrap()),
            None => nack(id, "no such application"),
        },
        "set-window-bounds" => {
            match serde_json::from_value::<WindowBounds>(payload["bounds"].clone()) {
                Ok(b) => {
                    state.bounds.insert(uuid, b);
                    ack(id, Value::Null)
                }
                Err(_) => nack(id, "malformed bounds"),
            }
        }
        "get-process-info" => {
            if state.running.get(&uuid).copied().unwrap_or(false) {
                ack(
                    id,
                    json!({
                        "pid": 4242,
                        "name": "runtime-renderer",
                        "cpuUsage": 3.5,
                        "memoryBytes": 128 * 1024 * 1024u64,
                    }),
                )
            } else {
                nack(id, "application not running")
            }
        }
        "get-snapshot" => {
            let windows = state
                .bounds
                .get(&uuid)
                .map(|b| {
                    vec![SnapshotWindow {
                        name: uuid.clone(),
                        url: "http://localhost:9070/index.html".into(),
                        bounds: *b,
                    }]
                })
                .unwrap_or_default();
            ack(id, serde_json::to_value(SessionSnapshot { windows }).unwrap())
        }
        "restore-snapshot" => {
            match serde_json::from_value::<SessionSnapshot>(payload["snapshot"].clone()) {
                Ok(snapshot) => {
                    if let Some(win) = snapshot.windows.first() {
                        state.bounds.insert(uuid, win.bounds);
                    }
                    ack(id, Value::Null)
                }
                Err(_) => nack(id, "malformed snapshot"),
            }
        }
        "close-application" => {
            state.running.insert(uuid.clone(), false);
            let _ = tx.send(Message::Text(app_event("closed", &uuid).to_string()));
            ack(id, Value::Null)
        }
        _ => nack(id, "unknown action"),
    }
}

fn ack(id: &str, data: Value) -> Value {
    json!({
        "action": "ack",
        "correlation_id": id,
        "payload": { "success": true, "data": data },
    })
}

fn nack(id: &str, reason: &str) -> Value {
    json!({
        "action": "ack",
        "correlation_id": id,
        "payload": { "success": false, "reason": reason },
    })
}

fn app_event(kind: &str, uuid: &str) -> Value {
    json!({
        "action": "app-event",
        "payload": { "type": kind, "uuid": uuid },
    })
}

async fn broadcast(clients: &Clients, event: Value) {
    for tx in clients.lock().await.iter() {
        let _ = tx.send(Message::Text(event.to_string()));
    }
}
