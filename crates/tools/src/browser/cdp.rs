//! Minimal Chrome DevTools Protocol client over WebSocket.
//!
//! One client talks to one page target. Commands are matched to their
//! responses by id; protocol events are ignored.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct CdpClient {
    outbox: mpsc::Sender<String>,
    waiters: Waiters,
    last_id: AtomicU64,
    tasks: [JoinHandle<()>; 2],
}

impl CdpClient {
    /// Connect to a page target's `webSocketDebuggerUrl`.
    pub async fn connect(ws_url: &str) -> Result<Self, String> {
        let (socket, _) = connect_async(ws_url)
            .await
            .map_err(|e| format!("Failed to connect to CDP endpoint {}: {}", ws_url, e))?;
        let (sink, stream) = socket.split();
        let (outbox, queued) = mpsc::channel::<String>(64);
        let waiters: Waiters = Arc::default();

        let tasks = [
            tokio::spawn(forward_commands(queued, sink)),
            tokio::spawn(route_responses(stream, waiters.clone())),
        ];
        Ok(Self {
            outbox,
            waiters,
            last_id: AtomicU64::new(0),
            tasks,
        })
    }

    /// Send a command and wait for its `result`.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, String> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, answer) = oneshot::channel();
        self.waiters.lock().await.insert(id, reply);

        let frame = json!({ "id": id, "method": method, "params": params });
        self.outbox
            .send(frame.to_string())
            .await
            .map_err(|e| format!("Failed to send CDP command: {}", e))?;

        match tokio::time::timeout(COMMAND_TIMEOUT, answer).await {
            Ok(Ok(response)) => command_result(response),
            Ok(Err(_)) => Err("CDP response channel closed".to_string()),
            Err(_) => {
                self.waiters.lock().await.remove(&id);
                Err(format!(
                    "CDP command '{}' timed out after {}s",
                    method,
                    COMMAND_TIMEOUT.as_secs()
                ))
            }
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<(), String> {
        self.send_command(method, params).await.map(drop)
    }

    pub async fn enable_domain(&self, domain: &str) -> Result<(), String> {
        self.call(&format!("{}.enable", domain), json!({})).await
    }

    pub async fn navigate(&self, url: &str) -> Result<(), String> {
        let result = self
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        match result.get("errorText").and_then(Value::as_str) {
            Some(reason) => Err(format!("navigation to {} failed: {}", url, reason)),
            None => Ok(()),
        }
    }

    pub async fn reload(&self) -> Result<(), String> {
        self.call("Page.reload", json!({})).await
    }

    /// Evaluate an expression and return its JSON value. A thrown exception
    /// is reported as an error.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, String> {
        let params = json!({
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        });
        let result = self.send_command("Runtime.evaluate", params).await?;
        evaluation_value(result)
    }

    pub async fn dispatch_key_event(
        &self,
        event_type: &str,
        key: &str,
        code: &str,
        modifiers: i32,
    ) -> Result<(), String> {
        let mut params = json!({ "type": event_type, "key": key, "code": code });
        if modifiers != 0 {
            params["modifiers"] = json!(modifiers);
        } else if event_type == "keyDown" && key.chars().count() == 1 {
            params["text"] = json!(key);
        }
        self.call("Input.dispatchKeyEvent", params).await
    }

    /// Insert text at the focused element without synthesising key events.
    pub async fn insert_text(&self, text: &str) -> Result<(), String> {
        self.call("Input.insertText", json!({ "text": text })).await
    }

    pub async fn activate_target(&self, target_id: &str) -> Result<(), String> {
        self.call("Target.activateTarget", json!({ "targetId": target_id }))
            .await
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn forward_commands(mut queued: mpsc::Receiver<String>, mut sink: SplitSink<Socket, Message>) {
    while let Some(frame) = queued.recv().await {
        if let Err(e) = sink.send(Message::Text(frame)).await {
            error!(error = %e, "CDP socket write failed");
            return;
        }
    }
}

async fn route_responses(mut stream: SplitStream<Socket>, waiters: Waiters) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("CDP socket closed by browser");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "CDP socket read failed");
                return;
            }
        };
        let Some((id, response)) = response_id(&text) else {
            continue;
        };
        if let Some(reply) = waiters.lock().await.remove(&id) {
            let _ = reply.send(response);
        }
    }
}

/// Responses carry an `id`; events do not and are dropped.
fn response_id(text: &str) -> Option<(u64, Value)> {
    let value: Value = serde_json::from_str(text).ok()?;
    let id = value.get("id")?.as_u64()?;
    Some((id, value))
}

fn command_result(response: Value) -> Result<Value, String> {
    if let Some(error) = response.get("error") {
        return Err(format!("CDP error: {}", error));
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

fn evaluation_value(result: Value) -> Result<Value, String> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .pointer("/exception/description")
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("unknown exception");
        return Err(format!("JS exception: {}", text));
    }
    Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
}
