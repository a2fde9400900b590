//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use posestream_core::ClientId;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::{HeartbeatResult, Liveness, run_heartbeat};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_REJECTIONS_TOTAL,
};
use crate::protocol::{self, ControlAction, envelope};
use crate::session::{ClientSession, CloseReason, SessionContext};

/// How long the writer gets to flush queued messages after the session closes.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a WebSocket session for a connected client.
///
/// 1. Creates and activates the [`ClientSession`]; on refusal sends an error
///    envelope and closes
/// 2. Greets the client with a `control`/`start` carrying its id
/// 3. Dispatches inbound messages through the session protocol
/// 4. Forwards results and replies, pinging at the heartbeat interval
/// 5. Drains on disconnect, stop, send failure, heartbeat timeout or shutdown
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: ClientId,
    ctx: SessionContext,
    config: Arc<ServerConfig>,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(config.outbound_buffer.max(1));
    let writer = tokio::spawn(write_loop(ws_tx, send_rx, config.heartbeat_interval()));

    let session = ClientSession::new(client_id.clone(), &ctx, send_tx);
    if let Err(e) = session.activate() {
        warn!(error = %e, "session refused");
        counter!(WS_REJECTIONS_TOTAL, "reason" => e.kind().as_str()).increment(1);
        let _ = session.send(envelope::error_message(e.kind(), &e.to_string(), None));
        session.close(CloseReason::RegistrationFailed);
        drop(session);
        finish_writer(writer).await;
        return;
    }

    let connected_at = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let _ = session.send(envelope::control_message(ControlAction::Start, Some(&client_id)));

    let liveness = Arc::new(Liveness::new());
    let heartbeat = {
        let liveness = liveness.clone();
        let lifecycle = session.lifecycle().clone();
        let interval = config.heartbeat_interval();
        let timeout = config.heartbeat_timeout();
        tokio::spawn(async move {
            let result = run_heartbeat(liveness.clone(), interval, timeout, lifecycle.drain_token()).await;
            if result == HeartbeatResult::TimedOut {
                warn!(silent_for = ?liveness.last_seen_elapsed(), "client unresponsive, draining");
                let _ = lifecycle.begin_drain(CloseReason::HeartbeatTimeout);
            }
        })
    };

    loop {
        let msg = tokio::select! {
            () = session.lifecycle().drained() => break,
            msg = ws_rx.next() => msg,
        };
        let text = match msg {
            Some(Ok(Message::Text(t))) => t.to_string(),
            Some(Ok(Message::Binary(data))) => {
                if let Ok(s) = std::str::from_utf8(&data) {
                    s.to_owned()
                } else {
                    debug!(len = data.len(), "received non-UTF8 binary frame");
                    continue;
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                liveness.mark_alive();
                continue;
            }
            Some(Ok(Message::Close(_))) => {
                info!("client sent close frame");
                break;
            }
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };
        liveness.mark_alive();
        let _ = protocol::handle_message(&session, &text);
    }

    let reason = session.lifecycle().close_reason().unwrap_or(if ctx.shutdown.is_cancelled() {
        CloseReason::ServerShutdown
    } else {
        CloseReason::ClientDisconnect
    });
    session.close(reason);
    heartbeat.abort();

    info!("client disconnected");
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connected_at.elapsed().as_secs_f64());

    // Dropping the session drops the last outbound sender, which lets the
    // writer flush and send the close frame.
    drop(session);
    finish_writer(writer).await;
}

async fn finish_writer(mut writer: tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer).await.is_err() {
        debug!("writer did not finish in time, aborting");
        writer.abort();
    }
}

/// Forward queued messages to the socket and ping every `ping_every`.
///
/// Ends with a close frame once every sender is gone, or as soon as the
/// socket rejects a write.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    ping_every: Duration,
) {
    let mut ping = tokio::time::interval(ping_every);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            msg = send_rx.recv() => {
                let Some(text) = msg else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                if ws_tx.send(Message::Text(text.as_str().to_owned().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
