use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;

use crate::config::RealtimeConfig;
use crate::state::AppState;
use crate::ws::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};

/// How long the writer gets to flush its close frame once the read loop is done.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Releases the registry entry when the connection task ends, however it ends.
struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    user_id: String,
    connection_id: ConnectionId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.release(&self.user_id, self.connection_id);
    }
}

/// Run one authenticated WebSocket until the peer leaves, the transport
/// fails, keepalive gives up, or the registry closes the handle.
///
/// The socket is split: a writer task owns the sink and drains the handle's
/// channel, while this task reads frames and hands them to the relay one at a
/// time.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (handle, rx) = ConnectionHandle::new(&user_id, state.realtime.outbound_buffer);
    let connection_id = handle.id();

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, handle.close_signal()));

    state.registry.register(handle.clone());
    let guard = RegistrationGuard {
        registry: state.registry.clone(),
        user_id: user_id.clone(),
        connection_id,
    };

    tracing::info!(user_id = %user_id, connection_id, "WebSocket actor started");

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let ping_handle = tokio::spawn(keepalive_task(handle.clone(), pong_rx, state.realtime.clone()));

    loop {
        let next = tokio::select! {
            _ = handle.closed() => {
                tracing::info!(user_id = %user_id, connection_id, "Connection closed by server");
                break;
            }
            next = ws_receiver.next() => next,
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    dispatch(&state, &user_id, text.as_str().as_bytes()).await;
                }
                Message::Binary(data) => {
                    dispatch(&state, &user_id, &data).await;
                }
                Message::Pong(_) => {
                    // Keepalive already gone means the connection is shutting down.
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    if let Err(e) = handle
                        .send_frame(Message::Pong(data), state.realtime.send_timeout())
                        .await
                    {
                        tracing::debug!(user_id = %user_id, error = %e, "Pong not sent");
                    }
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    ping_handle.abort();
    drop(guard);

    // Superseded connections are already closed; this covers the rest.
    handle.close();
    if timeout(WRITER_DRAIN_TIMEOUT, writer_handle).await.is_err() {
        tracing::debug!(user_id = %user_id, connection_id, "Writer did not finish in time");
    }

    tracing::info!(user_id = %user_id, connection_id, "WebSocket actor stopped");
}

/// Hand one frame to the relay and answer routing failures inline.
async fn dispatch(state: &AppState, user_id: &str, data: &[u8]) {
    if let Err(err) = state.relay.handle_frame(user_id, data).await {
        tracing::warn!(user_id = %user_id, error = %err, "Relay failed");
        state.relay.reply(user_id, err.client_message()).await;
    }
}

/// Forward queued frames to the sink. Once the handle is closed, flush what is
/// already queued, send a close frame and stop.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if ws_sender.send(msg).await.is_err() {
                    // Receiver gone: the next send through the handle fails and evicts it.
                    return;
                }
            }
            _ = closed.cancelled() => break,
        }
    }

    while let Ok(msg) = rx.try_recv() {
        if ws_sender.send(msg).await.is_err() {
            return;
        }
    }
    let _ = ws_sender
        .send(Message::Close(Some(CloseFrame {
            code: 1000,
            reason: "".into(),
        })))
        .await;
    let _ = ws_sender.close().await;
}

/// Ping every `ping_interval`; close the handle if a pong does not follow
/// within `pong_timeout`.
async fn keepalive_task(
    handle: ConnectionHandle,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    config: RealtimeConfig,
) {
    let mut ping_timer = interval(config.ping_interval());
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Stale pongs from before this ping do not count.
        while pong_rx.try_recv().is_ok() {}

        if handle
            .send_frame(Message::Ping(vec![1, 2, 3, 4].into()), config.send_timeout())
            .await
            .is_err()
        {
            break;
        }

        match timeout(config.pong_timeout(), pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!(user_id = %handle.user_id(), "Pong timeout, closing connection");
                handle.close();
                break;
            }
        }
    }
}
