use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{self, Reply};
use crate::state::AppState;

// ── WebSocket Handler ───────────────────────────────────────────

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, channel, state))
}

async fn handle_ws(socket: WebSocket, channel: String, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut jobs = state.channels.subscribe(&channel).await;
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    let subscribers = state.channels.subscriber_count(&channel).await;
    info!(%conn_id, channel = %channel, subscribers, "client connected");

    // Forward dispatched jobs and this client's own replies.
    let send_channel = channel.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                job = jobs.recv() => match job {
                    Ok(payload) => payload,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(%conn_id, channel = %send_channel, missed, "client lagging, dispatches dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Apply client frames. A bad frame is reported, never fatal.
    let recv_state = state.clone();
    let recv_channel = channel.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                Message::Binary(_) => {
                    debug!(%conn_id, "ignoring binary frame");
                    continue;
                }
                _ => continue,
            };

            let reply = protocol::handle_frame(&recv_state.scheduler, &recv_channel, text.as_str()).await;
            if let Reply::Nack { action, error } = &reply {
                warn!(%conn_id, channel = %recv_channel, action = %action, error = %error, "client message rejected");
            }
            if recv_state.reply_acks && reply_tx.send(reply.to_frame()).is_err() {
                break;
            }
        }
    });

    let send_finished = tokio::select! {
        _ = &mut send_task => true,
        _ = &mut recv_task => false,
    };
    // The other task must be gone before pruning so its receiver is dropped.
    let other = if send_finished { recv_task } else { send_task };
    other.abort();
    let _ = other.await;

    // Disconnect only drops the subscription; queue state is untouched.
    state.channels.prune(&channel).await;
    info!(%conn_id, channel = %channel, "client disconnected");
}
