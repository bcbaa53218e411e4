use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::task::AbortHandle;
use tracing::{error, info, trace, warn};
use uuid::Uuid;

use spark_types::events::ChatEvent;

use crate::gate::Admission;
use crate::hub::{Hub, ViewerHandle};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A single socket write that takes longer than this means the peer stopped
/// reading; the viewer is dropped instead of stalling its send loop.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keeps a viewer registered for as long as it is alive. Dropping it, on any
/// exit path, removes the viewer from the hub and stops its tasks.
struct Registration {
    hub: Hub,
    conversation_id: Uuid,
    viewer_id: Uuid,
    tasks: Vec<AbortHandle>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.leave(self.conversation_id, self.viewer_id);
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Serve one admitted viewer until it disconnects.
///
/// The socket is push-only: inbound frames are read solely to notice
/// disconnects and heartbeat pongs.
pub async fn handle_viewer(socket: WebSocket, hub: Hub, admission: Admission) {
    let Admission {
        conversation_id,
        user_id,
    } = admission;
    let (mut sender, mut receiver) = socket.split();

    let ready = ChatEvent::Ready {
        conversation_id,
        user_id,
    };
    let ready = match serde_json::to_string(&ready) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize Ready event: {}", e);
            return;
        }
    };
    if sender.send(Message::Text(ready.into())).await.is_err() {
        return;
    }

    let (viewer, mut outbound) = ViewerHandle::channel();
    let mut registration = Registration {
        hub: hub.clone(),
        conversation_id,
        viewer_id: viewer.id(),
        tasks: Vec::with_capacity(2),
    };
    hub.join(conversation_id, viewer);
    info!("{} watching conversation {}", user_id, conversation_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward hub payloads -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                payload = outbound.recv() => {
                    // None: removed from the hub
                    let Some(payload) = payload else { break };
                    if !write(&mut sender, frame(payload)).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if !write(&mut sender, Message::Ping(Bytes::new())).await {
                        break;
                    }
                }
            }
        }
    });

    // Inbound frames only signal liveness
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => trace!("Ignoring inbound frame on conversation {}", conversation_id),
            }
        }
    });

    registration.tasks.push(send_task.abort_handle());
    registration.tasks.push(recv_task.abort_handle());

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    drop(registration);
    info!("{} stopped watching conversation {}", user_id, conversation_id);
}

/// Send one frame, giving up after [`WRITE_TIMEOUT`]. Returns false when the
/// connection should be dropped.
async fn write<S>(sender: &mut S, msg: Message) -> bool
where
    S: Sink<Message> + Unpin,
{
    match tokio::time::timeout(WRITE_TIMEOUT, sender.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            warn!("Socket write stalled for {:?}, dropping connection", WRITE_TIMEOUT);
            false
        }
    }
}

fn frame(payload: Bytes) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::Text(text.into()),
        Err(_) => Message::Binary(payload),
    }
}
