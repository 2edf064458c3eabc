use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::error::PollError;
use crate::poll::{Outcome, PollServer};

pub async fn handle_poll_websocket(websocket: WebSocket, poll_server: Arc<PollServer>) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let connection_id = poll_server.connect(tx).await;
    tracing::info!(connection_id, "New poll WebSocket connection established");

    // Drain the outbox into the socket
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => handle_websocket_message(&poll_server, connection_id, message).await,
            Err(e) => {
                tracing::warn!(connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    let outcome = poll_server.disconnect(connection_id).await;
    sender_task.abort();
    tracing::info!(connection_id, ?outcome, "Poll WebSocket connection closed");
}

async fn handle_websocket_message(poll_server: &Arc<PollServer>, connection_id: u64, message: Message) {
    let Ok(text) = message.to_str() else {
        return;
    };
    tracing::debug!(connection_id, "Received poll message: {}", text);

    match poll_server.handle_text(connection_id, text).await {
        Ok(Outcome::Applied) | Ok(Outcome::Skipped(_)) => {}
        Err(PollError::MalformedMessage(e)) => {
            tracing::warn!(
                connection_id,
                error = %e,
                raw_message = %text,
                "Failed to parse poll message"
            );
        }
        Err(e) => {
            tracing::error!(connection_id, error = %e, "Error handling poll message");
        }
    }
}
