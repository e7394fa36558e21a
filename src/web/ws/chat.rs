//! Chat WebSocket handler.
//!
//! Each socket becomes a connection of the engine: it posts the client's
//! lines as events and drains its outbound queue back onto the socket.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::engine::{EngineEvent, EngineHandle};
use crate::hub::{ConnId, Outbound};

use super::messages::{ClientMessage, ServerMessage};

/// Query parameters for WebSocket connection.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// Opaque client token used to find a returning identity.
    pub token: Option<String>,
}

/// WebSocket chat handler.
///
/// GET /ws?token={token}
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(engine): State<EngineHandle>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
) -> Response {
    let token = query.token.filter(|t| !t.is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, engine, peer, token))
}

/// Serialize an envelope into a text frame.
fn to_frame(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::warn!("Failed to serialize {} envelope: {}", msg.type_name(), e);
            None
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, engine: EngineHandle, peer: SocketAddr, token: Option<String>) {
    let conn = engine.next_conn_id();
    let (outbox, mut outbound) = mpsc::unbounded_channel();

    tracing::debug!("WebSocket session started: {} from {}", conn, peer);

    let connected = engine.send(EngineEvent::Connected {
        conn,
        addr: peer.ip().to_string(),
        token,
        outbox,
    });
    if !connected {
        tracing::warn!("Engine is gone, dropping {}", conn);
        return;
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            // Handle incoming WebSocket messages
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_text(&mut ws_sender, &engine, conn, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!("WebSocket closed by client: {}", conn);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error on {}: {}", conn, e);
                        break;
                    }
                }
            }

            // Handle messages queued by the engine
            item = outbound.recv() => {
                match item {
                    Some(Outbound::Message(msg)) => {
                        if let Some(frame) = to_frame(&msg) {
                            if ws_sender.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        tracing::debug!("WebSocket closed by server: {}", conn);
                        break;
                    }
                }
            }
        }
    }

    engine.send(EngineEvent::Disconnected { conn });
    tracing::debug!("WebSocket session ended: {}", conn);
}

/// Handle one text frame from the client.
async fn handle_client_text(
    ws_sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    engine: &EngineHandle,
    conn: ConnId,
    text: &str,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Message { content }) => {
            engine.send(EngineEvent::Input {
                conn,
                line: content,
            });
        }
        Ok(ClientMessage::Ping) => {
            if let Some(frame) = to_frame(&ServerMessage::Pong) {
                let _ = ws_sender.send(frame).await;
            }
        }
        Err(e) => {
            tracing::debug!("Failed to parse client message: {}", e);
            if let Some(frame) = to_frame(&ServerMessage::error("invalid message format")) {
                let _ = ws_sender.send(frame).await;
            }
        }
    }
}
