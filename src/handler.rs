//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake with
//! identity extraction, frame decoding, and the reader/writer task pair
//! bridging the socket and the hub.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::client::ClientHandle;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::guard::RateLimiter;
use crate::hub::{HubCommand, HubHandle};
use crate::identity;
use crate::message::{ClientMessage, ServerMessage};
use crate::types::{ClientId, Frame};

/// Accept connections until the listener fails
pub async fn serve(listener: TcpListener, hub: HubHandle, config: Arc<ServerConfig>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let hub = hub.clone();
                let config = Arc::clone(&config);

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, hub, config).await {
                        warn!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, rejecting upgrades without an
/// identity, then runs the session.
pub async fn handle_connection(
    stream: TcpStream,
    hub: HubHandle,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_bytes);
    ws_config.max_frame_size = Some(config.max_message_bytes);

    let mut username = None;
    let ws_stream = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match identity::username_from_request(req) {
                Some(name) => {
                    username = Some(name);
                    Ok(response)
                }
                None => {
                    warn!("Rejected upgrade from {}: no identity", peer_addr);
                    Err(identity::unauthorized())
                }
            }
        },
        Some(ws_config),
    )
    .await?;

    let Some(username) = username else {
        return Ok(());
    };
    info!(username = %username, "Connection from {} upgraded", peer_addr);

    serve_connection(ws_stream, username, hub, &config).await
}

/// Run one client session over an established WebSocket
///
/// Registers the client, runs the reader and writer tasks, and issues
/// exactly one unregister when the session ends, whichever side fails
/// first.
pub async fn serve_connection<S>(
    ws_stream: WebSocketStream<S>,
    username: String,
    hub: HubHandle,
    config: &ServerConfig,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (ws_sender, ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    let (client, outbound) = ClientHandle::new(client_id, username, config.outbound_capacity);

    hub.register(client.clone()).await.inspect_err(|_| {
        error!("Failed to register client {} - hub closed", client_id);
    })?;

    let limiter = RateLimiter::new(config.rate_limit);
    let mut read_task = tokio::spawn(read_loop(ws_receiver, client.clone(), hub.clone(), limiter));
    let mut write_task = tokio::spawn(write_loop(ws_sender, outbound, client.clone()));

    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", client_id);
            teardown(&hub, &client).await;
            // The writer drains what is left, sends a close frame and exits
            let _ = write_task.await;
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", client_id);
            read_task.abort();
            teardown(&hub, &client).await;
        }
    }

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Single teardown path for a session
async fn teardown(hub: &HubHandle, client: &ClientHandle) {
    if hub.unregister(client.id()).await.is_err() {
        // No hub to close the queue for us
        client.close();
    }
}

/// Socket → hub
async fn read_loop<R>(
    mut ws_receiver: R,
    client: ClientHandle,
    hub: HubHandle,
    mut limiter: Option<RateLimiter>,
) where
    R: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let client_id = client.id();
    let mut throttled = false;

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if let Some(limiter) = limiter.as_mut() {
                    if !limiter.allow() {
                        if !throttled {
                            warn!("Rate limiting {}", client_id);
                            reply(&client, AppError::RateLimited);
                        }
                        throttled = true;
                        continue;
                    }
                }
                throttled = false;

                match ClientMessage::decode(text.as_str()) {
                    Ok(client_msg) => {
                        let cmd = client_message_to_command(client_id, client_msg);
                        if hub.send(cmd).await.is_err() {
                            debug!("Hub closed, ending read task for {}", client_id);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Invalid message from {}: {}", client_id, e);
                        reply(&client, e);
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Client {} sent close frame", client_id);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Pong replies are handled by tungstenite
            }
            Ok(_) => {
                debug!("Ignoring non-text frame from {}", client_id);
            }
            Err(e) => {
                debug!("WebSocket read error for {}: {}", client_id, e);
                break;
            }
        }
    }
    debug!("Read task ended for {}", client_id);
}

/// Outbound queue → socket
///
/// Eviction ends the task at once, even in the middle of a send that a
/// stalled peer never lets complete.
async fn write_loop<W>(mut ws_sender: W, mut outbound: mpsc::Receiver<Frame>, client: ClientHandle)
where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let client_id = client.id();

    loop {
        let frame = tokio::select! {
            biased;
            _ = client.evicted() => {
                debug!("Client {} evicted, abandoning connection", client_id);
                return;
            }
            frame = outbound.recv() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        tokio::select! {
            biased;
            _ = client.evicted() => {
                debug!("Client {} evicted mid-send, abandoning connection", client_id);
                return;
            }
            result = ws_sender.send(Message::Text(frame.to_string().into())) => {
                if let Err(e) = result {
                    debug!("WebSocket send failed for {}: {}", client_id, e);
                    return;
                }
            }
        }
    }
    debug!("Outbound queue closed for {}", client_id);

    // Send close frame when done
    let _ = ws_sender.close().await;
}

/// Queue an error for the sender of a bad frame
fn reply(client: &ClientHandle, err: AppError) {
    let Some(frame) = ServerMessage::from(err).to_frame() else {
        return;
    };
    if let Err(e) = client.try_send(frame) {
        debug!("Dropped error reply for {}: {}", client.id(), e);
    }
}

/// Convert a ClientMessage to a HubCommand
fn client_message_to_command(client_id: ClientId, msg: ClientMessage) -> HubCommand {
    match msg {
        ClientMessage::CreateRoom { room_id } => HubCommand::CreateRoom { client_id, room_id },
        ClientMessage::JoinRoom { room_id } => HubCommand::JoinRoom { client_id, room_id },
        ClientMessage::LeaveRoom => HubCommand::LeaveRoom { client_id },
        ClientMessage::Chat { content } => HubCommand::Chat { client_id, content },
        ClientMessage::Signal { target, content } => HubCommand::Signal {
            client_id,
            target,
            content,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_to_command() {
        let id = ClientId::new();
        let cmd = client_message_to_command(
            id,
            ClientMessage::Signal {
                target: "bob".to_string(),
                content: json!({"candidate": "x"}),
            },
        );
        match cmd {
            HubCommand::Signal {
                client_id,
                target,
                content,
            } => {
                assert_eq!(client_id, id);
                assert_eq!(target, "bob");
                assert_eq!(content["candidate"], "x");
            }
            other => panic!("Wrong command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reply_queues_error_frame() {
        let (client, mut rx) = ClientHandle::new(ClientId::new(), "alice", 4);
        reply(&client, AppError::Malformed("eof".to_string()));

        let msg: ServerMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(
            msg,
            ServerMessage::Error { content } if content.code == crate::message::ErrorCode::Malformed
        ));
    }
}
