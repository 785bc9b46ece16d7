//! WebSocket transport for the local UI control socket (§4.1a): binds
//! `127.0.0.1:5805` and bridges each client connection to the shared
//! [`UiChannel`].

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::BridgeError;
use crate::ui::channel::UiChannel;
use crate::ui::message::{Command, Message};

/// Binds `listen_addr` and serves UI clients until the process exits.
/// A bind failure is the one fatal error this bridge produces (§6).
pub async fn serve(listen_addr: &str, channel: Arc<UiChannel>) -> Result<(), BridgeError> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(BridgeError::ListenBind)?;
    tracing::info!("listening for UI clients on {listen_addr}");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!("failed to accept UI connection: {err}");
                continue;
            }
        };
        let channel = channel.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, channel).await {
                tracing::debug!("UI connection from {peer} ended: {err}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    channel: Arc<UiChannel>,
) -> Result<(), BridgeError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|err| BridgeError::TransportOpen {
            transport: "ui-websocket",
            source: std::io::Error::other(err),
        })?;
    let (mut sink, mut stream) = ws.split();

    let (id, mut outbound) = channel.register();
    channel.send_to(
        id,
        Message::Log {
            level: "info",
            message: "Bridge connected".to_string(),
        },
    );

    let forward = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = serde_json::to_string(&message).unwrap_or_default();
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let Ok(frame) = frame else { break };
        let WsMessage::Text(text) = frame else {
            continue;
        };
        if let Ok(command) = serde_json::from_str::<Command>(&text) {
            channel.submit(id, command);
        }
    }

    channel.unregister(id);
    forward.abort();
    Ok(())
}
