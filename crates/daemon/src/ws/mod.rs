// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The websocket endpoint the rulebook worker dials into.
//!
//! # Module layout
//!
//! - [`messages`] — wire types and the audit url rewrite
//! - [`handlers`] — per-message handling against the store
//!
//! One task per connection; messages are independent, so there is no
//! shared per-connection state — the database is the only shared state.

pub mod handlers;
pub mod messages;

pub use handlers::MessageContext;
pub use messages::{InboundMessage, OutboundMessage};

use futures_util::{SinkExt, StreamExt};
use rr_core::Clock;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Accept rulebook worker connections until shutdown.
pub async fn serve<C: Clock>(
    listen_addr: &str,
    context: Arc<MessageContext<C>>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "websocket endpoint listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                tracing::debug!(%peer, "worker connection accepted");
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, context).await {
                        tracing::warn!(%peer, error = %e, "connection ended with error");
                    }
                });
            }
        }
    }
    tracing::info!("websocket endpoint stopped");
    Ok(())
}

async fn handle_connection<C: Clock>(
    stream: TcpStream,
    context: Arc<MessageContext<C>>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => {
                let inbound: InboundMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable worker message");
                        continue;
                    }
                };
                for response in context.handle(inbound) {
                    let payload = match serde_json::to_string(&response) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::error!(error = %e, "response serialization failed");
                            continue;
                        }
                    };
                    write.send(Message::text(payload)).await?;
                }
            }
            Message::Close(_) => break,
            // Ping/Pong/Binary — ignore
            _ => {}
        }
    }
    Ok(())
}
