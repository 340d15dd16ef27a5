use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::session::{DaemonContext, Session};

/// Close code sent when the requested subpath fails the sandbox check.
pub const CLOSE_AUTHORIZATION_DENIED: u16 = 4401;

pub fn router(ctx: Arc<DaemonContext>) -> Router {
    Router::new()
        .route("/__fuzzy", get(root_route))
        .route("/__fuzzy/", get(root_route))
        .route("/__fuzzy/{*subpath}", get(subpath_route))
        .with_state(ctx)
}

pub async fn serve_until_shutdown(
    listener: TcpListener,
    ctx: Arc<DaemonContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .context("fuzzy websocket server failed")
}

async fn root_route(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<DaemonContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx, String::new()))
}

async fn subpath_route(
    ws: WebSocketUpgrade,
    Path(subpath): Path<String>,
    State(ctx): State<Arc<DaemonContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx, subpath))
}

async fn handle_socket(mut socket: WebSocket, ctx: Arc<DaemonContext>, subpath: String) {
    let mut session = Session::new(ctx);
    if let Err(error) = session.open(&subpath) {
        warn!(%error, "rejecting connection");
        let frame =
            CloseFrame { code: CLOSE_AUTHORIZATION_DENIED, reason: "invalid subpath".into() };
        let _ = socket.send(WsMessage::Close(Some(frame))).await;
        return;
    }

    while let Some(message_result) = socket.recv().await {
        let Ok(message) = message_result else {
            break;
        };

        let payload = match message {
            WsMessage::Text(payload) => payload.as_bytes().to_vec(),
            WsMessage::Binary(payload) => payload.to_vec(),
            WsMessage::Ping(payload) => {
                if socket.send(WsMessage::Pong(payload)).await.is_err() {
                    break;
                }
                continue;
            }
            WsMessage::Pong(_) => continue,
            WsMessage::Close(_) => break,
        };

        // Store I/O and the search process block; run them off the reactor.
        // The next frame is not read until this command has finished.
        let joined = tokio::task::spawn_blocking(move || {
            let reply = session.handle_message(&payload);
            (session, reply)
        })
        .await;
        let reply = match joined {
            Ok((returned, reply)) => {
                session = returned;
                reply
            }
            Err(error) => {
                warn!(?error, session = %subpath, "command task failed, dropping connection");
                return;
            }
        };

        let Some(reply) = reply else {
            continue;
        };
        match serde_json::to_string(&reply) {
            Ok(encoded) => {
                if socket.send(WsMessage::Text(encoded.into())).await.is_err() {
                    break;
                }
            }
            Err(error) => {
                warn!(?error, "failed to encode reply");
                break;
            }
        }
    }

    debug!(session = %subpath, "socket loop finished");
    session.close();
}
