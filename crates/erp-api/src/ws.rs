//! WebSocket push channel
//!
//! `GET /ws?token=<jwt>` joins the caller's rooms and forwards matching hub
//! events as JSON text frames.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use erp_auth::{builtin, CurrentUser};
use erp_notifications::rooms_for;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::extractors::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: String,
}

/// GET /ws
///
/// The token is checked before the upgrade so a bad token always gets the
/// JSON error envelope.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let user = state.authenticator.authenticate_token(&params.token).await?;
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };
    Ok(upgrade
        .on_upgrade(move |socket| serve_socket(state, user, socket))
        .into_response())
}

async fn serve_socket(state: AppState, user: CurrentUser, socket: WebSocket) {
    let rooms = rooms_for(user.id, user.has_permission(builtin::ADMIN_ACTIVITY));
    let mut events = state.hub.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!(user_id = user.id, rooms = ?rooms, "WebSocket connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !event.is_for(&rooms) {
                        continue;
                    }
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode event {}: {}", event.event, e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(user_id = user.id, skipped, "WebSocket subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) if text.trim() == "ping" => {
                    if sender.send(Message::Text("pong".into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(user_id = user.id, "WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    info!(user_id = user.id, "WebSocket disconnected");
}
