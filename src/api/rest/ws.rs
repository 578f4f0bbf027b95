use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::SinkExt;
use futures::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::realtime::session::Session;
use crate::realtime::ServerEvent;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut published = BroadcastStream::new(state.hub.subscribe());
    let mut session = Session::new();

    state.metrics.ws_connections.inc();
    info!("websocket client connected");

    'connection: loop {
        tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'connection,
                    Some(Ok(_)) => continue,
                };

                for reply in session.handle_frame(&state, &text) {
                    if send_event(&mut sender, &reply).await.is_err() {
                        break 'connection;
                    }
                }
            }
            next = published.next() => {
                match next {
                    Some(Ok(envelope)) => {
                        if session.wants(&envelope)
                            && send_event(&mut sender, &envelope.event).await.is_err()
                        {
                            break 'connection;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!(skipped, "websocket client lagged; missed updates dropped");
                    }
                    None => break 'connection,
                }
            }
        }
    }

    state.metrics.ws_connections.dec();
    info!("websocket client disconnected");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, event = event.name(), "failed to serialize event for ws");
            return Ok(());
        }
    };

    sender.send(Message::Text(json.into())).await
}
