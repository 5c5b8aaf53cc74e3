//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::SessionInput;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Each connection gets a fresh server-assigned
/// identity; nothing the client sends can impersonate another player.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let session = state.default_session.clone();
    let snapshot_rx = session.snapshot_tx.subscribe();

    // Connection open maps 1:1 to joining the simulation
    if session
        .input_tx
        .send(SessionInput::Join { player_id })
        .await
        .is_err()
    {
        error!(player_id = %player_id, "Session is gone, dropping connection");
        return;
    }

    run_session(player_id, ws_sink, ws_stream, &session.input_tx, snapshot_rx).await;

    // Connection close maps 1:1 to leaving the simulation
    let _ = session
        .input_tx
        .send(SessionInput::Leave { player_id })
        .await;

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: &mpsc::Sender<SessionInput>,
    mut snapshot_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Writer task: session broadcast -> WebSocket
    let writer_player_id = player_id;
    let writer_handle = tokio::spawn(async move {
        loop {
            match snapshot_rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Snapshots are full-state; a lagged client just skips
                    // some and picks up from the next one
                    warn!(
                        player_id = %writer_player_id,
                        lagged_count = n,
                        "Client lagged, skipping {} snapshots", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %writer_player_id, "Snapshot channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> session task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let input = SessionInput::Msg {
                            player_id,
                            msg: client_msg,
                            received_at: unix_millis(),
                        };

                        if input_tx.send(input).await.is_err() {
                            debug!(player_id = %player_id, "Input channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
