//! WebSocket handler for real-time client communication.
//!
//! On connect the client gets a bootstrap snapshot; after that, every
//! broadcast event is pushed as JSON. The one inbound request, AUTO_SELECT,
//! performs single-candidate auto-selection and answers with a fresh
//! bootstrap snapshot.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use crate::api::http::StatusResponse;
use crate::api::AppState;

/// Incoming WebSocket message envelope.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsIncoming {
    AutoSelect,
}

/// Outgoing non-broadcast messages.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    Bootstrap { payload: StatusResponse },
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    if send_bootstrap(&mut sink, &state).await.is_err() {
        return;
    }

    // Forward broadcast events until the client goes away. Lagged receivers
    // just skip what they missed; the next snapshot heals them.
    let mut events = BroadcastStream::new(state.event_bridge.subscribe());
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(lag)) => {
                    log::warn!("[WS] client lagging behind event stream: {}", lag);
                    if send_bootstrap(&mut sink, &state).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(WsIncoming::AutoSelect) = serde_json::from_str(&text) {
                        auto_select(&state).await;
                        if send_bootstrap(&mut sink, &state).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::debug!("[WS] receive error: {}", err);
                    break;
                }
            },
        }
    }
}

async fn send_bootstrap(
    sink: &mut (impl futures::Sink<Message, Error = axum::Error> + Unpin),
    state: &AppState,
) -> Result<(), axum::Error> {
    let bootstrap = WsOutgoing::Bootstrap {
        payload: StatusResponse {
            controller: state.controller.snapshot(),
            cast: state.cast.snapshot(),
        },
    };
    let text = serde_json::to_string(&bootstrap).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}

/// When exactly one candidate exists and nothing is selected, select it:
/// core, zone and receiver each independently.
async fn auto_select(state: &AppState) {
    let controller = state.controller.snapshot();

    if controller.cores.len() == 1 && !controller.cores[0].is_active {
        let core_id = controller.cores[0].id.clone();
        if let Err(err) = state.controller.select_core(&core_id) {
            log::warn!("[WS] auto-select core failed: {}", err);
        }
    }

    if controller.zones.len() == 1
        && controller.selected_zone_id.as_deref() != Some(controller.zones[0].zone_id.as_str())
    {
        let zone_id = controller.zones[0].zone_id.clone();
        if let Err(err) = state.controller.select_zone(&zone_id) {
            log::warn!("[WS] auto-select zone failed: {}", err);
        }
    }

    let cast = state.cast.snapshot();
    if cast.devices.len() == 1 && !cast.devices[0].is_selected {
        let device_id = cast.devices[0].id.clone();
        if let Err(err) = state.cast.select_device(&device_id).await {
            log::warn!("[WS] auto-select receiver failed: {}", err);
        }
    }
}
