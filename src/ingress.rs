//! WebSocket audio ingress
//!
//! The relay node connects here and streams per-speaker PCM chunks as JSON
//! frames with base64 audio. Spoken replies travel the other way as `speak`
//! frames; every connected client receives them.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::audio::AudioBufferStore;
use crate::relay::SpeechSynth;

/// Incoming frame from the audio relay
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsIncoming {
    /// One PCM chunk for a speaker, audio base64-encoded
    Audio { user: String, audio: String },
    /// Keep-alive
    Ping,
}

/// Outgoing frame to the audio relay
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoing {
    /// Synthesize and play this text in the speaker's channel
    Speak { user: String, text: String },
    Pong,
}

/// Shared state for the ingress server
pub struct IngressState {
    store: Arc<Mutex<AudioBufferStore>>,
    outbound: broadcast::Sender<WsOutgoing>,
}

impl IngressState {
    #[must_use]
    pub fn new(store: Arc<Mutex<AudioBufferStore>>) -> Arc<Self> {
        let (outbound, _) = broadcast::channel(64);
        Arc::new(Self { store, outbound })
    }

    /// Speech-delivery handle backed by this server's outbound channel.
    #[must_use]
    pub fn speaker_handle(&self) -> WsSpeaker {
        WsSpeaker {
            outbound: self.outbound.clone(),
        }
    }
}

/// Delivers spoken replies through the websocket's outbound channel
pub struct WsSpeaker {
    outbound: broadcast::Sender<WsOutgoing>,
}

#[async_trait::async_trait]
impl SpeechSynth for WsSpeaker {
    async fn say(&self, speaker: &str, text: &str) {
        tracing::info!(speaker, text, "speaking");
        let frame = WsOutgoing::Speak {
            user: speaker.to_string(),
            text: text.to_string(),
        };
        // no connected relay means nobody to hear it; drop silently
        if self.outbound.send(frame).is_err() {
            tracing::debug!("no relay connected, speech dropped");
        }
    }
}

/// Build the ingress router
pub fn router(state: Arc<IngressState>) -> Router {
    Router::new()
        .route("/audio", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the ingress forever.
///
/// # Errors
///
/// Returns error if the listen port cannot be bound.
pub async fn serve(port: u16, state: Arc<IngressState>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "audio ingress listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn ws_upgrade(
    State(state): State<Arc<IngressState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<IngressState>) {
    tracing::info!("relay connected");
    let (mut sender, mut receiver) = socket.split();
    let mut outbound = state.outbound.subscribe();

    let forward = tokio::spawn(async move {
        while let Ok(frame) = outbound.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        match serde_json::from_str::<WsIncoming>(&text) {
            Ok(WsIncoming::Audio { user, audio }) => match BASE64.decode(audio.as_bytes()) {
                Ok(pcm) => {
                    let mut store = state.store.lock().await;
                    store.append(&user, &pcm, std::time::Instant::now());
                }
                Err(e) => {
                    tracing::warn!(user, error = %e, "undecodable audio frame");
                }
            },
            Ok(WsIncoming::Ping) => {
                // Pong rides the broadcast channel like any other frame
                let _ = state.outbound.send(WsOutgoing::Pong);
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame");
            }
        }
    }

    forward.abort();
    tracing::info!("relay disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_audio_frame_parses() {
        let raw = r#"{"type":"audio","user":"alice","audio":"AAECAw=="}"#;
        let frame: WsIncoming = serde_json::from_str(raw).unwrap();
        match frame {
            WsIncoming::Audio { user, audio } => {
                assert_eq!(user, "alice");
                assert_eq!(BASE64.decode(audio).unwrap(), vec![0, 1, 2, 3]);
            }
            WsIncoming::Ping => panic!("wrong variant"),
        }
    }

    #[test]
    fn speak_frame_serializes() {
        let frame = WsOutgoing::Speak {
            user: "alice".to_string(),
            text: "Hi, how may I help you?".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"speak""#));
        assert!(json.contains(r#""user":"alice""#));
    }
}
