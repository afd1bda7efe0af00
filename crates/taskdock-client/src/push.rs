//! Push channel: one live WebSocket subscription streaming status deltas.
//!
//! Events arrive for any task whose server-side state changes, including
//! changes caused by other clients. A dropped or refused connection is
//! retried after a fixed delay, without limit; an explicit shutdown via
//! the cancellation token exits without scheduling a reconnect.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use taskdock_core::wire::decode_push_event;

use crate::engine::EngineEvent;

pub async fn run_push_channel(
    ws_url: Url,
    reconnect_delay: Duration,
    events: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) {
    loop {
        let connect = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            connect = connect_async(ws_url.as_str()) => connect,
        };

        match connect {
            Ok((mut ws, _)) => {
                debug!("push_connected: {ws_url}");
                loop {
                    let message = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            let _ = ws.close(None).await;
                            return;
                        }
                        message = ws.next() => message,
                    };
                    match message {
                        Some(Ok(Message::Text(text))) => match decode_push_event(&text) {
                            Ok(event) => {
                                if events.send(EngineEvent::Push(event)).await.is_err() {
                                    return;
                                }
                            }
                            // Dropping the frame keeps the subscription
                            // alive; a malformed payload must not take
                            // reconnection down with it.
                            Err(err) => warn!("push_decode_error: {err}"),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!("push_read_error: {err}");
                            break;
                        }
                    }
                }
            }
            Err(err) => warn!("push_connect_error: {err}"),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}
