//! Bridge from the realtime channel to the session actor
//!
//! Subscribes to inbound channel events and connection state, converts them
//! into actor messages and forwards them in the order received.

use super::actor::SessionMessage;
use super::remote::RemoteEvent;
use crate::api::ParagraphStore;
use crate::channel::{ChannelEvent, ConnectionState};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bridge task
///
/// - Lagged subscribers log the number of skipped events and keep going
/// - Stops when cancelled, when the channel closes or when the actor is gone
pub(crate) async fn run_channel_bridge(
    mut events: broadcast::Receiver<ChannelEvent>,
    mut state: watch::Receiver<ConnectionState>,
    actor: mpsc::Sender<SessionMessage>,
    paragraphs: Arc<dyn ParagraphStore>,
    cancel: CancellationToken,
) {
    debug!("Channel bridge started");
    let mut watching_state = true;

    // Initial state, in case it changed before we subscribed
    let initial = *state.borrow_and_update();
    if actor.send(SessionMessage::Connection(initial)).await.is_err() {
        return;
    }

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            changed = state.changed(), if watching_state => match changed {
                Ok(()) => SessionMessage::Connection(*state.borrow_and_update()),
                Err(_) => {
                    watching_state = false;
                    continue;
                }
            },
            received = events.recv() => match received {
                Ok(event) => match RemoteEvent::parse(&event) {
                    Some(remote) => tokio::select! {
                        _ = cancel.cancelled() => break,
                        remote = complete_from_store(remote, paragraphs.as_ref(), &actor) => {
                            SessionMessage::Remote(remote)
                        }
                    },
                    None => continue,
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Channel bridge lagged, events skipped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Channel closed, bridge stopping");
                    break;
                }
            },
        };

        if actor.send(message).await.is_err() {
            debug!("Session actor gone, bridge stopping");
            break;
        }
    }
    debug!("Channel bridge stopped");
}

/// Fill in the text of a completion event that arrived without it
///
/// The stored paragraph is forwarded to the actor first so the cache matches.
async fn complete_from_store(
    event: RemoteEvent,
    paragraphs: &dyn ParagraphStore,
    actor: &mpsc::Sender<SessionMessage>,
) -> RemoteEvent {
    let (paragraph_id, mut result) = match event {
        RemoteEvent::Completed {
            paragraph_id,
            result,
        } => (paragraph_id, result),
        other => return other,
    };
    if result.text().is_some() {
        return RemoteEvent::Completed { paragraph_id, result };
    }

    match paragraphs.get_paragraph(&paragraph_id).await {
        Ok(paragraph) => {
            result.translated_text = paragraph.translated_text.clone();
            if actor.send(SessionMessage::ParagraphSaved(paragraph)).await.is_err() {
                debug!(paragraph_id = %paragraph_id, "Session actor gone, paragraph not cached");
            }
        }
        Err(e) => {
            warn!(paragraph_id = %paragraph_id, error = %e, "Could not load completed paragraph");
        }
    }
    RemoteEvent::Completed { paragraph_id, result }
}
