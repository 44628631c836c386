//! Push channel — unsolicited notifications broadcast to socket listeners.
//!
//! Any thread may enqueue through a [`PushSender`]. The bridge runtime drains
//! the channel and sends each push to every open socket connection without
//! waiting for acknowledgement.

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use scale_net::names::{ACTIVE_CHARACTER_CHANGE, messages};
use scale_net::{Response, encode};

use crate::transport::socket::ConnectionRegistry;

/// Receiving half of the push channel.
pub type PushReceiver = mpsc::UnboundedReceiver<Response>;

/// Create a push channel.
#[must_use]
pub fn channel() -> (PushSender, PushReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PushSender { tx }, rx)
}

/// Build the notification sent when the active-id set changes.
#[must_use]
pub fn active_change_push(ids: &[u32]) -> Response {
    Response::push(
        ACTIVE_CHARACTER_CHANGE,
        messages::ACTIVE_CHARACTERS_CHANGED,
        json!(ids),
    )
}

/// Cloneable, thread-safe producer half of the push channel.
#[derive(Debug, Clone)]
pub struct PushSender {
    tx: mpsc::UnboundedSender<Response>,
}

impl PushSender {
    /// Enqueue a push.
    ///
    /// Returns `false` if the bridge has shut down.
    pub fn notify(&self, push: Response) -> bool {
        self.tx.send(push).is_ok()
    }

    /// Enqueue an `ActiveCharacterChange` push carrying `ids`.
    pub fn active_characters_changed(&self, ids: &[u32]) -> bool {
        debug!(ids = ?ids, "queueing active character push");
        self.notify(active_change_push(ids))
    }
}

/// Forward pushes to every socket connection until shutdown or until every
/// sender is gone.
pub async fn broadcast_pushes(
    mut pushes: PushReceiver,
    connections: ConnectionRegistry,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            push = pushes.recv() => {
                let Some(push) = push else { break };
                match encode(&push) {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes);
                        let sent = connections.broadcast_text(&text);
                        debug!(context = ?push.context, recipients = sent, "broadcast push");
                    }
                    Err(err) => warn!(%err, "failed to encode push"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("push broadcaster stopped");
}

#[cfg(test)]
mod tests {
    use scale_net::ResponseType;
    use tokio::sync::mpsc::unbounded_channel;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_active_change_push_shape() {
        let push = active_change_push(&[1, 3, 5]);
        assert_eq!(push.kind, ResponseType::Push);
        assert_eq!(push.context.as_deref(), Some(ACTIVE_CHARACTER_CHANGE));
        assert_eq!(push.message.as_deref(), Some(messages::ACTIVE_CHARACTERS_CHANGED));
        assert_eq!(push.data, Some(json!([1, 3, 5])));
        assert!(push.uuid.is_none());
    }

    #[test]
    fn test_notify_after_receiver_dropped() {
        let (tx, rx) = channel();
        assert!(tx.active_characters_changed(&[1]));
        drop(rx);
        assert!(!tx.active_characters_changed(&[2]));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        let connections = ConnectionRegistry::new();
        let (a_tx, mut a_rx) = unbounded_channel();
        let (b_tx, mut b_rx) = unbounded_channel();
        connections.register(Uuid::new_v4(), a_tx);
        connections.register(Uuid::new_v4(), b_tx);

        let (push_tx, push_rx) = channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(broadcast_pushes(push_rx, connections, shutdown_rx));

        push_tx.active_characters_changed(&[4, 9]);
        let a = a_rx.recv().await.unwrap();
        let b = b_rx.recv().await.unwrap();
        assert_eq!(a, b);
        let decoded: Response = serde_json::from_str(&a).unwrap();
        assert_eq!(decoded.data, Some(json!([4, 9])));

        drop(push_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_broadcaster_stops_on_shutdown() {
        let (_push_tx, push_rx) = channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(broadcast_pushes(push_rx, ConnectionRegistry::new(), shutdown_rx));
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
