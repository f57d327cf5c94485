//! Same-profile publish/subscribe channel for surface wake-ups.
//!
//! [`SignalChannel`] wraps a [`tokio::sync::broadcast`] channel on the fixed
//! [`SIGNAL_TOPIC`]. Each surface takes a [`SignalEndpoint`], which stamps
//! its own [`SourceTag`] on every publish and filters its own messages back
//! out on receive. Delivery is fire-and-forget: no acknowledgment, no
//! persistence, lagging receivers lose the oldest hints.

use tokio::sync::broadcast;

use super::EventId;
use super::signal::{SIGNAL_TOPIC, SignalHint, SignalKind, SignalMessage, SourceTag};

/// Broadcast channel for [`SignalMessage`]s.
#[derive(Debug, Clone)]
pub struct SignalChannel {
    sender: broadcast::Sender<SignalMessage>,
}

impl SignalChannel {
    /// Creates a new channel with the given ring-buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Namespace every endpoint of this channel shares.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        SIGNAL_TOPIC
    }

    /// Creates an endpoint with a fresh source tag.
    #[must_use]
    pub fn endpoint(&self) -> SignalEndpoint {
        SignalEndpoint {
            tag: SourceTag::new(),
            sender: self.sender.clone(),
        }
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A surface's handle on the signal channel.
#[derive(Debug, Clone)]
pub struct SignalEndpoint {
    tag: SourceTag,
    sender: broadcast::Sender<SignalMessage>,
}

impl SignalEndpoint {
    /// Tag stamped on everything this endpoint publishes.
    #[must_use]
    pub const fn tag(&self) -> SourceTag {
        self.tag
    }

    /// Publishes a message tagged with this endpoint's source tag.
    ///
    /// Returns the number of receivers reached, including this surface's
    /// own subscriptions (which discard it). Zero receivers is not an error.
    pub fn publish(&self, mut message: SignalMessage) -> usize {
        message.source_tag = Some(self.tag);
        let kind = message.kind;
        let event_id = message.event_id;
        let reached = self.sender.send(message).unwrap_or(0);
        tracing::trace!(
            source = %self.tag,
            %event_id,
            kind = kind.as_str(),
            reached,
            "signal published"
        );
        reached
    }

    /// Convenience wrapper around [`Self::publish`].
    pub fn notify(&self, kind: SignalKind, event_id: EventId, hint: Option<SignalHint>) -> usize {
        let mut message = SignalMessage::new(kind, event_id);
        message.state = hint;
        self.publish(message)
    }

    /// Subscribes to messages from other surfaces.
    ///
    /// With `event_id` set, messages for other events are skipped.
    #[must_use]
    pub fn subscribe(&self, event_id: Option<EventId>) -> SignalSubscription {
        SignalSubscription {
            own_tag: self.tag,
            event_id,
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side of a [`SignalEndpoint`] with echo suppression.
#[derive(Debug)]
pub struct SignalSubscription {
    own_tag: SourceTag,
    event_id: Option<EventId>,
    receiver: broadcast::Receiver<SignalMessage>,
}

impl SignalSubscription {
    /// Waits for the next message published by another surface.
    ///
    /// Returns `None` once every sender is gone. Lag is logged and skipped:
    /// the reconciliation poll covers whatever was dropped.
    pub async fn recv(&mut self) -> Option<SignalMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => {
                    if let Some(message) = self.accept(message) {
                        return Some(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "signal subscriber lagged; dropped hints");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next pending message from another surface without
    /// waiting, or `None` if nothing is queued.
    pub fn try_recv(&mut self) -> Option<SignalMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    if let Some(message) = self.accept(message) {
                        return Some(message);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "signal subscriber lagged; dropped hints");
                }
                Err(_) => return None,
            }
        }
    }

    fn accept(&self, message: SignalMessage) -> Option<SignalMessage> {
        if message.is_from(self.own_tag) {
            return None;
        }
        match self.event_id {
            Some(id) if id != message.event_id => None,
            _ => Some(message),
        }
    }
}
