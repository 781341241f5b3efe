//! Subscription types for live commentary delivery.

use crate::types::{CommentaryEvent, ConnectionId, MatchId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Messages pushed to subscribed connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushMessage {
    /// A new event was appended to a match the connection joined.
    #[serde(rename_all = "camelCase")]
    CommentaryUpdate {
        match_id: MatchId,
        commentary: CommentaryEvent,
    },

    /// The connection was removed from a match's room.
    #[serde(rename_all = "camelCase")]
    Dropped { match_id: MatchId, reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiving side went away.
    Disconnected,
}

/// A push could not be handed to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber buffer is full")]
    BufferOverflow,

    #[error("subscriber is disconnected")]
    Disconnected,
}

impl DeliveryError {
    pub fn reason(self) -> DropReason {
        match self {
            DeliveryError::BufferOverflow => DropReason::BufferOverflow,
            DeliveryError::Disconnected => DropReason::Disconnected,
        }
    }
}

/// Anything that can receive pushed commentary.
///
/// `deliver` must not block: it either queues the message or fails.
pub trait Subscriber: Send + Sync {
    fn connection_id(&self) -> ConnectionId;

    fn deliver(&self, message: &PushMessage) -> Result<(), DeliveryError>;
}

/// In-process subscriber backed by a bounded channel.
pub struct ChannelSubscriber {
    id: ConnectionId,
    sender: crossbeam_channel::Sender<PushMessage>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the handle that drains it.
    pub fn pair(id: ConnectionId, buffer_size: usize) -> SubscriptionHandle {
        let (sender, receiver) = crossbeam_channel::bounded(buffer_size.max(1));
        SubscriptionHandle {
            subscriber: Arc::new(Self { id, sender }),
            receiver,
        }
    }
}

impl Subscriber for ChannelSubscriber {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn deliver(&self, message: &PushMessage) -> Result<(), DeliveryError> {
        match self.sender.try_send(message.clone()) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::TrySendError::Full(_)) => Err(DeliveryError::BufferOverflow),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                Err(DeliveryError::Disconnected)
            }
        }
    }
}

/// Receiving end of an in-process connection.
///
/// Dropping the handle makes the next delivery fail, which removes the
/// connection from every room it joined.
pub struct SubscriptionHandle {
    subscriber: Arc<ChannelSubscriber>,
    /// Channel to receive pushes.
    pub receiver: crossbeam_channel::Receiver<PushMessage>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> ConnectionId {
        self.subscriber.id
    }

    /// The subscriber to hand to the broker.
    pub fn subscriber(&self) -> Arc<dyn Subscriber> {
        self.subscriber.clone()
    }

    /// Receive the next push (blocking).
    pub fn recv(&self) -> Result<PushMessage, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a push (non-blocking).
    pub fn try_recv(&self) -> Result<PushMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PushMessage, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything queued right now.
    pub fn drain(&self) -> Vec<PushMessage> {
        self.receiver.try_iter().collect()
    }
}

/// Outcome of one broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the event was queued for.
    pub delivered: usize,
    /// Connections removed because delivery failed.
    pub dropped: Vec<ConnectionId>,
}
