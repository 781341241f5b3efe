//! Subscription broker: per-match rooms and fan-out.

use crate::error::{Result, StoreError};
use crate::matches::MatchRegistry;
use crate::types::{CommentaryEvent, ConnectionId, MatchId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{BroadcastReport, ChannelSubscriber, PushMessage, Subscriber, SubscriptionHandle};

/// Default capacity of an in-process subscriber's queue.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Connections joined to one match.
#[derive(Default)]
struct Room {
    members: Mutex<HashMap<ConnectionId, Arc<dyn Subscriber>>>,
}

/// Tracks which connections follow which match and pushes events to them.
///
/// Lock order is a room's members, then `memberships`. A room and the
/// reverse index therefore change together.
pub struct SubscriptionBroker {
    registry: Arc<MatchRegistry>,
    /// Rooms by match.
    rooms: RwLock<HashMap<MatchId, Arc<Room>>>,
    /// Reverse index used on disconnect.
    memberships: Mutex<HashMap<ConnectionId, HashSet<MatchId>>>,
    /// Counter for generating connection IDs.
    next_id: AtomicU64,
    buffer_size: usize,
}

impl SubscriptionBroker {
    /// Create a new broker.
    pub fn new(registry: Arc<MatchRegistry>) -> Self {
        Self::with_buffer_size(registry, DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broker whose in-process connections queue `buffer_size`
    /// pushes before being dropped.
    pub fn with_buffer_size(registry: Arc<MatchRegistry>, buffer_size: usize) -> Self {
        Self {
            registry,
            rooms: RwLock::new(HashMap::new()),
            memberships: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size,
        }
    }

    /// Allocate an ID for a new connection of any transport.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Open an in-process connection. It joins no match yet.
    pub fn connect(&self) -> SubscriptionHandle {
        ChannelSubscriber::pair(self.next_connection_id(), self.buffer_size)
    }

    /// Open an in-process connection with its own queue size.
    pub fn connect_with_buffer(&self, buffer_size: usize) -> SubscriptionHandle {
        ChannelSubscriber::pair(self.next_connection_id(), buffer_size)
    }

    fn room(&self, match_id: MatchId) -> Option<Arc<Room>> {
        self.rooms.read().get(&match_id).cloned()
    }

    /// Join a match. Joining twice keeps one membership.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>, match_id: MatchId) -> Result<()> {
        if !self.registry.contains(match_id) {
            return Err(StoreError::MatchNotFound(match_id));
        }

        let connection = subscriber.connection_id();
        let room = match self.room(match_id) {
            Some(room) => room,
            None => self.rooms.write().entry(match_id).or_default().clone(),
        };

        let mut members = room.members.lock();
        members.insert(connection, subscriber);
        self.memberships
            .lock()
            .entry(connection)
            .or_default()
            .insert(match_id);
        drop(members);

        debug!(connection = %connection, match_id = %match_id, "subscribed");
        Ok(())
    }

    /// Leave a match. No-op if not joined.
    pub fn unsubscribe(&self, connection: ConnectionId, match_id: MatchId) {
        let Some(room) = self.room(match_id) else {
            return;
        };

        let mut members = room.members.lock();
        members.remove(&connection);
        forget(&mut self.memberships.lock(), connection, match_id);
    }

    /// Leave every match, as on disconnect. Returns how many were left.
    pub fn unsubscribe_all(&self, connection: ConnectionId) -> usize {
        let joined = self
            .memberships
            .lock()
            .remove(&connection)
            .unwrap_or_default();

        for match_id in &joined {
            if let Some(room) = self.room(*match_id) {
                room.members.lock().remove(&connection);
            }
        }

        if !joined.is_empty() {
            debug!(connection = %connection, matches = joined.len(), "unsubscribed from all");
        }
        joined.len()
    }

    // --- Broadcasting ---

    /// Push an event to every connection in the match's room.
    ///
    /// Delivery never blocks. A connection that cannot take the event is
    /// removed from the room; the others still receive it.
    pub fn broadcast(&self, match_id: MatchId, event: &CommentaryEvent) -> BroadcastReport {
        let Some(room) = self.room(match_id) else {
            return BroadcastReport::default();
        };

        let message = PushMessage::CommentaryUpdate {
            match_id,
            commentary: event.clone(),
        };

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        {
            let mut members = room.members.lock();
            for (id, subscriber) in members.iter() {
                match subscriber.deliver(&message) {
                    Ok(()) => report.delivered += 1,
                    Err(e) => failed.push((*id, e)),
                }
            }

            if !failed.is_empty() {
                let mut memberships = self.memberships.lock();
                for (id, error) in &failed {
                    if let Some(subscriber) = members.remove(id) {
                        // Try to notify about the drop (might fail, that's ok)
                        let _ = subscriber.deliver(&PushMessage::Dropped {
                            match_id,
                            reason: error.reason(),
                        });
                    }
                    forget(&mut memberships, *id, match_id);
                }
            }
        }

        for (id, error) in failed {
            warn!(
                connection = %id,
                match_id = %match_id,
                sequence = %event.sequence,
                error = %error,
                "dropping subscriber"
            );
            report.dropped.push(id);
        }

        report
    }

    // --- Introspection ---

    /// Connections currently joined to a match.
    pub fn subscriber_count(&self, match_id: MatchId) -> usize {
        self.room(match_id)
            .map_or(0, |room| room.members.lock().len())
    }

    /// Matches a connection has joined, in ID order.
    pub fn subscriptions_of(&self, connection: ConnectionId) -> Vec<MatchId> {
        let mut joined: Vec<MatchId> = self
            .memberships
            .lock()
            .get(&connection)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        joined.sort();
        joined
    }

    pub fn is_subscribed(&self, connection: ConnectionId, match_id: MatchId) -> bool {
        self.room(match_id)
            .is_some_and(|room| room.members.lock().contains_key(&connection))
    }

    /// Total memberships across all matches.
    pub fn subscription_count(&self) -> usize {
        let rooms: Vec<_> = self.rooms.read().values().cloned().collect();
        rooms.iter().map(|room| room.members.lock().len()).sum()
    }
}

/// Remove one match from a connection's entry in the reverse index.
fn forget(
    memberships: &mut HashMap<ConnectionId, HashSet<MatchId>>,
    connection: ConnectionId,
    match_id: MatchId,
) {
    if let Some(joined) = memberships.get_mut(&connection) {
        joined.remove(&match_id);
        if joined.is_empty() {
            memberships.remove(&connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::types::{DeliveryError, DropReason};
    use crate::types::{EventType, NewMatch, Sequence};
    use chrono::Utc;
    use std::time::Duration;

    fn setup() -> (SubscriptionBroker, MatchId, MatchId) {
        let registry = Arc::new(MatchRegistry::in_memory());
        let a = registry
            .create_match(NewMatch::new("India", "Australia", "MCG"))
            .unwrap()
            .match_id;
        let b = registry
            .create_match(NewMatch::new("England", "Pakistan", "Lord's"))
            .unwrap()
            .match_id;
        (SubscriptionBroker::new(registry), a, b)
    }

    fn make_test_event(match_id: MatchId, sequence: u64) -> CommentaryEvent {
        CommentaryEvent {
            match_id,
            sequence: Sequence(sequence),
            over: 1,
            ball: 1,
            event_type: EventType::Run,
            runs: 1,
            description: "Quick single".into(),
            batsman: None,
            bowler: None,
            timestamp: Utc::now(),
        }
    }

    /// Subscriber that always refuses.
    struct Gone(ConnectionId);

    impl Subscriber for Gone {
        fn connection_id(&self) -> ConnectionId {
            self.0
        }

        fn deliver(&self, _message: &PushMessage) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError::Disconnected)
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let (broker, a, _) = setup();
        let handle = broker.connect();

        broker.subscribe(handle.subscriber(), a).unwrap();
        assert_eq!(broker.subscriber_count(a), 1);

        broker.unsubscribe(handle.id(), a);
        assert_eq!(broker.subscriber_count(a), 0);
        assert!(broker.subscriptions_of(handle.id()).is_empty());

        // Leaving again is a no-op
        broker.unsubscribe(handle.id(), a);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let (broker, a, _) = setup();
        let handle = broker.connect();

        broker.subscribe(handle.subscriber(), a).unwrap();
        broker.subscribe(handle.subscriber(), a).unwrap();
        assert_eq!(broker.subscriber_count(a), 1);

        broker.broadcast(a, &make_test_event(a, 0));
        assert_eq!(handle.drain().len(), 1);
    }

    #[test]
    fn test_subscribe_unknown_match() {
        let (broker, _, _) = setup();
        let handle = broker.connect();

        let result = broker.subscribe(handle.subscriber(), MatchId(77));
        assert!(matches!(result, Err(StoreError::MatchNotFound(MatchId(77)))));
        assert_eq!(broker.subscription_count(), 0);
    }

    #[test]
    fn test_broadcast_only_to_room() {
        let (broker, a, b) = setup();
        let on_a = broker.connect();
        let on_b = broker.connect();
        broker.subscribe(on_a.subscriber(), a).unwrap();
        broker.subscribe(on_b.subscriber(), b).unwrap();

        let event = make_test_event(a, 0);
        let report = broker.broadcast(a, &event);
        assert_eq!(report.delivered, 1);

        let received = on_a.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(
            received,
            PushMessage::CommentaryUpdate {
                match_id: a,
                commentary: event
            }
        );
        assert!(on_b.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_failed_delivery_drops_only_that_subscriber() {
        let (broker, a, b) = setup();
        let healthy = broker.connect();
        let gone = Arc::new(Gone(broker.next_connection_id()));

        broker.subscribe(healthy.subscriber(), a).unwrap();
        broker.subscribe(gone.clone(), a).unwrap();
        broker.subscribe(gone.clone(), b).unwrap();

        let report = broker.broadcast(a, &make_test_event(a, 0));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![gone.0]);

        assert_eq!(broker.subscriber_count(a), 1);
        // Still joined elsewhere until a delivery there fails
        assert_eq!(broker.subscriptions_of(gone.0), vec![b]);
        assert_eq!(healthy.drain().len(), 1);
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let (broker, a, _) = setup();
        let slow = broker.connect_with_buffer(2);
        let fast = broker.connect_with_buffer(64);
        broker.subscribe(slow.subscriber(), a).unwrap();
        broker.subscribe(fast.subscriber(), a).unwrap();

        for seq in 0..10 {
            broker.broadcast(a, &make_test_event(a, seq));
        }

        assert!(!broker.is_subscribed(slow.id(), a));
        assert!(broker.is_subscribed(fast.id(), a));
        assert_eq!(slow.drain().len(), 2);
        assert_eq!(fast.drain().len(), 10);
    }

    #[test]
    fn test_dropped_handle_is_removed() {
        let (broker, a, _) = setup();
        let handle = broker.connect();
        let id = handle.id();
        broker.subscribe(handle.subscriber(), a).unwrap();
        drop(handle);

        let report = broker.broadcast(a, &make_test_event(a, 0));
        assert_eq!(report.dropped, vec![id]);
        assert_eq!(broker.subscriber_count(a), 0);
    }

    #[test]
    fn test_unsubscribe_all() {
        let (broker, a, b) = setup();
        let handle = broker.connect();
        broker.subscribe(handle.subscriber(), a).unwrap();
        broker.subscribe(handle.subscriber(), b).unwrap();
        assert_eq!(broker.subscriptions_of(handle.id()), vec![a, b]);

        assert_eq!(broker.unsubscribe_all(handle.id()), 2);
        assert_eq!(broker.subscription_count(), 0);

        let report = broker.broadcast(a, &make_test_event(a, 0));
        assert_eq!(report, BroadcastReport::default());
        assert!(handle.drain().is_empty());
    }

    #[test]
    fn test_drop_notice_reason() {
        let (broker, a, _) = setup();
        // Fill the queue with one push, then drain so the notice fits.
        let handle = broker.connect_with_buffer(1);
        broker.subscribe(handle.subscriber(), a).unwrap();
        broker.broadcast(a, &make_test_event(a, 0));
        let report = broker.broadcast(a, &make_test_event(a, 1));
        assert_eq!(report.dropped, vec![handle.id()]);

        let first = handle.try_recv().unwrap();
        assert!(matches!(first, PushMessage::CommentaryUpdate { .. }));
        // The notice could not fit either; nothing else is queued.
        assert!(handle.try_recv().is_err());
        assert_eq!(DeliveryError::BufferOverflow.reason(), DropReason::BufferOverflow);
    }

    #[test]
    fn test_rejoin_after_drop_is_indexed() {
        let (broker, a, b) = setup();
        let handle = broker.connect_with_buffer(1);
        broker.subscribe(handle.subscriber(), a).unwrap();
        broker.subscribe(handle.subscriber(), b).unwrap();

        broker.broadcast(a, &make_test_event(a, 0));
        let report = broker.broadcast(a, &make_test_event(a, 1));
        assert_eq!(report.dropped, vec![handle.id()]);
        assert_eq!(broker.subscriptions_of(handle.id()), vec![b]);

        handle.drain();
        broker.subscribe(handle.subscriber(), a).unwrap();
        assert!(broker.is_subscribed(handle.id(), a));
        assert_eq!(broker.subscriptions_of(handle.id()), vec![a, b]);

        // Disconnect reaches every room the index knows about
        assert_eq!(broker.unsubscribe_all(handle.id()), 2);
        assert_eq!(broker.subscriber_count(a), 0);
        assert_eq!(broker.subscriber_count(b), 0);
    }
}
