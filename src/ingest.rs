//! Ingest gateway: the write path for commentary.

use crate::error::{Result, StoreError};
use crate::events::EventLog;
use crate::matches::MatchRegistry;
use crate::subscriptions::SubscriptionBroker;
use crate::types::{CommentaryEvent, CommentaryInput, MatchId};
use std::sync::Arc;
use tracing::debug;

/// Accepts reporter submissions: validate, append, broadcast.
pub struct IngestGateway {
    registry: Arc<MatchRegistry>,
    log: Arc<EventLog>,
    broker: Arc<SubscriptionBroker>,
}

impl IngestGateway {
    pub fn new(
        registry: Arc<MatchRegistry>,
        log: Arc<EventLog>,
        broker: Arc<SubscriptionBroker>,
    ) -> Self {
        Self {
            registry,
            log,
            broker,
        }
    }

    /// Store a submission and push it to the match's subscribers.
    ///
    /// The broadcast runs while the match's writer lane is held, so
    /// subscribers see events of one match in sequence order. Nothing is
    /// stored or pushed when this returns an error.
    pub fn submit(&self, match_id: MatchId, input: CommentaryInput) -> Result<CommentaryEvent> {
        if !self.registry.contains(match_id) {
            return Err(StoreError::MatchNotFound(match_id));
        }
        let valid = input.validate()?;

        self.log.append_valid_then(match_id, valid, |event| {
            let report = self.broker.broadcast(match_id, event);
            debug!(
                match_id = %match_id,
                sequence = %event.sequence,
                delivered = report.delivered,
                dropped = report.dropped.len(),
                "commentary broadcast"
            );
        })
    }
}
