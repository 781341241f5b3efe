//! Snapshots for clients catching up, and the cursor that dedupes pushes
//! against them.

use crate::error::Result;
use crate::events::EventLog;
use crate::matches::MatchRegistry;
use crate::types::{CommentaryEvent, Match, MatchId, Sequence};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Match metadata plus its commentary in ascending sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    #[serde(rename = "match")]
    pub match_info: Match,
    pub commentary: Vec<CommentaryEvent>,
}

impl MatchSnapshot {
    /// Highest sequence included, None for a match without commentary.
    pub fn last_sequence(&self) -> Option<Sequence> {
        self.commentary.last().map(|e| e.sequence)
    }
}

/// Read side over the registry and the event log.
pub struct SnapshotService {
    registry: Arc<MatchRegistry>,
    log: Arc<EventLog>,
}

impl SnapshotService {
    pub fn new(registry: Arc<MatchRegistry>, log: Arc<EventLog>) -> Self {
        Self { registry, log }
    }

    pub fn get_snapshot(&self, match_id: MatchId) -> Result<MatchSnapshot> {
        let match_info = self.registry.get_match(match_id)?;
        let commentary = self.log.read_all(match_id)?;
        Ok(MatchSnapshot {
            match_info,
            commentary,
        })
    }

    /// Events after `after`, for a client that already holds a prefix.
    pub fn commentary_after(
        &self,
        match_id: MatchId,
        after: Option<Sequence>,
    ) -> Result<Vec<CommentaryEvent>> {
        self.log.read_after(match_id, after)
    }
}

/// What a cursor made of an incoming event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Next in line; the cursor advanced.
    Fresh,
    /// Already seen (in the snapshot or an earlier push).
    Duplicate,
    /// Events before this one were missed. Re-snapshot.
    Gap { expected: Sequence },
}

/// Tracks the highest sequence a consumer has applied for one match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceCursor {
    last: Option<Sequence>,
}

impl SequenceCursor {
    pub fn new(last: Option<Sequence>) -> Self {
        Self { last }
    }

    pub fn from_snapshot(snapshot: &MatchSnapshot) -> Self {
        Self::new(snapshot.last_sequence())
    }

    pub fn last(&self) -> Option<Sequence> {
        self.last
    }

    fn expected(&self) -> Sequence {
        self.last.map_or(Sequence(0), Sequence::next)
    }

    pub fn admit(&mut self, event: &CommentaryEvent) -> Admission {
        let expected = self.expected();
        if event.sequence < expected {
            Admission::Duplicate
        } else if event.sequence == expected {
            self.last = Some(event.sequence);
            Admission::Fresh
        } else {
            Admission::Gap { expected }
        }
    }
}
