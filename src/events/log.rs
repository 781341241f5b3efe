//! Per-match append-only event log.

use super::segment::Segment;
use crate::error::{Result, StoreError};
use crate::matches::MatchRegistry;
use crate::types::{CommentaryEvent, CommentaryInput, MatchId, Sequence, ValidCommentary};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Single-writer state for one match.
struct Lane {
    /// Every event of the match, index == sequence.
    events: Vec<CommentaryEvent>,
    /// Backing file (None = in-memory store).
    segment: Option<Segment>,
}

impl Lane {
    fn next_sequence(&self) -> Sequence {
        Sequence(self.events.len() as u64)
    }
}

/// The source of truth for commentary.
///
/// Appends to one match are serialized through that match's lane; lanes of
/// different matches never contend with each other.
pub struct EventLog {
    registry: Arc<MatchRegistry>,

    /// Directory holding `<match_id>.log` segments (None = in-memory).
    dir: Option<PathBuf>,

    /// Passed to each segment.
    sync_interval: u64,

    lanes: RwLock<HashMap<MatchId, Arc<Mutex<Lane>>>>,
}

impl EventLog {
    /// Create a log that keeps events in memory only.
    pub fn in_memory(registry: Arc<MatchRegistry>) -> Self {
        Self {
            registry,
            dir: None,
            sync_interval: 1,
            lanes: RwLock::new(HashMap::new()),
        }
    }

    /// Open a log backed by segment files under `dir`, replaying every
    /// match the registry knows about.
    pub fn open(
        dir: impl Into<PathBuf>,
        registry: Arc<MatchRegistry>,
        sync_interval: u64,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        // Every segment on disk must belong to a registered match
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("log") {
                continue;
            }
            let known = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
                .is_some_and(|id| registry.contains(MatchId(id)));
            if !known {
                return Err(StoreError::Corruption(format!(
                    "segment {} has no registered match",
                    path.display()
                )));
            }
        }

        let log = Self {
            registry,
            dir: Some(dir),
            sync_interval,
            lanes: RwLock::new(HashMap::new()),
        };

        let mut replayed = 0usize;
        for m in log.registry.list_matches() {
            let lane = log.open_lane(m.match_id, true)?;
            replayed += lane.events.len();
            log.lanes
                .write()
                .insert(m.match_id, Arc::new(Mutex::new(lane)));
        }

        info!(
            matches = log.registry.len(),
            events = replayed,
            "event log replayed"
        );

        Ok(log)
    }

    /// Open the segment of a match. `replay` is false for matches registered
    /// after the log was opened, whose segment must start out empty.
    fn open_lane(&self, match_id: MatchId, replay: bool) -> Result<Lane> {
        match &self.dir {
            None => Ok(Lane {
                events: Vec::new(),
                segment: None,
            }),
            Some(dir) => {
                let path = dir.join(format!("{}.log", match_id.0));
                if !replay && fs::metadata(&path).is_ok_and(|meta| meta.len() > 0) {
                    return Err(StoreError::Corruption(format!(
                        "segment {} already holds data for new match {}",
                        path.display(),
                        match_id
                    )));
                }
                let (segment, events) = Segment::open(path, match_id, self.sync_interval)?;
                Ok(Lane {
                    events,
                    segment: Some(segment),
                })
            }
        }
    }

    /// Find the lane for a match, creating it on first use.
    fn lane(&self, match_id: MatchId) -> Result<Arc<Mutex<Lane>>> {
        if let Some(lane) = self.lanes.read().get(&match_id) {
            return Ok(Arc::clone(lane));
        }

        if !self.registry.contains(match_id) {
            return Err(StoreError::MatchNotFound(match_id));
        }

        let mut lanes = self.lanes.write();
        if let Some(lane) = lanes.get(&match_id) {
            return Ok(Arc::clone(lane));
        }

        let lane = Arc::new(Mutex::new(self.open_lane(match_id, false)?));
        lanes.insert(match_id, Arc::clone(&lane));
        Ok(lane)
    }

    // --- Appends ---

    /// Append a submission to a match.
    pub fn append(&self, match_id: MatchId, input: CommentaryInput) -> Result<CommentaryEvent> {
        self.append_then(match_id, input, |_| {})
    }

    /// Append, then run `on_commit` with the stored event before the lane
    /// is released. Callbacks for one match therefore run in sequence order.
    pub fn append_then<F>(
        &self,
        match_id: MatchId,
        input: CommentaryInput,
        on_commit: F,
    ) -> Result<CommentaryEvent>
    where
        F: FnOnce(&CommentaryEvent),
    {
        let valid = input.validate()?;
        self.append_valid_then(match_id, valid, on_commit)
    }

    /// Like [`EventLog::append_then`] for input that was already validated.
    pub fn append_valid_then<F>(
        &self,
        match_id: MatchId,
        valid: ValidCommentary,
        on_commit: F,
    ) -> Result<CommentaryEvent>
    where
        F: FnOnce(&CommentaryEvent),
    {
        let lane = self.lane(match_id)?;
        let mut lane = lane.lock();

        let sequence = lane.next_sequence();
        let event = CommentaryEvent::from_valid(match_id, sequence, valid, Utc::now());

        if let Some(segment) = lane.segment.as_mut() {
            segment.append(&event)?;
        }
        lane.events.push(event.clone());

        debug!(match_id = %match_id, sequence = %sequence, event_type = %event.event_type, "commentary appended");

        on_commit(&event);
        Ok(event)
    }

    // --- Reads ---

    /// Every event of a match in ascending sequence.
    pub fn read_all(&self, match_id: MatchId) -> Result<Vec<CommentaryEvent>> {
        let lane = self.lane(match_id)?;
        let lane = lane.lock();
        Ok(lane.events.clone())
    }

    /// Events with a sequence strictly greater than `after` (all of them
    /// when `after` is None).
    pub fn read_after(
        &self,
        match_id: MatchId,
        after: Option<Sequence>,
    ) -> Result<Vec<CommentaryEvent>> {
        let lane = self.lane(match_id)?;
        let lane = lane.lock();
        let start = match after {
            None => 0,
            Some(seq) => usize::try_from(seq.0).map_or(lane.events.len(), |seq| {
                seq.saturating_add(1).min(lane.events.len())
            }),
        };
        Ok(lane.events[start..].to_vec())
    }

    /// Number of events stored for a match.
    pub fn len(&self, match_id: MatchId) -> Result<usize> {
        Ok(self.lane(match_id)?.lock().events.len())
    }

    /// Highest assigned sequence, None while the match has no events.
    pub fn last_sequence(&self, match_id: MatchId) -> Result<Option<Sequence>> {
        Ok(self.lane(match_id)?.lock().next_sequence().prev())
    }

    /// Events across all matches.
    pub fn total_events(&self) -> u64 {
        let lanes: Vec<_> = self.lanes.read().values().cloned().collect();
        lanes
            .iter()
            .map(|lane| lane.lock().events.len() as u64)
            .sum()
    }

    /// Force sync all segments to disk.
    pub fn sync(&self) -> Result<()> {
        let lanes: Vec<_> = self.lanes.read().values().cloned().collect();
        for lane in lanes {
            if let Some(segment) = lane.lock().segment.as_mut() {
                segment.sync()?;
            }
        }
        Ok(())
    }
}
