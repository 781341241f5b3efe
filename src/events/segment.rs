//! On-disk segment holding one match's events.
//!
//! Frame layout:
//! `magic(4) | version(1) | body_len u32 LE | body (MessagePack) | crc32(body) u32 LE`

use crate::error::{Result, StoreError};
use crate::types::{CommentaryEvent, MatchId, Sequence};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Magic bytes for each event frame.
const FRAME_MAGIC: &[u8; 4] = b"CEV\0";

/// Current frame format version.
const FRAME_VERSION: u8 = 1;

/// Fixed bytes before the body: magic + version + body length.
const FRAME_HEADER_SIZE: usize = 4 + 1 + 4;

/// Trailing checksum size.
const FRAME_TRAILER_SIZE: usize = 4;

/// Append-only file of commentary events for a single match.
pub struct Segment {
    file: File,
    /// Current file size (offset of the next frame).
    size: u64,
    /// Number of writes since last sync.
    writes_since_sync: u64,
    /// Sync every N writes (1 = every write is durable before returning).
    sync_interval: u64,
}

impl Segment {
    /// Open or create the segment and replay what it holds.
    ///
    /// A partially written trailing frame is cut off. Damage inside a
    /// complete frame is an error.
    pub fn open(
        path: impl AsRef<Path>,
        match_id: MatchId,
        sync_interval: u64,
    ) -> Result<(Self, Vec<CommentaryEvent>)> {
        let path = path.as_ref().to_path_buf();

        let bytes = if path.exists() {
            fs::read(&path)?
        } else {
            Vec::new()
        };

        let (events, valid_len) = Self::replay(&bytes, match_id)?;

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        if (valid_len as usize) < bytes.len() {
            warn!(
                match_id = %match_id,
                path = %path.display(),
                dropped_bytes = bytes.len() - valid_len as usize,
                "truncating torn frame at end of segment"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok((
            Self {
                file,
                size: valid_len,
                writes_since_sync: 0,
                sync_interval: sync_interval.max(1),
            },
            events,
        ))
    }

    /// Append an event frame. Returns the offset it was written at.
    ///
    /// On failure the file is cut back so no partial frame is left behind.
    pub fn append(&mut self, event: &CommentaryEvent) -> Result<u64> {
        let frame = encode_frame(event)?;
        let offset = self.size;

        if let Err(e) = self.file.write_all(&frame) {
            let _ = self.file.set_len(offset);
            return Err(e.into());
        }

        self.writes_since_sync += 1;
        if self.writes_since_sync >= self.sync_interval {
            if let Err(e) = self.file.sync_data() {
                let _ = self.file.set_len(offset);
                return Err(e.into());
            }
            self.writes_since_sync = 0;
        }

        self.size = offset + frame.len() as u64;
        Ok(offset)
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Get current file size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Decode every complete frame. Returns the events and the byte length
    /// they occupy.
    fn replay(bytes: &[u8], match_id: MatchId) -> Result<(Vec<CommentaryEvent>, u64)> {
        let mut events = Vec::new();
        let mut offset = 0usize;

        while offset < bytes.len() {
            let rest = &bytes[offset..];
            if rest.len() < FRAME_HEADER_SIZE {
                break;
            }

            // Magic
            if &rest[0..4] != FRAME_MAGIC {
                return Err(StoreError::InvalidFormat(format!(
                    "Invalid frame magic at offset {offset}"
                )));
            }

            // Version
            if rest[4] != FRAME_VERSION {
                return Err(StoreError::InvalidFormat(format!(
                    "Unsupported frame version: {}",
                    rest[4]
                )));
            }

            // Body
            let body_len = u32::from_le_bytes([rest[5], rest[6], rest[7], rest[8]]) as usize;
            let frame_len = FRAME_HEADER_SIZE + body_len + FRAME_TRAILER_SIZE;
            if rest.len() < frame_len {
                break;
            }
            let body = &rest[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + body_len];

            // Checksum
            let trailer = &rest[FRAME_HEADER_SIZE + body_len..frame_len];
            let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
            let computed = crc32fast::hash(body);
            if stored != computed {
                return Err(StoreError::ChecksumMismatch {
                    expected: stored,
                    got: computed,
                });
            }

            let event: CommentaryEvent = rmp_serde::from_slice(body)?;

            let expected = Sequence(events.len() as u64);
            if event.sequence != expected || event.match_id != match_id {
                return Err(StoreError::Corruption(format!(
                    "segment for match {match_id} holds {:?} of match {} where {:?} was expected",
                    event.sequence, event.match_id, expected
                )));
            }

            events.push(event);
            offset += frame_len;
        }

        Ok((events, offset as u64))
    }
}

fn encode_frame(event: &CommentaryEvent) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec_named(event)?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len() + FRAME_TRAILER_SIZE);
    frame.extend_from_slice(FRAME_MAGIC);
    frame.push(FRAME_VERSION);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use chrono::Utc;
    use tempfile::TempDir;

    fn event(sequence: u64) -> CommentaryEvent {
        CommentaryEvent {
            match_id: MatchId(1),
            sequence: Sequence(sequence),
            over: 1,
            ball: (sequence % 6 + 1) as u32,
            event_type: EventType::Run,
            runs: 1,
            description: format!("ball {sequence}"),
            batsman: Some("Kohli".into()),
            bowler: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.log");

        {
            let (mut segment, events) = Segment::open(&path, MatchId(1), 1).unwrap();
            assert!(events.is_empty());

            let first = segment.append(&event(0)).unwrap();
            let second = segment.append(&event(1)).unwrap();
            assert_eq!(first, 0);
            assert!(second > first);
        }

        let (segment, events) = Segment::open(&path, MatchId(1), 1).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], event_like(&events[1], 1));
        assert_eq!(segment.size(), fs::metadata(&path).unwrap().len());
    }

    fn event_like(actual: &CommentaryEvent, sequence: u64) -> CommentaryEvent {
        CommentaryEvent {
            timestamp: actual.timestamp,
            ..event(sequence)
        }
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.log");

        {
            let (mut segment, _) = Segment::open(&path, MatchId(1), 1).unwrap();
            segment.append(&event(0)).unwrap();
            segment.append(&event(1)).unwrap();
        }

        let full_len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full_len - 3).unwrap();

        let (mut segment, events) = Segment::open(&path, MatchId(1), 1).unwrap();
        assert_eq!(events.len(), 1);

        // Appending continues cleanly after the cut
        segment.append(&event(1)).unwrap();
        drop(segment);
        let (_, events) = Segment::open(&path, MatchId(1), 1).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.log");

        {
            let (mut segment, _) = Segment::open(&path, MatchId(1), 1).unwrap();
            segment.append(&event(0)).unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        bytes[FRAME_HEADER_SIZE + 2] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let result = Segment::open(&path, MatchId(1), 1);
        assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_sequence_gap_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.log");

        {
            let (mut segment, _) = Segment::open(&path, MatchId(1), 1).unwrap();
            segment.append(&event(0)).unwrap();
            segment.append(&event(2)).unwrap();
        }

        let result = Segment::open(&path, MatchId(1), 1);
        assert!(matches!(result, Err(StoreError::Corruption(_))));
    }
}
