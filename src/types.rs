//! Core types for the commentary store.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a match, assigned by the registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Debug for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MatchId({})", self.0)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event in its match's log. Zero-based and gapless.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }

    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(Sequence(self.0 - 1))
        } else {
            None
        }
    }
}

/// Identifies one push connection for the lifetime of the process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conn({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Match lifecycle. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Completed => "completed",
        }
    }

    /// Whether `self -> next` respects `scheduled -> live -> completed`.
    /// Staying put is allowed.
    pub fn can_advance_to(self, next: MatchStatus) -> bool {
        next >= self
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "live" => Ok(MatchStatus::Live),
            "completed" => Ok(MatchStatus::Completed),
            other => Err(StoreError::validation(format!("unknown match status: {other:?}"))),
        }
    }
}

/// Kind of delivery outcome a commentary event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    Run,
    Wicket,
    Wide,
    NoBall,
    Bye,
    LegBye,
    Boundary,
    Six,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::Run,
        EventType::Wicket,
        EventType::Wide,
        EventType::NoBall,
        EventType::Bye,
        EventType::LegBye,
        EventType::Boundary,
        EventType::Six,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Run => "run",
            EventType::Wicket => "wicket",
            EventType::Wide => "wide",
            EventType::NoBall => "no-ball",
            EventType::Bye => "bye",
            EventType::LegBye => "leg-bye",
            EventType::Boundary => "boundary",
            EventType::Six => "six",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::validation(format!("unrecognized eventType: {s:?}")))
    }
}

/// A scored fixture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub match_id: MatchId,
    pub team1: String,
    pub team2: String,
    pub venue: String,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

/// Request to start a match.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMatch {
    #[serde(default)]
    pub team1: String,
    #[serde(default)]
    pub team2: String,
    #[serde(default)]
    pub venue: String,
    /// Initial status; `live` when absent.
    #[serde(default)]
    pub status: Option<MatchStatus>,
}

impl NewMatch {
    pub fn new(team1: impl Into<String>, team2: impl Into<String>, venue: impl Into<String>) -> Self {
        Self {
            team1: team1.into(),
            team2: team2.into(),
            venue: venue.into(),
            status: None,
        }
    }

    /// Register the match without starting play.
    pub fn scheduled(mut self) -> Self {
        self.status = Some(MatchStatus::Scheduled);
        self
    }
}

/// An integer field as reporters submit it: a JSON number or a numeric string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Int(i64),
    Text(String),
}

impl Numeric {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Numeric::Int(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<i64> for Numeric {
    fn from(n: i64) -> Self {
        Numeric::Int(n)
    }
}

impl From<&str> for Numeric {
    fn from(s: &str) -> Self {
        Numeric::Text(s.to_string())
    }
}

/// A commentary submission before validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryInput {
    #[serde(default)]
    pub over: Option<Numeric>,
    #[serde(default)]
    pub ball: Option<Numeric>,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub runs: Option<Numeric>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub batsman: Option<String>,
    #[serde(default)]
    pub bowler: Option<String>,
}

impl CommentaryInput {
    pub fn new(
        over: i64,
        ball: i64,
        event_type: impl Into<String>,
        runs: i64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            over: Some(over.into()),
            ball: Some(ball.into()),
            event_type: event_type.into(),
            runs: Some(runs.into()),
            description: description.into(),
            batsman: None,
            bowler: None,
        }
    }

    pub fn with_batsman(mut self, batsman: impl Into<String>) -> Self {
        self.batsman = Some(batsman.into());
        self
    }

    pub fn with_bowler(mut self, bowler: impl Into<String>) -> Self {
        self.bowler = Some(bowler.into());
        self
    }

    /// Check the shape of the submission. Nothing is stored on failure.
    pub fn validate(self) -> Result<ValidCommentary> {
        let over = positive(self.over.as_ref(), "over")?;
        let ball = positive(self.ball.as_ref(), "ball")?;
        let event_type: EventType = self.event_type.trim().parse()?;

        let runs = match self.runs.as_ref() {
            None => 0,
            Some(value) => value
                .as_i64()
                .filter(|n| *n >= 0)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| StoreError::validation("runs must be a non-negative integer"))?,
        };

        let description = self.description.trim();
        if description.is_empty() {
            return Err(StoreError::validation("description is required"));
        }

        Ok(ValidCommentary {
            over,
            ball,
            event_type,
            runs,
            description: description.to_string(),
            batsman: non_blank(self.batsman),
            bowler: non_blank(self.bowler),
        })
    }
}

fn positive(value: Option<&Numeric>, field: &str) -> Result<u32> {
    value
        .and_then(Numeric::as_i64)
        .filter(|n| *n >= 1)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| StoreError::validation(format!("{field} must be a positive integer")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A submission that passed validation; only the log assigns the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidCommentary {
    pub over: u32,
    pub ball: u32,
    pub event_type: EventType,
    pub runs: u32,
    pub description: String,
    pub batsman: Option<String>,
    pub bowler: Option<String>,
}

/// One stored ball-by-ball event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryEvent {
    pub match_id: MatchId,
    /// Assigned by the log; the only ordering key.
    pub sequence: Sequence,
    /// Reporter-supplied display metadata, may repeat or go backwards.
    pub over: u32,
    pub ball: u32,
    pub event_type: EventType,
    pub runs: u32,
    pub description: String,
    pub batsman: Option<String>,
    pub bowler: Option<String>,
    /// Server clock at append.
    pub timestamp: DateTime<Utc>,
}

impl CommentaryEvent {
    pub(crate) fn from_valid(
        match_id: MatchId,
        sequence: Sequence,
        valid: ValidCommentary,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            match_id,
            sequence,
            over: valid.over,
            ball: valid.ball,
            event_type: valid.event_type,
            runs: valid.runs,
            description: valid.description,
            batsman: valid.batsman,
            bowler: valid.bowler,
            timestamp,
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub match_count: u64,
    pub event_count: u64,
    pub subscription_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_navigation() {
        let seq = Sequence(5);
        assert_eq!(seq.next(), Sequence(6));
        assert_eq!(seq.prev(), Some(Sequence(4)));
        assert_eq!(Sequence(0).prev(), None);
    }

    #[test]
    fn test_status_only_moves_forward() {
        assert!(MatchStatus::Scheduled.can_advance_to(MatchStatus::Live));
        assert!(MatchStatus::Live.can_advance_to(MatchStatus::Completed));
        assert!(MatchStatus::Scheduled.can_advance_to(MatchStatus::Completed));
        assert!(MatchStatus::Live.can_advance_to(MatchStatus::Live));
        assert!(!MatchStatus::Completed.can_advance_to(MatchStatus::Live));
        assert!(!MatchStatus::Live.can_advance_to(MatchStatus::Scheduled));
    }

    #[test]
    fn test_event_type_wire_names() {
        for t in EventType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!(matches!(
            "dot".parse::<EventType>(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_accepts_numeric_strings() {
        let input: CommentaryInput = serde_json::from_str(
            r#"{"over":"3","ball":"4","eventType":"boundary","runs":"4","description":"Driven","batsman":"","bowler":"Cummins"}"#,
        )
        .unwrap();

        let valid = input.validate().unwrap();
        assert_eq!(valid.over, 3);
        assert_eq!(valid.ball, 4);
        assert_eq!(valid.event_type, EventType::Boundary);
        assert_eq!(valid.runs, 4);
        assert_eq!(valid.batsman, None);
        assert_eq!(valid.bowler.as_deref(), Some("Cummins"));
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let base = CommentaryInput::new(1, 1, "run", 1, "Quick single");

        let mut empty = base.clone();
        empty.description = "   ".into();
        assert!(matches!(empty.validate(), Err(StoreError::Validation(_))));

        let negative = CommentaryInput::new(1, 1, "run", -1, "odd");
        assert!(matches!(negative.validate(), Err(StoreError::Validation(_))));

        let unknown = CommentaryInput::new(1, 1, "dot", 0, "no run");
        assert!(matches!(unknown.validate(), Err(StoreError::Validation(_))));

        let mut no_over = base.clone();
        no_over.over = Some("".into());
        assert!(matches!(no_over.validate(), Err(StoreError::Validation(_))));

        let zero_ball = CommentaryInput::new(1, 0, "run", 1, "x");
        assert!(matches!(zero_ball.validate(), Err(StoreError::Validation(_))));

        assert!(base.validate().is_ok());
    }

    #[test]
    fn test_runs_not_tied_to_event_type() {
        let valid = CommentaryInput::new(2, 3, "six", 2, "Scored as two")
            .validate()
            .unwrap();
        assert_eq!(valid.event_type, EventType::Six);
        assert_eq!(valid.runs, 2);
    }

    #[test]
    fn test_missing_runs_defaults_to_zero() {
        let input: CommentaryInput = serde_json::from_str(
            r#"{"over":1,"ball":1,"eventType":"wicket","description":"Bowled him"}"#,
        )
        .unwrap();
        assert_eq!(input.validate().unwrap().runs, 0);
    }
}
