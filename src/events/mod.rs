//! Commentary event log.
//!
//! Each match owns an append-only, gapless sequence of events starting at
//! zero. Appends to a match go through a single writer lane, so the
//! sequence order is the append order. With a data directory the events of
//! a match are also framed into a checksummed segment file.

mod log;
mod segment;

pub use log::EventLog;
pub use segment::Segment;
