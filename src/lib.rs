//! # Ball-by-ball
//!
//! Live cricket commentary: an append-only, per-match log of ball-by-ball
//! events and the fan-out that pushes each event to every connection
//! following that match.
//!
//! ## Core Concepts
//!
//! - **Matches**: Registry of matches and their forward-only status
//! - **Events**: Per-match log; sequences start at 0 and have no gaps
//! - **Subscriptions**: Per-match rooms, non-blocking delivery
//! - **Snapshots**: Full or incremental history for catching up, plus a
//!   cursor that drops pushes already seen
//!
//! ## Example
//!
//! ```ignore
//! use ballbyball::{CommentaryInput, NewMatch, Store, StoreConfig};
//!
//! let store = Store::open_or_create(StoreConfig::at("./data"))?;
//! let game = store.create_match(NewMatch::new("India", "Australia", "MCG"))?;
//!
//! let handle = store.connect();
//! let snapshot = store.subscribe_with_snapshot(handle.subscriber(), game.match_id)?;
//!
//! store.submit(game.match_id, CommentaryInput::new(1, 1, "boundary", 4, "Driven through cover"))?;
//! ```

pub mod api;
pub mod error;
pub mod events;
pub mod ingest;
pub mod logging;
pub mod matches;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use events::EventLog;
pub use ingest::IngestGateway;
pub use matches::MatchRegistry;
pub use snapshot::{Admission, MatchSnapshot, SequenceCursor, SnapshotService};
pub use store::{Store, StoreConfig};
pub use subscriptions::{
    BroadcastReport, ChannelSubscriber, DeliveryError, DropReason, PushMessage, Subscriber,
    SubscriptionBroker, SubscriptionHandle,
};
pub use types::*;
