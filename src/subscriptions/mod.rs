//! Live delivery of commentary to connections.
//!
//! A connection is anything implementing [`Subscriber`]; the broker does not
//! know about transports. Each match has a room of joined connections, and
//! every appended event is pushed to that room:
//! - delivery never blocks (bounded queues, `try_send`)
//! - a connection that cannot take a push is dropped from the room
//! - clients dedupe by sequence against their last snapshot
//!
//! # Example
//!
//! ```ignore
//! let handle = broker.connect();
//! broker.subscribe(handle.subscriber(), match_id)?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(PushMessage::CommentaryUpdate { commentary, .. }) => println!("{:?}", commentary),
//!         Ok(PushMessage::Dropped { reason, .. }) => break,
//!         Err(_) => break,
//!     }
//! }
//! ```

mod broker;
mod types;

pub use broker::{SubscriptionBroker, DEFAULT_BUFFER_SIZE};
pub use types::{
    BroadcastReport, ChannelSubscriber, DeliveryError, DropReason, PushMessage, Subscriber,
    SubscriptionHandle,
};
