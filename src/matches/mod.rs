//! Match registry.
//!
//! Owns match metadata and the only path for changing it: creation and
//! forward-only status transitions. Matches are never deleted.

mod registry;

pub use registry::MatchRegistry;
