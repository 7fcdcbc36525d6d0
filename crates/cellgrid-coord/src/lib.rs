//! cellgrid-coord — coordination-store abstraction for Cellgrid.
//!
//! The cell core only needs four primitives from a distributed
//! coordination service: point reads, children listing, and one-shot
//! change triggers on either. This crate defines that contract
//! ([`CoordStore`]), a watch driver that turns one-shot triggers into
//! continuously re-armed children/data watches with cancelable handles,
//! and an in-memory store used by tests and embedded deployments.
//!
//! # Failure posture
//!
//! A watch callback that panics, or a backend error while servicing a
//! fire, aborts the process. A watcher with an unknown cell view must not
//! keep answering queries; reconnection is the supervisor's job.

pub mod blob;
pub mod error;
pub mod memory;
pub mod store;
pub mod watch;

pub use error::{CoordError, CoordResult};
pub use memory::MemoryStore;
pub use store::{CoordStore, Trigger};
pub use watch::{WatchHandle, watch_children, watch_data};
