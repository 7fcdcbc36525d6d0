//! cellgrid-state — the consistent in-memory view of a cell.
//!
//! Four independent watchers on the coordination store each own one field
//! of the cell snapshot: the running set, the placement map, the finished
//! map, and the finished-history backfill. Every watcher fire publishes a
//! fresh immutable snapshot ([`CellSnapshot`]) so request threads always
//! read a consistent view, never a half-updated map.
//!
//! [`StateQuery`] answers point and glob-pattern queries against the
//! snapshot; [`DeltaNotifier`] feeds streaming subscribers with
//! created/deleted instance sets between snapshots.

pub mod cell;
pub mod delta;
pub mod error;
pub mod query;
pub mod types;
pub mod watchers;

pub use cell::{CellSnapshot, CellState};
pub use delta::{DeltaNotifier, StateDelta, diff};
pub use error::{StateError, StateResult};
pub use query::{PartitionLookup, StateQuery};
pub use types::{FinishedEntry, InstanceState, PlacementEntry, StateRecord};
pub use watchers::{CellObserver, CellPaths};
