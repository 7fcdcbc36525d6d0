//! The `CoordStore` contract.
//!
//! Cellgrid treats the coordination service (ZooKeeper-like) as an
//! external collaborator behind this trait. Watches are one-shot: a
//! trigger armed on a path fires at most once, on the next change, and
//! must be re-armed to keep observing. The re-arming discipline lives in
//! [`crate::watch`], not in implementations of this trait.

use crate::error::CoordResult;

/// A one-shot change trigger.
///
/// Fired at most once by the store, on the thread(s) of the store's own
/// client library. Implementations must drop the trigger unfired if the
/// store shuts down.
pub type Trigger = Box<dyn FnOnce() + Send>;

/// Contract the cell core requires from the coordination store.
///
/// Implementations must be shareable across threads; all methods are
/// synchronous point operations.
pub trait CoordStore: Send + Sync {
    /// Point read of a node's data. `Ok(None)` if the node does not exist.
    fn get(&self, path: &str) -> CoordResult<Option<Vec<u8>>>;

    /// List the direct children of a node. Missing nodes read as empty.
    fn children(&self, path: &str) -> CoordResult<Vec<String>>;

    /// Arm a one-shot trigger that fires on the next change to the child
    /// set of `path` (child created or deleted).
    fn arm_child_trigger(&self, path: &str, trigger: Trigger) -> CoordResult<()>;

    /// Arm a one-shot trigger that fires on the next change to the data
    /// of `path` (written or deleted).
    fn arm_data_trigger(&self, path: &str, trigger: Trigger) -> CoordResult<()>;
}
