//! Roster reconciliation kernel: the authoritative player store, the
//! identity-verification state machine, the queued lookup-service bridge, the
//! persistence codec with backup rotation, and the per-cycle reconciliation
//! engine that ties them together.

pub mod lookup;
pub mod persist;
pub mod service;
pub mod store;
pub mod verify;

pub use lookup::LodestoneQueue;
pub use persist::{DataStore, PersistError};
pub use service::RosterService;
pub use store::{RosterStore, StoreError};
