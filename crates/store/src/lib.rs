#![forbid(unsafe_code)]

//! Snapshot store, refresh orchestration and optimistic actions.

pub mod actions;
pub mod outcome;
pub mod store;

pub use actions::{apply_patch, ActionError, ActionExecutor, ActionOutcome};
pub use outcome::{RefreshFailure, RefreshOutcome, RefreshStatus, RefreshWarning, Resource};
pub use store::DataStore;
