#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and pure logic for the habitkit data layer.

pub mod categorize;
pub mod error;
pub mod model;
pub mod payload;
pub mod snapshot;

pub use categorize::{categorize, derive_status, parse_due_date, Categorized, Category, CategoryIndex};
pub use error::{ApiError, ApiErrorKind};
pub use model::*;
pub use payload::Payload;
pub use snapshot::{Snapshot, SnapshotParts};
