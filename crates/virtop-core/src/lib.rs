//! virtop Core Library
//!
//! Shared types for the virtop reconciliation core.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`SourceId`, `ItemId`, `ResourceKey`)
//! - [`error`] - Standardized error taxonomy (`CoreError`)
//! - [`conditions`] - Typed status conditions and their aggregation

pub mod conditions;
pub mod error;
pub mod ids;

// Re-export main types for convenient access
pub use conditions::{Condition, ConditionSeverity, ConditionStatus, ObjectRef};
pub use error::{CoreError, Result};
pub use ids::{ItemId, ResourceKey, SourceId};
