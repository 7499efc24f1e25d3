//! Gavel Common Types
//!
//! Shared types used across the Gavel auction system: identifiers,
//! the player/team domain model, and the error taxonomy.

pub mod error;
pub mod identifiers;
pub mod model;

pub use error::*;
pub use identifiers::*;
pub use model::*;
