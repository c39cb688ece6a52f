//! Resource descriptor model
//!
//! Typed representation of the topology Nimbus provisions.

mod resource;
mod settings;
mod topology;

// Re-exports
pub use resource::*;
pub use settings::*;
pub use topology::*;
