//! Projector platform core contracts.
//!
//! This crate contains the remote interface proxy, the contracts of the
//! hidden platform services, and the display configuration value used by
//! the session crate without coupling to a concrete platform backend.

pub mod display;
pub mod features;
pub mod remote;
pub mod services;

pub use display::*;
pub use features::*;
pub use remote::*;
pub use services::*;
