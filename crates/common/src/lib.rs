//! Shared plumbing for the peerwire crates: error types, logging and
//! configuration loading.

pub mod error;
pub mod utils;

pub use error::{ErrorContext, NetworkError, PeerwireError, Result};
