//! Shared types for the session client workspace
//!
//! Configuration errors used by the CLI front end and the `Secret` wrapper
//! used for passwords read from the environment or a file.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
