//! Secret handling utilities.
//!
//! Re-exports secrecy types so binaries and tests can build credentials
//! without naming the crate directly.

pub use secrecy::{ExposeSecret, SecretString};
