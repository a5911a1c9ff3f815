//! Utility modules: reconnect backoff.

pub mod backoff;

pub use backoff::BackoffPolicy;
