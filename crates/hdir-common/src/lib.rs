//! Hospital Directory common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for every workspace member. At the moment that is the
//! logging setup; domain types live with the crates that own them.
//!
//! # Example
//!
//! ```no_run
//! use hdir_common::logging::{init_logging, LogConfig};
//!
//! let _guard = init_logging(&LogConfig::default()).ok();
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LoggingGuard};
