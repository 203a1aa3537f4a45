//! Tollgate - In-Process Admission Control
//!
//! This crate decides, for every inbound request identified by some key
//! (user, API key, IP), whether to allow or reject it under a quota. It
//! offers fixed-window, sliding-window-log and token-bucket limiters behind
//! one handle type, keeps per-identifier state in a concurrent store with
//! per-identifier locking, and bounds memory with a background idle sweep.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{Result, TollgateError};
pub use ratelimit::{Decision, LimiterConfig, LimiterRegistry, RateLimiter};
