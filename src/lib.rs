//! Redrate - Distributed GCRA Rate Limiting
//!
//! This crate decides in real time whether an event keyed by some identity
//! may happen, using a Redis-compatible store as the single source of truth
//! so that many independent service instances enforce one global limit.
//! Every decision is one atomic server-side script; the client keeps no
//! rate state of its own.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use config::RedrateConfig;
pub use error::{RedrateError, Result};
pub use ratelimit::{Limit, RateLimitResult, RateLimiter};
