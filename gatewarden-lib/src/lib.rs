#![forbid(unsafe_code)]

//! Edge HTTP rate-limiting gateway.
//!
//! Requests are matched against an ordered ruleset; matched clients are
//! identified by a deterministic fingerprint and counted in per-identifier
//! sliding windows; the verdict selects the response: forward, block, log,
//! simulate, or a custom body. Infrastructure failures fail open.

pub mod admin;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod limiter;
pub mod matching;
pub mod proxy;
pub mod rules;
pub mod telemetry;
