//! Shared types and pure policy logic for the Homematch safeguards layer:
//! rate limiting, abuse detection, audit/security logging, and the
//! background job queue. Everything here is I/O-free; the `homematch-api`
//! crate owns persistence.

pub mod abuse;
pub mod audit;
pub mod context;
pub mod error;
pub mod jobs;
pub mod rate_limit;
pub mod risk;
