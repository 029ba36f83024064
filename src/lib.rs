//! aio-race: race-and-cancel coordination of concurrent operations.
//!
//! A [`race::RaceCoordinator`] runs a decider and a dependent operation
//! concurrently; the decider's result decides whether the dependent may
//! finish or is cancelled. The crate also ships a small HTTP service that
//! exposes the coordinator demos and forwards chat requests to the
//! Anthropic Messages API.

pub mod anthropic;
pub mod config;
pub mod metrics;
pub mod race;
pub mod server;
