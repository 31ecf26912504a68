//! arcland library crate.
//!
//! The primary interface is the `arcland` binary. The library exposes the
//! land workflow and its parts so that integration tests can drive them
//! against real repositories with in-memory review and prompt doubles from
//! [`testing`].

pub mod buildable;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod preflight;
pub mod prompt;
pub mod report;
pub mod review;
pub mod revision;
pub mod strategy;
pub mod submit_queue;
pub mod target;
pub mod tbr;
pub mod telemetry;
pub mod testing;
pub mod unit;
pub mod workflow;

pub use engine::LandOutcome;
pub use error::LandError;
pub use workflow::{LandOptions, LandWorkflow};
