//! Race-and-cancel coordination of two concurrent operations.
//!
//! - [`operation`]: Operation lifecycle, start/join/cancel, state watching
//! - [`coordinator`]: RaceCoordinator and its builder
//! - [`outcome`]: RaceOutcome, DependentFate, CoordinatorError
//! - [`demo`]: Timed demo operations used by the HTTP service and CLI

pub mod coordinator;
pub mod demo;
pub mod operation;
pub mod outcome;

pub use coordinator::{RaceCoordinator, RaceCoordinatorBuilder};
pub use operation::{
    Cancelled, Operation, OperationError, OperationState, StateWatch, Termination,
};
pub use outcome::{CoordinatorError, DependentFate, RaceOutcome};
