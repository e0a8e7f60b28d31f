//! Debounced processing scheduler on top of `lumen-core`.
//!
//! The engine coalesces bursts of edit requests, runs the pipeline on a
//! blocking worker, and publishes frames through a [`DisplaySink`] in
//! last-request-wins order.

pub mod engine;
pub mod sink;

pub use engine::{DEFAULT_DEBOUNCE, Engine, ProcessRequest, StepChange};
pub use sink::DisplaySink;
