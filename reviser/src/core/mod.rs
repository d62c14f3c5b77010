//! Deterministic, pure logic shared by the workflow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod classifier;
pub mod dependencies;
pub mod diff;
pub mod fence;
pub mod gates;
pub mod guidance;
pub mod stage;
pub mod state;
