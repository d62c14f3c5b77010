//! Iterative, model-driven revision of legacy source files.
//!
//! Each queued file is analyzed, regenerated until an automated critique
//! grades it good, approved by a human reviewer, delivered to a downstream
//! toolchain, and regenerated again on compile/runtime errors before its
//! artifacts are written. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state record, stage graph, gates,
//!   guidance precedence, fence handling, classification). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, processes, model backend,
//!   terminal, file system). Behind traits so tests can script them.
//!
//! [`agents`] turns model calls into reviews and revisions; [`engine`] ties
//! everything into the workflow state machine.

pub mod agents;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
