//! Shared library modules for the augurd market agent.
//!
//! The `augurd` binary wires these together; they are exported as a
//! library so integration tests and auxiliary tooling can reuse them.

pub mod chain;
pub mod config;
pub mod ingest;
pub mod lifecycle;
pub mod oracle;
pub mod program;
pub mod store;
