//! Language host for the `pulumirpc.LanguageRuntime` gRPC contract.
//!
//! An orchestrator asks the host which plugins a program needs
//! (`GetRequiredPlugins`), then asks it to execute the program (`Run`) while
//! the program streams resource registrations to a monitor. Re-exports the
//! modules needed by the binary and integration tests.

pub mod client;
pub mod config;
pub mod host;
pub mod language_runtime;
pub mod plugins;
pub mod program;
pub mod runner;
pub mod service;
pub mod tracing;

pub use proto_api::language_pb;
