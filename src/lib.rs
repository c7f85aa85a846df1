//! Drives a vstest design-mode test host for editor tooling
//! - protocol/: Framed JSON messages over the host's control connection
//! - host/: Building the project and owning the host process
//! - testing/: Discovery, run and debug sessions on top of a connection
//! - events.rs: Diagnostic events surfaced to callers
//! - config.rs: Paths, constants and host settings
//! - log.rs: File logging
//! - cli.rs: Command-line front end

pub mod cli;
pub mod config;
pub mod events;
pub mod host;
pub mod log;
pub mod protocol;
pub mod testing;
