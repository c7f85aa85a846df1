//! Test host process layer
//! - launcher.rs: Build step, port allocation and host startup
//! - process.rs: Scoped host process with output relays
//! - error.rs: Launch errors

pub mod error;
pub mod launcher;
pub mod process;

pub use error::LaunchError;
pub use launcher::{HostLauncher, LaunchedHost, ProjectInfo};
pub use process::HostProcess;
