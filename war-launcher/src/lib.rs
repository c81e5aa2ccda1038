//! Launches a web application archive that carries its own servlet runtime.
//!
//! A self-executing archive is this launcher's binary with a WAR appended to
//! it. At start-up the launcher opens its own executable as a zip, reads the
//! WAR manifest to learn which runtime jar under `WEB-INF/lib/` to use,
//! extracts that jar to a temporary file and hands control to the runtime's
//! `winstone.Launcher` entry point.

pub mod archive;
pub mod arguments;
pub mod classfile;
pub mod config;
pub mod entry_point;
pub mod error;
pub mod extractor;
pub mod launch;
pub mod locator;
pub mod logging;
pub mod manifest;
pub mod self_location;

#[cfg(unix)]
#[path = "platform/unix.rs"]
mod platform;
#[cfg(windows)]
#[path = "platform/windows.rs"]
mod platform;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::LauncherConfig;
pub use entry_point::{EntryPoint, JavaLoader, RuntimeLoader};
pub use error::{LaunchError, Result};
pub use launch::Launcher;
