//! Launcher settings taken from the process environment.
//!
//! The environment is read once in `main`; every other stage receives the
//! resulting [`LauncherConfig`] by reference.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// Archive path or `file:` URL to launch instead of the current executable.
pub const ARCHIVE_VAR: &str = "WAR_LAUNCHER_ARCHIVE";
/// Explicit `java` executable.
pub const JAVA_VAR: &str = "WAR_LAUNCHER_JAVA";
/// Whitespace separated options placed before `-cp` on the `java` command line.
pub const JAVA_OPTS_VAR: &str = "WAR_LAUNCHER_JAVA_OPTS";
/// Home directory used to derive the web root.
pub const HOME_VAR: &str = "WAR_LAUNCHER_HOME";
/// `tracing` filter directive for diagnostics on stderr.
pub const LOG_VAR: &str = "WAR_LAUNCHER_LOG";
pub const JAVA_HOME_VAR: &str = "JAVA_HOME";

#[derive(Debug, Clone, Default)]
pub struct LauncherConfig {
    pub archive_override: Option<OsString>,
    pub java: Option<PathBuf>,
    pub java_home: Option<PathBuf>,
    pub java_opts: Vec<String>,
    pub home_dir: Option<PathBuf>,
    pub temp_dir: PathBuf,
}

impl LauncherConfig {
    pub fn from_env() -> Self {
        Self {
            archive_override: non_empty_var(ARCHIVE_VAR),
            java: non_empty_var(JAVA_VAR).map(PathBuf::from),
            java_home: non_empty_var(JAVA_HOME_VAR).map(PathBuf::from),
            java_opts: non_empty_var(JAVA_OPTS_VAR)
                .map(|opts| crate::arguments::split_parameters(&opts.to_string_lossy()))
                .unwrap_or_default(),
            home_dir: non_empty_var(HOME_VAR)
                .map(PathBuf::from)
                .or_else(dirs::home_dir),
            temp_dir: env::temp_dir(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}
