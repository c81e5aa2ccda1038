//! Locating and invoking the runtime's entry point.
//!
//! The runtime is Java code, so it runs in its own `java` process: the
//! extracted jar is the only class path entry, which keeps it isolated from
//! anything the launcher carries. Before the process is started the jar is
//! checked for the entry class and a `public static void main(String[])`, so a
//! wrong jar fails here rather than inside the JVM.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::archive::Archive;
use crate::classfile;
use crate::config::LauncherConfig;
use crate::error::{LaunchError, Result};
use crate::platform;

/// Fully qualified name of the runtime's entry class.
pub const LAUNCHER_CLASS: &str = "winstone.Launcher";
pub const MAIN_METHOD: &str = "main";
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// A callable entry point taking the composed argument vector.
pub trait EntryPoint {
    /// Runs the entry point to completion and returns the exit code the
    /// launcher should exit with.
    fn invoke(&self, args: &[OsString]) -> Result<i32>;
}

/// Finds the entry point `class_name` in the runtime jar at `runtime`.
pub trait RuntimeLoader {
    fn load(&self, runtime: &Path, class_name: &str) -> Result<Box<dyn EntryPoint>>;
}

#[derive(Debug, Clone)]
pub struct JavaLoader {
    java: Option<PathBuf>,
    java_home: Option<PathBuf>,
    java_opts: Vec<String>,
}

impl JavaLoader {
    pub fn from_config(config: &LauncherConfig) -> Self {
        Self {
            java: config.java.clone(),
            java_home: config.java_home.clone(),
            java_opts: config.java_opts.clone(),
        }
    }

    /// Picks the `java` executable: explicit setting, then `JAVA_HOME`, then `PATH`.
    pub fn resolve_java(&self) -> Result<PathBuf> {
        if let Some(java) = &self.java {
            if java.is_file() {
                return Ok(java.clone());
            }
            return which::which(java).map_err(|_| {
                LaunchError::SymbolResolution(format!(
                    "java executable {} (from {}) not found",
                    java.display(),
                    crate::config::JAVA_VAR
                ))
            });
        }

        if let Some(home) = &self.java_home {
            let candidate = home.join("bin").join(platform::JAVA_EXECUTABLE);
            if candidate.is_file() {
                return Ok(candidate);
            }
            tracing::warn!(java_home = %home.display(), "JAVA_HOME has no bin/java, falling back to PATH");
        }

        which::which(platform::JAVA_EXECUTABLE).map_err(|_| {
            LaunchError::SymbolResolution(format!(
                "no java executable found: set {} or {}, or put java on the PATH",
                crate::config::JAVA_VAR,
                crate::config::JAVA_HOME_VAR
            ))
        })
    }
}

impl RuntimeLoader for JavaLoader {
    fn load(&self, runtime: &Path, class_name: &str) -> Result<Box<dyn EntryPoint>> {
        verify_entry_point(runtime, class_name)?;
        let java = self.resolve_java()?;
        tracing::debug!(java = %java.display(), class = class_name, "resolved runtime entry point");

        Ok(Box::new(JavaEntryPoint {
            java,
            java_opts: self.java_opts.clone(),
            classpath: runtime.to_path_buf(),
            class_name: class_name.to_string(),
        }))
    }
}

/// Checks that `runtime` contains `class_name` with a `public static void main(String[])`.
pub fn verify_entry_point(runtime: &Path, class_name: &str) -> Result<()> {
    let internal_name = class_name.replace('.', "/");
    let entry_name = format!("{}.class", internal_name);

    let jar = Archive::open(runtime)?;
    let entry = jar.entry(&entry_name).ok_or_else(|| {
        LaunchError::SymbolResolution(format!("class {} not found in {}", class_name, runtime.display()))
    })?;
    let bytes = jar.read_entry(entry)?;

    let class = classfile::parse(&bytes)
        .map_err(|e| LaunchError::SymbolResolution(format!("cannot load class {}: {}", class_name, e)))?;
    if class.this_class != internal_name {
        return Err(LaunchError::SymbolResolution(format!(
            "{} declares class {} instead of {}",
            entry_name, class.this_class, class_name
        )));
    }

    match class.find_method(MAIN_METHOD, MAIN_DESCRIPTOR) {
        Some(method) if method.is_public_static() => Ok(()),
        _ => Err(LaunchError::SymbolResolution(format!(
            "class {} has no method public static void main(String[])",
            class_name
        ))),
    }
}

/// `java -cp <runtime> <class> <args...>` in a child process that inherits
/// the launcher's standard streams.
#[derive(Debug, Clone)]
pub struct JavaEntryPoint {
    java: PathBuf,
    java_opts: Vec<String>,
    classpath: PathBuf,
    class_name: String,
}

impl JavaEntryPoint {
    pub fn command(&self, args: &[OsString]) -> Command {
        let mut command = Command::new(&self.java);
        command
            .args(&self.java_opts)
            .arg("-cp")
            .arg(&self.classpath)
            .arg(&self.class_name)
            .args(args);
        command
    }
}

impl EntryPoint for JavaEntryPoint {
    fn invoke(&self, args: &[OsString]) -> Result<i32> {
        tracing::info!(java = %self.java.display(), class = %self.class_name, "starting runtime");

        let invocation_error = |reason: &str, source: io::Error| LaunchError::Invocation {
            program: self.java.clone(),
            reason: reason.to_string(),
            source: Some(source),
        };

        // Installed before the spawn so no signal can slip in between.
        let signals = platform::SignalGuard::install()
            .map_err(|e| invocation_error("cannot install signal handlers", e))?;
        let mut child = self
            .command(args)
            .spawn()
            .map_err(|e| invocation_error("cannot start process", e))?;
        signals.watch(&child);
        let status = child
            .wait()
            .map_err(|e| invocation_error("cannot wait for process", e))?;
        drop(signals);

        let code = platform::exit_code(status);
        tracing::debug!(code, "runtime exited");
        Ok(code)
    }
}
