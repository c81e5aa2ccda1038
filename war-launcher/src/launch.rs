//! The launch sequence, run once per process.

use std::ffi::{OsStr, OsString};
use std::io::{self, Write};

use crate::archive::Archive;
use crate::arguments;
use crate::config::LauncherConfig;
use crate::entry_point::{RuntimeLoader, LAUNCHER_CLASS};
use crate::error::{LaunchError, Result};
use crate::extractor;
use crate::locator;
use crate::manifest::{self, EXTRA_PARAMETERS_ATTRIBUTE};
use crate::self_location::SelfLocation;

pub struct Launcher<L> {
    config: LauncherConfig,
    loader: L,
}

impl<L: RuntimeLoader> Launcher<L> {
    pub fn new(config: LauncherConfig, loader: L) -> Self {
        Self { config, loader }
    }

    /// Locates the archive, extracts its runtime and runs the runtime's entry
    /// point with the composed arguments. Returns the runtime's exit code once it
    /// finishes; the extracted jar is removed before this returns.
    pub fn run<I>(&self, caller_args: I) -> Result<i32>
    where
        I: IntoIterator<Item = OsString>,
    {
        let location = SelfLocation::resolve(&self.config)?;
        let archive = Archive::open(location.path())?;
        let attributes = manifest::read_main_attributes(&archive)?;

        let runtime = locator::locate(&attributes, &archive)?;
        let extracted = extractor::extract(&archive, &runtime, &self.config.temp_dir)?;
        let entry_point = self.loader.load(extracted.path(), LAUNCHER_CLASS)?;

        let home = self
            .config
            .home_dir
            .as_deref()
            .ok_or_else(|| LaunchError::path("cannot determine the user's home directory", None))?;
        let web_root = arguments::web_root(home, location.path());
        let extra = attributes
            .get(EXTRA_PARAMETERS_ATTRIBUTE)
            .map(arguments::split_parameters)
            .unwrap_or_default();
        let args = arguments::compose(caller_args, location.path(), &web_root, &extra);

        print_banner(location.file_name(), &args);

        let code = entry_point.invoke(&args)?;
        drop(extracted);
        Ok(code)
    }
}

fn print_banner(archive_name: &OsStr, args: &[OsString]) {
    let mut stdout = io::stdout().lock();
    let _ = stdout.write_all(banner(archive_name, args).as_bytes());
    let _ = stdout.flush();
}

fn banner(archive_name: &OsStr, args: &[OsString]) -> String {
    let mut text = format!("deploying: {}:\narguments: ", archive_name.to_string_lossy());
    for arg in args {
        text.push_str(&arg.to_string_lossy());
        text.push(' ');
    }
    text.push('\n');
    text
}
