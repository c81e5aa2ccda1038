use std::env;
use std::process;

use anyhow::Context;
use war_launcher::{logging, JavaLoader, Launcher, LauncherConfig};

fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let code = run()?;
    process::exit(code)
}

fn run() -> anyhow::Result<i32> {
    let config = LauncherConfig::from_env();
    tracing::debug!(?config, "launcher configuration");

    let loader = JavaLoader::from_config(&config);
    Launcher::new(config, loader)
        .run(env::args_os().skip(1))
        .context("failed to launch the web application")
}
