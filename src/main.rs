use std::env::consts::{ARCH, FAMILY, OS};
use std::env::current_dir;

use anyhow::{Context, Error};
use tracing::trace;

use crate::e621::io::ConfigManager;
use crate::program::Program;

mod e621;
mod logger;
mod program;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let working_dir = current_dir().context("Unable to get working directory")?;
    let config = ConfigManager::load(&working_dir).context("Failed to load config.toml")?;

    let log_dir = config.resolve(&config.config().paths.log_directory);
    let _guard = logger::init_logger(&config.config().logging, &log_dir)?;
    log_system_information();
    trace!("Program Working Directory: {}", working_dir.display());

    Program::new(config).run().await
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
