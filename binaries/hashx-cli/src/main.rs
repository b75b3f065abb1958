//! `hashx`, hashes nonces and cross-checks the runtimes of the `hashx` crate.

mod commands;
mod config;
mod logging;

fn main() -> anyhow::Result<()> {
    let (config, command) = config::read_config_and_args()?;

    logging::init_logging(&config);
    tracing::debug!("{config}");

    commands::run(command, &config)
}
