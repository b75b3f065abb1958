//! `hashx` config
use std::{fmt, fs::read_to_string, path::Path, str::FromStr};

use clap::Parser;
use serde::{Deserialize, Serialize};

use hashx::HashXConfig;

mod args;
mod runtime;
mod tracing_config;

#[macro_use]
mod macros;

pub use args::{Command, Seed};
use runtime::RuntimeConfig;
use tracing_config::TracingConfig;

/// Header to put at the start of the generated config file.
const HEADER: &str = r"## hashx config
##
## All these config values can be set to
## their default by commenting them out with '#'.

";

/// Reads the args & config file, returning the [`Config`] and the command to run.
///
/// # Errors
/// If the config file can't be read or parsed, or no command was given.
pub fn read_config_and_args() -> anyhow::Result<(Config, Command)> {
    let args = args::Args::parse();
    args.do_quick_requests();

    let config = match &args.config_file {
        Some(config_file) => Config::read_from_path(config_file)?,
        None => Config::default(),
    };
    let config = args.apply_args(config);

    let Some(command) = args.command else {
        anyhow::bail!("no command given, see `hashx --help`");
    };

    Ok((config, command))
}

config_struct! {
    /// The config for the `hashx` binary.
    #[derive(Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
    #[serde(deny_unknown_fields, default)]
    pub struct Config {
        #[child = true]
        /// Configuration for the logging system, tracing.
        pub tracing: TracingConfig,

        #[child = true]
        /// Configuration for building hash instances.
        pub hashx: RuntimeConfig,
    }
}

impl Config {
    /// Returns a default [`Config`], with doc comments.
    pub fn documented_config() -> String {
        let str = toml::ser::to_string_pretty(&Self::default()).unwrap();
        let mut doc = toml_edit::DocumentMut::from_str(&str).unwrap();
        Self::write_docs(doc.as_table_mut());
        format!("{HEADER}{doc}")
    }

    /// Attempts to read a config file in [`toml`] format from the given [`Path`].
    ///
    /// # Errors
    ///
    /// Will return an [`Err`] if the file cannot be read or if the file is not a valid
    /// [`toml`] config.
    fn read_from_path(file: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let file_text = read_to_string(file.as_ref())?;
        let config = toml::from_str(&file_text)?;
        tracing::debug!("Using config at: {}", file.as_ref().to_string_lossy());

        Ok(config)
    }

    /// The [`HashXConfig`] instances are built with.
    pub fn hashx_config(&self) -> HashXConfig {
        HashXConfig::from(&self.hashx)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "========== CONFIGURATION ==========\n{self:#?}\n==================================="
        )
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use toml::from_str;

    use hashx::RuntimeOption;

    use super::*;

    #[test]
    fn documented_config() {
        let str = Config::documented_config();
        let conf: Config = from_str(&str).unwrap();

        assert_eq!(conf, Config::default());
        assert!(str.contains("## How many salted random streams to try per seed."));
    }

    #[test]
    fn partial_config() {
        let conf: Config = from_str("[hashx]\nruntime = \"vector_only\"\n").unwrap();

        assert_eq!(conf.hashx.runtime, RuntimeOption::VectorOnly);
        assert_eq!(conf.hashx_config().generation_attempts, 1);
        assert_eq!(conf.tracing, TracingConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(from_str::<Config>("[hashx]\nthreads = 4\n").is_err());
    }
}
