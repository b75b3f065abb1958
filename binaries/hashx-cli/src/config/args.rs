use std::{path::PathBuf, process::exit, str::FromStr};

use clap::builder::TypedValueParser;
use tracing::level_filters::LevelFilter;

use hashx::RuntimeOption;

use crate::config::Config;

/// `hashx` args.
#[derive(clap::Parser, Debug)]
#[command(version, about, arg_required_else_help = true)]
pub struct Args {
    /// The PATH of the `hashx` config file.
    #[arg(long)]
    pub config_file: Option<PathBuf>,
    /// Generate a config file and print it to stdout.
    #[arg(long)]
    pub generate_config: bool,
    /// Override the log level of the config file.
    #[arg(long)]
    pub log_level: Option<LevelFilter>,
    /// Override the runtime of the config file.
    #[arg(
        long,
        value_parser = clap::builder::PossibleValuesParser::new(
            ["interpret_only", "scalar_only", "vector_only", "try_compile"]
        )
        .map(|s| parse_runtime(&s)),
    )]
    pub runtime: Option<RuntimeOption>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Hash a range of nonces, printing one little endian digest per line.
    Hash {
        /// The seed, in hex.
        #[arg(long)]
        seed: Seed,
        /// The first nonce.
        #[arg(long, default_value_t = 0)]
        nonce: u64,
        /// How many nonces to hash.
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Check every available runtime and the batch paths against the interpreter.
    Verify {
        /// The seed, in hex.
        #[arg(long)]
        seed: Seed,
        /// How many nonces to check, starting from 0.
        #[arg(long, default_value_t = 256)]
        nonces: u64,
    },
}

/// A hex encoded seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed(pub Vec<u8>);

impl FromStr for Seed {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(Self)
    }
}

fn parse_runtime(s: &str) -> RuntimeOption {
    match s {
        "interpret_only" => RuntimeOption::InterpretOnly,
        "scalar_only" => RuntimeOption::ScalarOnly,
        "vector_only" => RuntimeOption::VectorOnly,
        "try_compile" => RuntimeOption::TryCompile,
        _ => unreachable!("clap only passes possible values"),
    }
}

impl Args {
    /// Complete any quick requests asked for in [`Args`].
    ///
    /// May cause the process to [`exit`].
    pub fn do_quick_requests(&self) {
        if self.generate_config {
            println!("{}", Config::documented_config());
            exit(0);
        }
    }

    /// Apply the [`Args`] to the given [`Config`].
    pub const fn apply_args(&self, mut config: Config) -> Config {
        if let Some(level) = self.log_level {
            config.tracing.level = level;
        }

        if let Some(runtime) = self.runtime {
            config.hashx.runtime = runtime;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn hash_command() {
        let args = Args::parse_from([
            "hashx",
            "--runtime",
            "scalar_only",
            "hash",
            "--seed",
            "00ff",
            "--count",
            "3",
        ]);

        assert_eq!(args.runtime, Some(RuntimeOption::ScalarOnly));
        let Some(Command::Hash { seed, nonce, count }) = args.command else {
            panic!("unexpected command: {:?}", args.command);
        };
        assert_eq!(seed, Seed(vec![0x00, 0xff]));
        assert_eq!((nonce, count), (0, 3));
    }

    #[test]
    fn args_override_config() {
        let args = Args::parse_from([
            "hashx",
            "--log-level",
            "trace",
            "--runtime",
            "interpret_only",
        ]);
        let config = args.apply_args(Config::default());

        assert_eq!(config.tracing.level, LevelFilter::TRACE);
        assert_eq!(config.hashx.runtime, RuntimeOption::InterpretOnly);
    }

    #[test]
    fn bad_seed() {
        let result = Args::try_parse_from(["hashx", "verify", "--seed", "xyz"]);
        assert!(result.is_err());
    }
}
