use serde::{Deserialize, Serialize};

use hashx::{HashXConfig, RuntimeOption};

use super::macros::config_struct;

config_struct! {
    /// [`hashx`] instance config.
    #[derive(Debug, Deserialize, Serialize, Eq, PartialEq)]
    #[serde(deny_unknown_fields, default)]
    pub struct RuntimeConfig {
        /// Which implementation runs the generated programs.
        ///
        /// "try_compile" picks the fastest one this CPU supports,
        /// the other values fail if the runtime is unavailable.
        ///
        /// Type         | String
        /// Valid values | "interpret_only", "scalar_only", "vector_only", "try_compile"
        pub runtime: RuntimeOption,

        /// How many salted random streams to try per seed.
        ///
        /// A few seeds produce no valid program on the first
        /// attempt, every extra attempt makes that rarer.
        ///
        /// Type         | Number
        /// Valid values | >= 1
        /// Examples     | 1, 4, 16
        pub generation_attempts: u32,
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let HashXConfig {
            runtime,
            generation_attempts,
        } = HashXConfig::default();

        Self {
            runtime,
            generation_attempts,
        }
    }
}

impl From<&RuntimeConfig> for HashXConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            runtime: config.runtime,
            generation_attempts: config.generation_attempts,
        }
    }
}
