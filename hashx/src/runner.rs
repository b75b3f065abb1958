//! Hash instances and their configuration.
use std::array;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    compiler::{ScalarProgram, VectorProgram},
    config::VECTOR_LANES,
    error::Error,
    program::Program,
    register::{RegisterFile, VectorRegisterFile},
    siphash::SipState,
};

/// Generation attempts used unless configured otherwise.
pub const DEFAULT_GENERATION_ATTEMPTS: u32 = 1;

/// Which implementations a [`HashX`] instance may run its program with.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RuntimeOption {
    /// Always use the interpreter.
    InterpretOnly,
    /// Require the scalar compiler.
    ScalarOnly,
    /// Require both the scalar and the vector compiler.
    VectorOnly,
    /// Use the best compiler available, falling back to the interpreter.
    #[default]
    TryCompile,
}

/// The implementation a [`HashX`] instance ended up with.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RuntimeKind {
    Interpret,
    Scalar,
    /// Single hashes run on the scalar code, batches on the vector code.
    Vector,
}

/// Serializable form of a [`HashXBuilder`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields, default))]
pub struct HashXConfig {
    pub runtime: RuntimeOption,
    /// Salted random streams to try before giving up on a key.
    pub generation_attempts: u32,
}

impl Default for HashXConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeOption::default(),
            generation_attempts: DEFAULT_GENERATION_ATTEMPTS,
        }
    }
}

/// Builds [`HashX`] instances.
///
/// ```rust
/// use hashx::{HashXBuilder, RuntimeOption};
///
/// let hashx = HashXBuilder::new()
///     .runtime(RuntimeOption::InterpretOnly)
///     .generation_attempts(16)
///     .build(b"seed")
///     .unwrap();
///
/// assert_eq!(hashx.hash(0), hashx.hash_batch4(0)[0]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct HashXBuilder {
    config: HashXConfig,
}

impl HashXBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn runtime(mut self, runtime: RuntimeOption) -> Self {
        self.config.runtime = runtime;
        self
    }

    /// Sets how many salted random streams are tried, see [`Program::generate_with_attempts`].
    ///
    /// With 0 attempts every build fails.
    #[must_use]
    pub const fn generation_attempts(mut self, attempts: u32) -> Self {
        self.config.generation_attempts = attempts;
        self
    }

    pub const fn config(&self) -> &HashXConfig {
        &self.config
    }

    /// Builds an instance keyed by an arbitrary `seed`.
    ///
    /// The seed is hashed into two keys, one for program generation and one for the
    /// register file.
    ///
    /// # Errors
    /// See [`Self::build_from_key`].
    pub fn build(&self, seed: &[u8]) -> Result<HashX, Error> {
        let (program_key, register_key) = SipState::pair_from_seed(seed);
        self.build_with_keys(program_key, register_key)
    }

    /// Builds an instance using one raw key for both program generation and the register file.
    ///
    /// # Errors
    /// - [`Error::ProgramConstraints`] if no attempt produced a valid program
    /// - [`Error::NotAvailable`] if the runtime option asks for a compiler this CPU can't use
    /// - [`Error::ExecutableMemory`] if compiled code could not be mapped
    pub fn build_from_key(&self, key: [u64; 4]) -> Result<HashX, Error> {
        let key = SipState::from_words(key);
        self.build_with_keys(key, key)
    }

    fn build_with_keys(
        &self,
        program_key: SipState,
        register_key: SipState,
    ) -> Result<HashX, Error> {
        let program =
            Program::generate_with_attempts(program_key, self.config.generation_attempts)?;

        let backend = match self.config.runtime {
            RuntimeOption::InterpretOnly => Backend::Interpret,
            RuntimeOption::ScalarOnly => Backend::Scalar(ScalarProgram::compile(&program)?),
            RuntimeOption::VectorOnly => Backend::Vector {
                scalar: ScalarProgram::compile(&program)?,
                vector: VectorProgram::compile(&program)?,
            },
            RuntimeOption::TryCompile => Backend::best_available(&program),
        };

        Ok(HashX {
            register_key,
            program,
            backend,
        })
    }
}

impl From<HashXConfig> for HashXBuilder {
    fn from(config: HashXConfig) -> Self {
        Self { config }
    }
}

#[derive(Debug)]
enum Backend {
    Interpret,
    Scalar(ScalarProgram),
    Vector {
        scalar: ScalarProgram,
        vector: VectorProgram,
    },
}

impl Backend {
    fn best_available(program: &Program) -> Self {
        let scalar = match ScalarProgram::compile(program) {
            Ok(scalar) => scalar,
            Err(e) => {
                tracing::warn!("falling back to the interpreter: {e}");
                return Self::Interpret;
            }
        };

        if !VectorProgram::supported() {
            return Self::Scalar(scalar);
        }

        match VectorProgram::compile(program) {
            Ok(vector) => Self::Vector { scalar, vector },
            Err(e) => {
                tracing::warn!("vector backend unavailable, using scalar code: {e}");
                Self::Scalar(scalar)
            }
        }
    }
}

/// A keyed hash function, one generated program per key.
///
/// Instances are immutable and can be shared between threads.
#[derive(Debug)]
pub struct HashX {
    register_key: SipState,
    program: Program,
    backend: Backend,
}

impl HashX {
    /// Builds an instance from `seed` with the default configuration.
    ///
    /// # Errors
    /// See [`HashXBuilder::build`].
    pub fn new(seed: &[u8]) -> Result<Self, Error> {
        HashXBuilder::new().build(seed)
    }

    pub const fn program(&self) -> &Program {
        &self.program
    }

    pub const fn runtime(&self) -> RuntimeKind {
        match self.backend {
            Backend::Interpret => RuntimeKind::Interpret,
            Backend::Scalar(_) => RuntimeKind::Scalar,
            Backend::Vector { .. } => RuntimeKind::Vector,
        }
    }

    pub fn hash(&self, nonce: u64) -> u64 {
        let mut registers = RegisterFile::new(self.register_key, nonce);

        match &self.backend {
            Backend::Interpret => self.program.interpret(&mut registers),
            Backend::Scalar(scalar) | Backend::Vector { scalar, .. } => scalar.run(&mut registers),
        }

        registers.digest(self.register_key)
    }

    /// Hashes `first_nonce..first_nonce + 4`, wrapping at `u64::MAX`.
    pub fn hash_batch4(&self, first_nonce: u64) -> [u64; 4] {
        self.hash_lanes(nonces(first_nonce))
    }

    /// Hashes `first_nonce..first_nonce + 8`, wrapping at `u64::MAX`.
    pub fn hash_batch8(&self, first_nonce: u64) -> [u64; VECTOR_LANES] {
        self.hash_lanes(nonces(first_nonce))
    }

    fn hash_lanes<const N: usize>(&self, nonces: [u64; N]) -> [u64; N] {
        const { assert!(N > 0 && N <= VECTOR_LANES) };

        let vector = match &self.backend {
            Backend::Vector { vector, .. } => vector,
            Backend::Interpret | Backend::Scalar(_) => return nonces.map(|nonce| self.hash(nonce)),
        };

        // Lanes past `N` repeat the first ones.
        let mut registers = VectorRegisterFile::default();
        for lane in 0..VECTOR_LANES {
            let input = RegisterFile::new(self.register_key, nonces[lane % N]);
            registers.set_lane(lane, &input);
        }

        vector.run(&mut registers);

        array::from_fn(|lane| registers.lane(lane).digest(self.register_key))
    }
}

/// `N` consecutive nonces starting at `first`.
fn nonces<const N: usize>(first: u64) -> [u64; N] {
    let mut nonces = [first; N];
    for (offset, nonce) in (0..).zip(&mut nonces) {
        *nonce = first.wrapping_add(offset);
    }
    nonces
}

/// Hashes one `nonce` under a raw `key` with the interpreter.
///
/// This generates a program on every call, build a [`HashX`] to hash more than once per key.
///
/// # Errors
/// [`Error::ProgramConstraints`] if the key yields no valid program in one attempt.
pub fn hash(key: [u64; 4], nonce: u64) -> Result<u64, Error> {
    let hashx = HashXBuilder::new()
        .runtime(RuntimeOption::InterpretOnly)
        .build_from_key(key)?;

    Ok(hashx.hash(nonce))
}

/// Hashes `first_nonce..first_nonce + 4` under a raw `key`.
///
/// # Errors
/// See [`HashXBuilder::build_from_key`].
pub fn hash_batch4(key: [u64; 4], first_nonce: u64) -> Result<[u64; 4], Error> {
    let hashx = HashXBuilder::new().build_from_key(key)?;
    Ok(hashx.hash_batch4(first_nonce))
}

/// Hashes `first_nonce..first_nonce + 8` under a raw `key`.
///
/// # Errors
/// See [`HashXBuilder::build_from_key`].
pub fn hash_batch8(key: [u64; 4], first_nonce: u64) -> Result<[u64; VECTOR_LANES], Error> {
    let hashx = HashXBuilder::new().build_from_key(key)?;
    Ok(hashx.hash_batch8(first_nonce))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    const KEY: [u64; 4] = [0x0123_4567_89ab_cdef, 1, 2, 3];

    fn build(runtime: RuntimeOption) -> Result<HashX, Error> {
        HashXBuilder::new()
            .runtime(runtime)
            .generation_attempts(32)
            .build_from_key(KEY)
    }

    /// Every runtime this machine can build.
    fn runtimes() -> Vec<HashX> {
        [
            RuntimeOption::InterpretOnly,
            RuntimeOption::ScalarOnly,
            RuntimeOption::VectorOnly,
            RuntimeOption::TryCompile,
        ]
        .into_iter()
        .filter_map(|runtime| build(runtime).ok())
        .collect()
    }

    #[test]
    fn nonce_ranges() {
        assert_eq!(nonces::<4>(7), [7, 8, 9, 10]);
        assert_eq!(nonces::<2>(u64::MAX), [u64::MAX, 0]);
    }

    #[test]
    fn defaults() {
        let config = HashXConfig::default();
        assert_eq!(config.runtime, RuntimeOption::TryCompile);
        assert_eq!(config.generation_attempts, 1);
        assert_eq!(HashXBuilder::from(config).config(), &config);
    }

    #[test]
    fn zero_attempts_never_build() {
        let result = HashXBuilder::new().generation_attempts(0).build(b"seed");
        assert!(matches!(result, Err(Error::ProgramConstraints)));
    }

    #[test]
    fn interpreter_is_always_available() {
        let hashx = build(RuntimeOption::InterpretOnly).unwrap();
        assert_eq!(hashx.runtime(), RuntimeKind::Interpret);
        assert_eq!(hashx.hash(0), hashx.hash(0));
    }

    #[test]
    fn requested_runtimes_are_honored() {
        match build(RuntimeOption::ScalarOnly) {
            Ok(hashx) => assert_eq!(hashx.runtime(), RuntimeKind::Scalar),
            Err(e) => assert!(matches!(e, Error::NotAvailable), "{e}"),
        }

        match build(RuntimeOption::VectorOnly) {
            Ok(hashx) => assert_eq!(hashx.runtime(), RuntimeKind::Vector),
            Err(e) => {
                assert!(matches!(e, Error::NotAvailable), "{e}");
                assert!(!VectorProgram::supported());
            }
        }

        let best = build(RuntimeOption::TryCompile).unwrap();
        if VectorProgram::supported() {
            assert_eq!(best.runtime(), RuntimeKind::Vector);
        }
    }

    #[test]
    fn seed_keys_differ_from_raw_keys() {
        let seeded = HashXBuilder::new()
            .generation_attempts(32)
            .build(b"hashx")
            .unwrap();
        let again = HashXBuilder::new()
            .generation_attempts(32)
            .build(b"hashx")
            .unwrap();
        assert_eq!(seeded.program(), again.program());
        assert_eq!(seeded.hash(1), again.hash(1));
        let raw = build(RuntimeOption::InterpretOnly).unwrap();
        assert_ne!(seeded.hash(1), raw.hash(1));
    }

    #[test]
    fn free_functions_match_instances() {
        let digest = hash(KEY, 5).unwrap();
        assert_eq!(digest, 2_710_159_467_264_561_803);

        let hashx = HashXBuilder::new().build_from_key(KEY).unwrap();
        assert_eq!(digest, hashx.hash(5));
        assert_eq!(hash_batch4(KEY, 5).unwrap()[0], digest);
        assert_eq!(hash_batch8(KEY, 2).unwrap()[3], digest);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn runtimes_agree(nonce in any::<u64>()) {
            let runtimes = runtimes();
            let expected = runtimes[0].hash(nonce);

            for hashx in &runtimes {
                prop_assert_eq!(hashx.hash(nonce), expected, "{:?}", hashx.runtime());
            }
        }

        #[test]
        fn batches_match_single_hashes(first in any::<u64>()) {
            for hashx in runtimes() {
                let batch4 = hashx.hash_batch4(first);
                let batch8 = hashx.hash_batch8(first);

                for (offset, (digest4, digest8)) in (0..).zip(batch4.iter().zip(&batch8)) {
                    let expected = hashx.hash(first.wrapping_add(offset));
                    prop_assert_eq!(*digest4, expected);
                    prop_assert_eq!(*digest8, expected);
                }
                for (offset, digest) in (0..).zip(&batch8).skip(4) {
                    prop_assert_eq!(*digest, hashx.hash(first.wrapping_add(offset)));
                }
            }
        }
    }
}
