//! `HashX`, a keyed hash function whose program is generated from the key.
//!
//! Every key selects a random 512 instruction program for a small virtual CPU. The program
//! is shaped by a model of a superscalar x86 core so that it keeps the multiplier busy and
//! resists being sped up by specialized hardware. Hashing a nonce runs the program over a
//! register file seeded from the key and the nonce, then folds the registers into a `u64`.
//!
//! Programs run on one of three backends:
//! - a portable interpreter
//! - scalar x86-64 machine code
//! - AVX-512 machine code hashing eight nonces per call
//!
//! All three produce identical digests.
//!
//! ```rust
//! use hashx::HashXBuilder;
//!
//! let hashx = HashXBuilder::new().generation_attempts(16).build(b"my seed").unwrap();
//! let digest = hashx.hash(7);
//!
//! assert_eq!(hashx.hash_batch8(0)[7], digest);
//! ```

mod compiler;
mod config;
mod error;
mod program;
mod rand;
mod register;
mod runner;
mod siphash;

pub use config::{NUM_REGISTERS, PROGRAM_SIZE, VECTOR_LANES};
pub use error::Error;
pub use program::{Instruction, Opcode, Program};
pub use register::{RegisterFile, RegisterId, VectorRegisterFile};
pub use runner::{
    DEFAULT_GENERATION_ATTEMPTS, HashX, HashXBuilder, HashXConfig, RuntimeKind, RuntimeOption,
    hash, hash_batch4, hash_batch8,
};
pub use siphash::SipState;
