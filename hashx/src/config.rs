//! Protocol constants.
//!
//! None of these are tunable, changing any of them changes every program and every digest.

/// Number of instructions in a finished program.
pub const PROGRAM_SIZE: usize = 512;

/// Number of general purpose registers in the virtual CPU.
pub const NUM_REGISTERS: usize = 8;

/// Number of lanes processed by one call of the vector backend.
pub const VECTOR_LANES: usize = 8;

/// The cycle at which instruction generation stops.
pub(crate) const TARGET_CYCLES: usize = 192;

/// Longest latency of any instruction, in cycles.
pub(crate) const MAX_LATENCY: usize = 4;

/// Size of the port schedule, the target plus room for the slowest instruction to finish.
pub(crate) const SCHEDULE_SIZE: usize = TARGET_CYCLES + MAX_LATENCY;

/// Sub-cycles per cycle, these only drive the opcode pattern.
pub(crate) const SUB_CYCLES_PER_CYCLE: usize = 3;

/// Period of the opcode pattern, in sub-cycles.
pub(crate) const OPCODE_PATTERN_PERIOD: usize = 36;

/// Overall latency a finished program must have.
pub(crate) const REQUIRED_OVERALL_LATENCY: usize = 194;

/// Number of `Mul`, `UMulH` and `SMulH` instructions a finished program must have.
pub(crate) const REQUIRED_MULTIPLIES: usize = 192;

/// Bits set in every `Branch` mask.
pub(crate) const BRANCH_MASK_POPCOUNT: u32 = 4;

/// Register which `AddShift` never writes.
///
/// On x86-64 this register maps to `r13`, which cannot be the base of a `lea` without a
/// displacement.
pub(crate) const ADD_SHIFT_FORBIDDEN_DST: usize = 5;

/// Tweak mixed into the lower half of the register file during init.
pub(crate) const INIT_TWEAK_LOW: u64 = 0xee;

/// Tweak mixed into the upper half of the register file during init.
pub(crate) const INIT_TWEAK_HIGH: u64 = 0xdd;

/// Tweak mixed into the program random stream.
pub(crate) const RNG_TWEAK: u64 = 0xff;
