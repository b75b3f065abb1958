//! Static tables describing the scheduling model.
//!
//! Everything here is constant data plus pure lookups, shared read-only by every generator.
use crate::{
    config::{OPCODE_PATTERN_PERIOD, SUB_CYCLES_PER_CYCLE},
    program::{cpu::ExecutionPorts, instructions::Opcode},
    rand::RandomSource,
};

/// Which generation pass is being attempted for the current slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Pass {
    /// The first attempt at a slot.
    Original,
    /// The second attempt, restricted to opcodes that need no source register.
    Retry,
}

/// Opcode class expected at a sub-cycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum OpcodeSelector {
    Target,
    Branch,
    Mul,
    WideMul,
    Normal,
    ImmediateSrc,
}

const NORMAL_OPS: [Opcode; 8] = [
    Opcode::Rotate,
    Opcode::XorConst,
    Opcode::AddConst,
    Opcode::AddConst,
    Opcode::Sub,
    Opcode::Xor,
    Opcode::XorConst,
    Opcode::AddShift,
];

const IMMEDIATE_SRC_OPS: [Opcode; 4] = [
    Opcode::Rotate,
    Opcode::XorConst,
    Opcode::AddConst,
    Opcode::AddConst,
];

const WIDE_MUL_OPS: [Opcode; 2] = [Opcode::SMulH, Opcode::UMulH];

impl OpcodeSelector {
    /// The opcode class for a sub-cycle and pass.
    pub(crate) const fn for_sub_cycle(sub_cycle: usize, pass: Pass) -> Self {
        match sub_cycle % OPCODE_PATTERN_PERIOD {
            1 => Self::Target,
            19 => Self::Branch,
            12 | 24 => Self::WideMul,
            n if n % SUB_CYCLES_PER_CYCLE == 0 => Self::Mul,
            _ => match pass {
                Pass::Original => Self::Normal,
                Pass::Retry => Self::ImmediateSrc,
            },
        }
    }

    /// Draws one opcode from this class.
    pub(crate) fn apply(self, rng: &mut RandomSource) -> Opcode {
        match self {
            Self::Target => Opcode::Target,
            Self::Branch => Opcode::Branch,
            Self::Mul => Opcode::Mul,
            Self::WideMul => rng.select_u8(&WIDE_MUL_OPS),
            Self::Normal => rng.select_u8(&NORMAL_OPS),
            Self::ImmediateSrc => rng.select_u8(&IMMEDIATE_SRC_OPS),
        }
    }
}

/// Cycles until the result of `op` can be read.
pub(crate) const fn latency(op: Opcode) -> usize {
    match op {
        Opcode::Mul => 3,
        Opcode::UMulH | Opcode::SMulH => 4,
        Opcode::AddShift
        | Opcode::AddConst
        | Opcode::Sub
        | Opcode::Xor
        | Opcode::XorConst
        | Opcode::Rotate
        | Opcode::Target
        | Opcode::Branch => 1,
    }
}

/// The micro-ops an opcode decomposes into, with the ports each may issue on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum MicroOps {
    Single(ExecutionPorts),
    /// Both halves must issue in the same cycle.
    Dual(ExecutionPorts, ExecutionPorts),
}

impl MicroOps {
    pub(crate) const fn for_opcode(op: Opcode) -> Self {
        const P015: ExecutionPorts = ExecutionPorts::all();
        const P01: ExecutionPorts = ExecutionPorts::P0.union(ExecutionPorts::P1);
        const P05: ExecutionPorts = ExecutionPorts::P0.union(ExecutionPorts::P5);

        match op {
            Opcode::AddConst | Opcode::Sub | Opcode::Xor | Opcode::XorConst => Self::Single(P015),
            Opcode::Mul => Self::Single(ExecutionPorts::P1),
            Opcode::AddShift => Self::Single(P01),
            Opcode::Rotate => Self::Single(P05),
            Opcode::UMulH | Opcode::SMulH => Self::Dual(ExecutionPorts::P1, ExecutionPorts::P5),
            Opcode::Target | Opcode::Branch => Self::Dual(P015, P015),
        }
    }

    /// How far an instruction of this shape moves the sub-cycle cursor.
    pub(crate) const fn sub_cycles(self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Dual(..) => 2,
        }
    }
}

/// Can `proposed` directly follow `previous`.
pub(crate) const fn opcode_pair_allowed(previous: Option<Opcode>, proposed: Opcode) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    match proposed {
        Opcode::AddConst | Opcode::Xor | Opcode::XorConst | Opcode::Rotate => {
            !matches_opcode(previous, proposed)
        }
        Opcode::AddShift | Opcode::Sub => {
            !matches!(previous, Opcode::AddShift | Opcode::Sub)
        }
        Opcode::Mul | Opcode::UMulH | Opcode::SMulH | Opcode::Target | Opcode::Branch => true,
    }
}

/// `PartialEq` is not const.
const fn matches_opcode(a: Opcode, b: Opcode) -> bool {
    a as u8 == b as u8
}
