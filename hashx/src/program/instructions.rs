use std::fmt;

use crate::register::RegisterId;

/// Every operation the virtual CPU knows about.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    /// dst = dst * src
    Mul,
    /// dst = (dst * src) >> 64
    UMulH,
    /// dst = (dst * src) >> 64 (signed)
    SMulH,
    /// dst = dst + (src << shift)
    AddShift,
    /// dst = dst + imm
    AddConst,
    /// dst = dst - src
    Sub,
    /// dst = dst ^ src
    Xor,
    /// dst = dst ^ imm
    XorConst,
    /// dst = dst >>> imm
    Rotate,
    /// Landing point of the next `Branch`.
    Target,
    /// Jump back to the last `Target`, at most once per run.
    Branch,
}

impl Opcode {
    /// Is this one of the three multiply instructions.
    pub const fn is_multiplication(self) -> bool {
        matches!(self, Self::Mul | Self::UMulH | Self::SMulH)
    }

    /// Is the destination allowed to be the same as the source.
    pub const fn can_dst_be_src(self) -> bool {
        !matches!(self, Self::AddShift | Self::Mul | Self::Sub | Self::Xor)
    }
}

/// One instruction of a program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Instruction {
    Mul { dst: RegisterId, src: RegisterId },
    UMulH { dst: RegisterId, src: RegisterId },
    SMulH { dst: RegisterId, src: RegisterId },
    AddShift {
        dst: RegisterId,
        src: RegisterId,
        shift: u8,
    },
    AddConst { dst: RegisterId, imm: i32 },
    Sub { dst: RegisterId, src: RegisterId },
    Xor { dst: RegisterId, src: RegisterId },
    XorConst { dst: RegisterId, imm: i32 },
    Rotate { dst: RegisterId, right_rotate: u8 },
    Target,
    Branch { mask: u32 },
}

impl Instruction {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Mul { .. } => Opcode::Mul,
            Self::UMulH { .. } => Opcode::UMulH,
            Self::SMulH { .. } => Opcode::SMulH,
            Self::AddShift { .. } => Opcode::AddShift,
            Self::AddConst { .. } => Opcode::AddConst,
            Self::Sub { .. } => Opcode::Sub,
            Self::Xor { .. } => Opcode::Xor,
            Self::XorConst { .. } => Opcode::XorConst,
            Self::Rotate { .. } => Opcode::Rotate,
            Self::Target => Opcode::Target,
            Self::Branch { .. } => Opcode::Branch,
        }
    }

    pub const fn dst(&self) -> Option<RegisterId> {
        match self {
            Self::Mul { dst, .. }
            | Self::UMulH { dst, .. }
            | Self::SMulH { dst, .. }
            | Self::AddShift { dst, .. }
            | Self::AddConst { dst, .. }
            | Self::Sub { dst, .. }
            | Self::Xor { dst, .. }
            | Self::XorConst { dst, .. }
            | Self::Rotate { dst, .. } => Some(*dst),
            Self::Target | Self::Branch { .. } => None,
        }
    }

    pub const fn src(&self) -> Option<RegisterId> {
        match self {
            Self::Mul { src, .. }
            | Self::UMulH { src, .. }
            | Self::SMulH { src, .. }
            | Self::AddShift { src, .. }
            | Self::Sub { src, .. }
            | Self::Xor { src, .. } => Some(*src),
            Self::AddConst { .. }
            | Self::XorConst { .. }
            | Self::Rotate { .. }
            | Self::Target
            | Self::Branch { .. } => None,
        }
    }

    /// The 32-bit operand: the constant, shift, rotation or branch mask.
    #[expect(clippy::cast_sign_loss, reason = "operand is a raw 32-bit field")]
    pub fn operand(&self) -> u32 {
        match self {
            Self::AddShift { shift, .. } => u32::from(*shift),
            Self::AddConst { imm, .. } | Self::XorConst { imm, .. } => *imm as u32,
            Self::Rotate { right_rotate, .. } => u32::from(*right_rotate),
            Self::Branch { mask } => *mask,
            Self::Mul { .. }
            | Self::UMulH { .. }
            | Self::SMulH { .. }
            | Self::Sub { .. }
            | Self::Xor { .. }
            | Self::Target => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mul { dst, src } => write!(f, "mul {dst}, {src}"),
            Self::UMulH { dst, src } => write!(f, "umulh {dst}, {src}"),
            Self::SMulH { dst, src } => write!(f, "smulh {dst}, {src}"),
            Self::AddShift { dst, src, shift } => write!(f, "add {dst}, {src} << {shift}"),
            Self::AddConst { dst, imm } => write!(f, "add {dst}, {imm}"),
            Self::Sub { dst, src } => write!(f, "sub {dst}, {src}"),
            Self::Xor { dst, src } => write!(f, "xor {dst}, {src}"),
            Self::XorConst { dst, imm } => write!(f, "xor {dst}, {imm}"),
            Self::Rotate { dst, right_rotate } => write!(f, "ror {dst}, {right_rotate}"),
            Self::Target => write!(f, "target:"),
            Self::Branch { mask } => write!(f, "branch {mask:#010x}"),
        }
    }
}
