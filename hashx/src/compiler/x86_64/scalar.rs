//! Scalar code generation, one hash per call.
//!
//! Register use:
//! - `r8..r15` hold `R0..R7`
//! - `rdi` points at the [`RegisterFile`](crate::RegisterFile), the only argument
//! - `rdx` holds the latest multiply-high result, `rax` is the multiplier scratch
//! - `esi` is all ones once the branch has been taken
use crate::{
    compiler::assembler::Assembler,
    config::NUM_REGISTERS,
    program::{Instruction, Program, sign_extend_2s_compl},
    register::RegisterId,
};

use super::encode::{
    AluOp, Gpr, alu_rip, alu_rr, imul, imul_rr, jmp_rel32, jnz_rel8, lea_shift, load, mov_rr,
    mul, or32_imm8, or32_rr, pop, push, ret, ror_imm, store, test32_rip, xor32_rr,
};

const REGISTER_MAP: [Gpr; NUM_REGISTERS] = [
    Gpr::R8,
    Gpr::R9,
    Gpr::R10,
    Gpr::R11,
    Gpr::R12,
    Gpr::R13,
    Gpr::R14,
    Gpr::R15,
];

const REGISTER_FILE: Gpr = Gpr::Rdi;
const MULH_RESULT: Gpr = Gpr::Rdx;
const BRANCH_PROHIBIT: Gpr = Gpr::Rsi;
const SCRATCH: Gpr = Gpr::Rax;

/// Callee saved registers clobbered by [`REGISTER_MAP`].
const CALLEE_SAVED: [Gpr; 4] = [Gpr::R12, Gpr::R13, Gpr::R14, Gpr::R15];

/// `or esi, -1` plus `jmp rel32`, skipped when the branch is not taken.
const TAKE_BRANCH_LEN: i8 = 3 + 5;

const fn gpr(reg: RegisterId) -> Gpr {
    REGISTER_MAP[reg.index()]
}

#[expect(clippy::cast_possible_truncation, reason = "8 registers of 8 bytes fit a disp8")]
const fn register_offset(reg: RegisterId) -> i8 {
    (reg.index() * size_of::<u64>()) as i8
}

/// Compiles `program` into a `extern "sysv64" fn(*mut RegisterFile)`.
pub(crate) fn compile(program: &Program) -> Vec<u8> {
    let mut compiler = ScalarCompiler {
        asm: Assembler::new(1),
        target: None,
    };

    compiler.prologue();
    for &instruction in program.instructions() {
        compiler.instruction(instruction);
    }
    compiler.epilogue();

    compiler.asm.finish()
}

struct ScalarCompiler {
    asm: Assembler,
    /// Code offset of the latest `Target`.
    target: Option<usize>,
}

impl ScalarCompiler {
    fn prologue(&mut self) {
        for reg in CALLEE_SAVED {
            self.asm.emit(&push(reg));
        }
        for reg in RegisterId::ALL {
            self.asm.emit(&load(gpr(reg), REGISTER_FILE, register_offset(reg)));
        }
        self.asm.emit(&xor32_rr(MULH_RESULT, MULH_RESULT));
        self.asm.emit(&xor32_rr(BRANCH_PROHIBIT, BRANCH_PROHIBIT));
    }

    fn epilogue(&mut self) {
        for reg in RegisterId::ALL {
            self.asm.emit(&store(REGISTER_FILE, register_offset(reg), gpr(reg)));
        }
        for reg in CALLEE_SAVED.into_iter().rev() {
            self.asm.emit(&pop(reg));
        }
        self.asm.emit(&ret());
    }

    fn instruction(&mut self, instruction: Instruction) {
        let asm = &mut self.asm;
        match instruction {
            Instruction::Mul { dst, src } => asm.emit(&imul_rr(gpr(dst), gpr(src))),
            Instruction::UMulH { dst, src } => {
                asm.emit(&mov_rr(SCRATCH, gpr(dst)));
                asm.emit(&mul(gpr(src)));
                asm.emit(&mov_rr(gpr(dst), MULH_RESULT));
            }
            Instruction::SMulH { dst, src } => {
                asm.emit(&mov_rr(SCRATCH, gpr(dst)));
                asm.emit(&imul(gpr(src)));
                asm.emit(&mov_rr(gpr(dst), MULH_RESULT));
            }
            Instruction::AddShift { dst, src, shift } => {
                asm.emit(&lea_shift(gpr(dst), gpr(src), shift));
            }
            Instruction::AddConst { dst, imm } => {
                asm.emit_with_constant(&alu_rip(AluOp::Add, gpr(dst)), sign_extend_2s_compl(imm));
            }
            Instruction::Sub { dst, src } => asm.emit(&alu_rr(AluOp::Sub, gpr(dst), gpr(src))),
            Instruction::Xor { dst, src } => asm.emit(&alu_rr(AluOp::Xor, gpr(dst), gpr(src))),
            Instruction::XorConst { dst, imm } => {
                asm.emit_with_constant(&alu_rip(AluOp::Xor, gpr(dst)), sign_extend_2s_compl(imm));
            }
            Instruction::Rotate { dst, right_rotate } => {
                asm.emit(&ror_imm(gpr(dst), right_rotate));
            }
            Instruction::Target => self.target = Some(asm.offset()),
            Instruction::Branch { mask } => {
                let target = self.target.expect("Branch without a preceding Target");
                emit_branch(asm, mask, target);
            }
        }
    }
}

/// Jumps back to `target` once, the first time `mask & mulh == 0`.
fn emit_branch(asm: &mut Assembler, mask: u32, target: usize) {
    asm.emit(&or32_rr(MULH_RESULT, BRANCH_PROHIBIT));
    asm.emit_with_constant(&test32_rip(MULH_RESULT), u64::from(mask));
    asm.emit(&jnz_rel8(TAKE_BRANCH_LEN));
    asm.emit(&or32_imm8(BRANCH_PROHIBIT, -1));
    asm.emit_jump_to(&jmp_rel32(0), target);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::config::ADD_SHIFT_FORBIDDEN_DST;

    use super::*;

    #[test]
    fn take_branch_len() {
        let len = or32_imm8(BRANCH_PROHIBIT, -1).len() + jmp_rel32(0).len();
        assert_eq!(len, usize::try_from(TAKE_BRANCH_LEN).unwrap());
    }

    #[test]
    fn add_shift_never_uses_r13_as_base() {
        // `lea` with a mod 0 base of r13 means "no base", and `AddShift` never targets R5.
        let r13 = RegisterId::ALL
            .into_iter()
            .find(|&reg| gpr(reg) == Gpr::R13)
            .unwrap();
        assert_eq!(r13.index(), ADD_SHIFT_FORBIDDEN_DST);
    }
}
