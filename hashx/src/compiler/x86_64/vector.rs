//! AVX-512 code generation, eight hashes per call.
//!
//! Each lane runs its own copy of the program in lockstep with the others. Branches are the
//! only place lanes diverge: the instructions between `Target` and `Branch` are emitted a
//! second time, with every result merged under the mask of lanes that took the branch.
//!
//! Register use:
//! - `zmm0..zmm7` hold `R0..R7`, one lane per hash
//! - `zmm8` holds the latest multiply-high result
//! - `zmm9..zmm13` are scratch, `zmm14` is the low 32 bit mask
//! - `k2` marks lanes that may still branch, `k1` those taking the current branch
//! - `rdi` points at the [`VectorRegisterFile`](crate::VectorRegisterFile)
use crate::{
    compiler::assembler::Assembler,
    config::{NUM_REGISTERS, VECTOR_LANES},
    program::{Instruction, Program, sign_extend_2s_compl},
    register::RegisterId,
};

use super::encode::{
    Gpr, KReg, VecBinOp, VecOperand, VecShift, Zmm, jz_rel32, kandnw, kortestw, kxnorw,
    ret, vmovdqa64, vmovdqu64_load, vmovdqu64_store, vp_binary, vp_shift_imm, vptestnmq,
    vzeroupper,
};

const REGISTER_MAP: [Zmm; NUM_REGISTERS] = [
    Zmm(0),
    Zmm(1),
    Zmm(2),
    Zmm(3),
    Zmm(4),
    Zmm(5),
    Zmm(6),
    Zmm(7),
];

const MULH_RESULT: Zmm = Zmm(8);
const TEMP: [Zmm; 5] = [Zmm(9), Zmm(10), Zmm(11), Zmm(12), Zmm(13)];
const LOW32: Zmm = Zmm(14);

const TAKING_BRANCH: KReg = KReg(1);
const MAY_BRANCH: KReg = KReg(2);

const REGISTER_FILE: Gpr = Gpr::Rdi;

const fn zmm(reg: RegisterId) -> Zmm {
    REGISTER_MAP[reg.index()]
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    reason = "the register file is 512 bytes"
)]
const fn register_offset(reg: RegisterId) -> i32 {
    (reg.index() * VECTOR_LANES * size_of::<u64>()) as i32
}

/// Compiles `program` into a `extern "sysv64" fn(*mut VectorRegisterFile)`.
///
/// The generated code needs AVX-512F and AVX-512DQ.
pub(crate) fn compile(program: &Program) -> Vec<u8> {
    let mut asm = Assembler::new(VECTOR_LANES);
    let instructions = program.instructions();

    for reg in RegisterId::ALL {
        asm.emit(&vmovdqu64_load(
            zmm(reg),
            REGISTER_FILE,
            register_offset(reg),
        ));
    }
    asm.emit(&vp_binary(
        VecBinOp::Xorq,
        MULH_RESULT,
        MULH_RESULT,
        VecOperand::Reg(MULH_RESULT),
        None,
    ));
    asm.emit_with_constant(&vmovdqa64(LOW32, VecOperand::Rip, None), 0xffff_ffff);
    asm.emit(&kxnorw(MAY_BRANCH, MAY_BRANCH, MAY_BRANCH));

    let mut target = None;
    for (index, instruction) in instructions.iter().enumerate() {
        match *instruction {
            Instruction::Target => target = Some(index),
            Instruction::Branch { mask } => {
                let target = target.expect("Branch without a preceding Target");
                emit_branch(&mut asm, mask, &instructions[target + 1..index]);
            }
            Instruction::Mul { .. }
            | Instruction::UMulH { .. }
            | Instruction::SMulH { .. }
            | Instruction::AddShift { .. }
            | Instruction::AddConst { .. }
            | Instruction::Sub { .. }
            | Instruction::Xor { .. }
            | Instruction::XorConst { .. }
            | Instruction::Rotate { .. } => emit_instruction(&mut asm, *instruction, None),
        }
    }

    for reg in RegisterId::ALL {
        asm.emit(&vmovdqu64_store(
            REGISTER_FILE,
            register_offset(reg),
            zmm(reg),
        ));
    }
    asm.emit(&vzeroupper());
    asm.emit(&ret());

    asm.finish()
}

/// Lanes with `mask & mulh == 0` that have not branched yet run `body` again.
fn emit_branch(asm: &mut Assembler, mask: u32, body: &[Instruction]) {
    asm.emit_with_constant(
        &vptestnmq(
            TAKING_BRANCH,
            MULH_RESULT,
            VecOperand::Rip,
            Some(MAY_BRANCH),
        ),
        u64::from(mask),
    );
    asm.emit(&kortestw(TAKING_BRANCH, TAKING_BRANCH));
    let skip = asm.emit_forward_jump(&jz_rel32(0));

    for &instruction in body {
        emit_instruction(asm, instruction, Some(TAKING_BRANCH));
    }
    asm.emit(&kandnw(MAY_BRANCH, TAKING_BRANCH, MAY_BRANCH));

    asm.bind(skip);
}

/// Emits one instruction, writing its results only to lanes in `lanes` when given.
///
/// A `Branch` inside a replayed body is never taken again, so control flow emits nothing.
fn emit_instruction(asm: &mut Assembler, instruction: Instruction, lanes: Option<KReg>) {
    match instruction {
        Instruction::Mul { dst, src } => binary(asm, VecBinOp::Mullq, dst, src, lanes),
        Instruction::UMulH { dst, src } => emit_mulh(asm, zmm(dst), zmm(src), false, lanes),
        Instruction::SMulH { dst, src } => emit_mulh(asm, zmm(dst), zmm(src), true, lanes),
        Instruction::AddShift { dst, src, shift } => {
            let shifted = TEMP[0];
            let shl = vp_shift_imm(VecShift::Sllq, shifted, zmm(src), shift, None);
            asm.emit(&shl);
            asm.emit(&vp_binary(
                VecBinOp::Addq,
                zmm(dst),
                zmm(dst),
                VecOperand::Reg(shifted),
                lanes,
            ));
        }
        Instruction::AddConst { dst, imm } => {
            let add = vp_binary(VecBinOp::Addq, zmm(dst), zmm(dst), VecOperand::Rip, lanes);
            asm.emit_with_constant(&add, sign_extend_2s_compl(imm));
        }
        Instruction::Sub { dst, src } => binary(asm, VecBinOp::Subq, dst, src, lanes),
        Instruction::Xor { dst, src } => binary(asm, VecBinOp::Xorq, dst, src, lanes),
        Instruction::XorConst { dst, imm } => {
            let xor = vp_binary(VecBinOp::Xorq, zmm(dst), zmm(dst), VecOperand::Rip, lanes);
            asm.emit_with_constant(&xor, sign_extend_2s_compl(imm));
        }
        Instruction::Rotate { dst, right_rotate } => {
            let ror = vp_shift_imm(VecShift::Rorq, zmm(dst), zmm(dst), right_rotate, lanes);
            asm.emit(&ror);
        }
        Instruction::Target | Instruction::Branch { .. } => (),
    }
}

fn binary(
    asm: &mut Assembler,
    op: VecBinOp,
    dst: RegisterId,
    src: RegisterId,
    lanes: Option<KReg>,
) {
    let src = VecOperand::Reg(zmm(src));
    asm.emit(&vp_binary(op, zmm(dst), zmm(dst), src, lanes));
}

/// The high half of the 128 bit product, built from four 32x32 bit multiplies.
///
/// The signed variant corrects the unsigned result with
/// `mulh_s(a, b) = mulh_u(a, b) - (a < 0 ? b : 0) - (b < 0 ? a : 0)`.
fn emit_mulh(asm: &mut Assembler, a: Zmm, b: Zmm, signed: bool, lanes: Option<KReg>) {
    let [a_hi, b_hi, low, mid, scratch] = TEMP;

    vec_shift(asm, VecShift::Srlq, a_hi, a, 32);
    vec_shift(asm, VecShift::Srlq, b_hi, b, 32);
    vec_op(asm, VecBinOp::Muludq, low, a, b);
    vec_op(asm, VecBinOp::Muludq, mid, a, b_hi);
    vec_op(asm, VecBinOp::Muludq, b_hi, a_hi, b_hi);
    vec_op(asm, VecBinOp::Muludq, a_hi, a_hi, b);
    // hi*hi is in `b_hi`, hi*lo in `a_hi`, lo*hi in `mid`, lo*lo in `low`.

    // Carry out of the middle 64 bits.
    vec_shift(asm, VecShift::Srlq, low, low, 32);
    vec_op(asm, VecBinOp::Andq, scratch, mid, LOW32);
    vec_op(asm, VecBinOp::Addq, low, low, scratch);
    vec_op(asm, VecBinOp::Andq, scratch, a_hi, LOW32);
    vec_op(asm, VecBinOp::Addq, low, low, scratch);
    vec_shift(asm, VecShift::Srlq, low, low, 32);

    vec_shift(asm, VecShift::Srlq, mid, mid, 32);
    vec_shift(asm, VecShift::Srlq, a_hi, a_hi, 32);
    vec_op(asm, VecBinOp::Addq, b_hi, b_hi, mid);
    vec_op(asm, VecBinOp::Addq, b_hi, b_hi, a_hi);
    vec_op(asm, VecBinOp::Addq, b_hi, b_hi, low);

    if signed {
        for (negative, other) in [(a, b), (b, a)] {
            vec_shift(asm, VecShift::Sraq, scratch, negative, 63);
            vec_op(asm, VecBinOp::Andq, scratch, scratch, other);
            vec_op(asm, VecBinOp::Subq, b_hi, b_hi, scratch);
        }
    }

    asm.emit(&vmovdqa64(a, VecOperand::Reg(b_hi), lanes));
    asm.emit(&vmovdqa64(MULH_RESULT, VecOperand::Reg(b_hi), lanes));
}

fn vec_op(asm: &mut Assembler, op: VecBinOp, dst: Zmm, x: Zmm, y: Zmm) {
    asm.emit(&vp_binary(op, dst, x, VecOperand::Reg(y), None));
}

fn vec_shift(asm: &mut Assembler, op: VecShift, dst: Zmm, src: Zmm, imm: u8) {
    asm.emit(&vp_shift_imm(op, dst, src, imm, None));
}
