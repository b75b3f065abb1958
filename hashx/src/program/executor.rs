use crate::{program::instructions::Instruction, register::RegisterFile};

/// Runs `program` over `registers`.
///
/// # Panics
/// If a `Branch` is taken before any `Target`, which generated programs never do.
pub(crate) fn execute(program: &[Instruction], registers: &mut RegisterFile) {
    let mut allow_branch = true;
    let mut branch_target: Option<usize> = None;
    let mut mulh_result: u32 = 0;
    let mut pc = 0;

    while let Some(instruction) = program.get(pc) {
        let mut next_pc = pc + 1;

        match *instruction {
            Instruction::Mul { dst, src } => {
                registers.apply_to_dst_with_src(dst, src, u64::wrapping_mul);
            }
            Instruction::UMulH { dst, src } => {
                let value = high_mul(registers.get(dst), registers.get(src));
                mulh_result = low_u32(value);
                registers.set(dst, value);
            }
            Instruction::SMulH { dst, src } => {
                let value = signed_high_mul(registers.get(dst), registers.get(src));
                mulh_result = low_u32(value);
                registers.set(dst, value);
            }
            Instruction::AddShift { dst, src, shift } => {
                let op = |dst_val: u64, src_val: u64| dst_val.wrapping_add(src_val << shift);
                registers.apply_to_dst_with_src(dst, src, op);
            }
            Instruction::AddConst { dst, imm } => {
                let op = |dst_val: u64| dst_val.wrapping_add(sign_extend_2s_compl(imm));
                registers.apply_to_dst(dst, op);
            }
            Instruction::Sub { dst, src } => {
                registers.apply_to_dst_with_src(dst, src, u64::wrapping_sub);
            }
            Instruction::Xor { dst, src } => {
                let op = |dst_val: u64, src_val| dst_val ^ src_val;
                registers.apply_to_dst_with_src(dst, src, op);
            }
            Instruction::XorConst { dst, imm } => {
                let op = |dst_val: u64| dst_val ^ sign_extend_2s_compl(imm);
                registers.apply_to_dst(dst, op);
            }
            Instruction::Rotate { dst, right_rotate } => {
                let op = |dst_val: u64| dst_val.rotate_right(u32::from(right_rotate));
                registers.apply_to_dst(dst, op);
            }
            Instruction::Target => branch_target = Some(pc),
            Instruction::Branch { mask } => {
                if allow_branch && mask & mulh_result == 0 {
                    allow_branch = false;
                    next_pc = branch_target.expect("Branch taken without a preceding Target");
                }
            }
        }

        pc = next_pc;
    }
}

pub(crate) const fn high_mul(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) >> 64) as u64
}

#[expect(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    reason = "two's complement reinterpretation"
)]
pub(crate) const fn signed_high_mul(a: u64, b: u64) -> u64 {
    ((a as i64 as i128 * b as i64 as i128) >> 64) as u64
}

#[expect(clippy::cast_sign_loss)]
pub(crate) const fn sign_extend_2s_compl(imm: i32) -> u64 {
    imm as i64 as u64
}

const fn low_u32(value: u64) -> u32 {
    (value & 0xffff_ffff) as u32
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::register::RegisterId::{R0, R1, R2, R3};

    #[test]
    fn multiplies() {
        assert_eq!(high_mul(u64::MAX, u64::MAX), u64::MAX - 1);
        assert_eq!(high_mul(1 << 63, 4), 2);
        assert_eq!(signed_high_mul(u64::MAX, u64::MAX), 0);
        assert_eq!(signed_high_mul(u64::MAX, 5), u64::MAX);
        assert_eq!(signed_high_mul(1 << 63, 1 << 63), 1 << 62);
        assert_eq!(sign_extend_2s_compl(-1), u64::MAX);
        assert_eq!(sign_extend_2s_compl(7), 7);
    }

    #[test]
    fn arithmetic() {
        let program = [
            Instruction::AddShift {
                dst: R0,
                src: R1,
                shift: 3,
            },
            Instruction::Rotate {
                dst: R1,
                right_rotate: 4,
            },
            Instruction::AddConst { dst: R2, imm: -2 },
            Instruction::XorConst { dst: R3, imm: -1 },
            Instruction::Sub { dst: R2, src: R0 },
        ];
        let mut regs = RegisterFile([1, 0x12, 5, 0xf0, 0, 0, 0, 0]);
        execute(&program, &mut regs);

        assert_eq!(regs.get(R0), 1 + (0x12 << 3));
        assert_eq!(regs.get(R1), 0x2000_0000_0000_0001);
        assert_eq!(regs.get(R2), 3_u64.wrapping_sub(1 + (0x12 << 3)));
        assert_eq!(regs.get(R3), !0xf0);
    }

    /// `R1` counts how many times the block after `Target` ran.
    fn branch_program(mask: u32) -> [Instruction; 4] {
        [
            Instruction::Target,
            Instruction::AddConst { dst: R1, imm: 1 },
            Instruction::UMulH { dst: R2, src: R3 },
            Instruction::Branch { mask },
        ]
    }

    #[test]
    fn branch_taken_once() {
        // R2 = 0 makes the high product 0, so the branch is taken.
        let mut regs = RegisterFile([0, 10, 0, u64::MAX, 0, 0, 0, 0]);
        execute(&branch_program(0xf), &mut regs);
        assert_eq!(regs.get(R1), 12);
    }

    #[test]
    fn branch_not_taken() {
        // high(MAX * MAX) = MAX - 1, low nibble 0xe.
        let mut regs = RegisterFile([0, 10, u64::MAX, u64::MAX, 0, 0, 0, 0]);
        execute(&branch_program(0xf), &mut regs);
        assert_eq!(regs.get(R1), 11);

        // Mask bit 0 is clear in 0xe.
        let mut regs = RegisterFile([0, 10, u64::MAX, u64::MAX, 0, 0, 0, 0]);
        execute(&branch_program(0x1), &mut regs);
        assert_eq!(regs.get(R1), 12);
    }

    #[test]
    #[should_panic(expected = "without a preceding Target")]
    fn branch_without_target() {
        let mut regs = RegisterFile::default();
        execute(&[Instruction::Branch { mask: 1 }], &mut regs);
    }
}
