//! Register provenance tracking and the whole-program acceptance check.
use crate::{
    config::{
        ADD_SHIFT_FORBIDDEN_DST, NUM_REGISTERS, PROGRAM_SIZE, REQUIRED_MULTIPLIES,
        REQUIRED_OVERALL_LATENCY,
    },
    program::{cpu::ProgramSchedule, instructions::Instruction, instructions::Opcode, model::Pass},
    register::{RegisterId, RegisterSet},
};

/// The kind of instruction that last wrote a register.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub(crate) enum WriterOp {
    #[default]
    None,
    Mul,
    UMulH,
    SMulH,
    /// `AddShift` and `Sub` are one group.
    AddSub,
    AddConst,
    Xor,
    XorConst,
    Rotate,
}

/// What last wrote a register, and with which operand.
///
/// For register-source instructions the tag is the source register, for wide multiplies
/// it is a random value, and constant instructions carry no tag.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub(crate) struct RegisterWriter {
    pub(crate) op: WriterOp,
    pub(crate) tag: u32,
}

impl RegisterWriter {
    pub(crate) const NONE: Self = Self::new(WriterOp::None, 0);

    pub(crate) const fn new(op: WriterOp, tag: u32) -> Self {
        Self { op, tag }
    }

    /// A writer tagged with its source register.
    #[expect(clippy::cast_possible_truncation, reason = "register index is < 8")]
    pub(crate) const fn with_src(op: WriterOp, src: RegisterId) -> Self {
        Self::new(op, src.index() as u32)
    }
}

/// May `this` overwrite a register last written by `last`.
const fn writer_pair_allowed(pass: Pass, last: RegisterWriter, this: RegisterWriter) -> bool {
    let same_op = last.op as u8 == this.op as u8;
    let same_tag = last.tag == this.tag;

    match (last.op, this.op) {
        (WriterOp::Mul, WriterOp::Mul) if same_tag => matches!(pass, Pass::Retry),
        _ => !(same_op && same_tag),
    }
}

/// Which invariant a finished program broke.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub(crate) enum ConstraintViolation {
    #[error("program has {0} instructions")]
    Length(usize),
    #[error("program finishes at cycle {0}")]
    Latency(usize),
    #[error("program has {0} multiplies")]
    Multiplies(usize),
}

/// Generation state that rejects redundant instruction sequences.
///
/// One is owned by each generation attempt.
#[derive(Debug, Default)]
pub(crate) struct Validator {
    writers: [RegisterWriter; NUM_REGISTERS],
    multiply_count: usize,
}

impl Validator {
    /// Records a committed instruction.
    ///
    /// # Panics
    /// If an instruction without a destination is given a writer.
    pub(crate) fn record(&mut self, instruction: Instruction, writer: RegisterWriter) {
        if instruction.opcode().is_multiplication() {
            self.multiply_count += 1;
        }

        match instruction.dst() {
            Some(dst) => self.writers[dst.index()] = writer,
            None => assert_eq!(
                writer,
                RegisterWriter::NONE,
                "{instruction} has no destination but was given a writer"
            ),
        }
    }

    /// Forgets every register writer, called at each `Target`.
    pub(crate) const fn reset_writers(&mut self) {
        self.writers = [RegisterWriter::NONE; NUM_REGISTERS];
    }

    pub(crate) const fn multiply_count(&self) -> usize {
        self.multiply_count
    }

    /// Builds a checker for the destination registers of one instruction.
    ///
    /// `src` is only enforced against for opcodes that forbid `src == dst`.
    pub(crate) const fn destination_allowed(
        &self,
        op: Opcode,
        pass: Pass,
        writer: RegisterWriter,
        src: Option<RegisterId>,
    ) -> DstRegisterChecker<'_> {
        DstRegisterChecker {
            pass,
            writer,
            writers: &self.writers,
            op_is_add_shift: matches!(op, Opcode::AddShift),
            forbidden_src: if op.can_dst_be_src() { None } else { src },
        }
    }

    /// The final acceptance gate for a generated program.
    pub(crate) fn check_program(
        &self,
        schedule: &ProgramSchedule,
        instructions: &[Instruction],
    ) -> Result<(), ConstraintViolation> {
        if instructions.len() != PROGRAM_SIZE {
            return Err(ConstraintViolation::Length(instructions.len()));
        }

        let latency = schedule.overall_latency();
        if latency != REQUIRED_OVERALL_LATENCY {
            return Err(ConstraintViolation::Latency(latency));
        }

        if self.multiply_count != REQUIRED_MULTIPLIES {
            return Err(ConstraintViolation::Multiplies(self.multiply_count));
        }

        Ok(())
    }
}

/// Checks candidate destination registers for one instruction.
#[derive(Debug, Clone)]
pub(crate) struct DstRegisterChecker<'v> {
    pass: Pass,
    writer: RegisterWriter,
    writers: &'v [RegisterWriter; NUM_REGISTERS],
    op_is_add_shift: bool,
    forbidden_src: Option<RegisterId>,
}

impl DstRegisterChecker<'_> {
    pub(crate) fn check(&self, dst: RegisterId) -> bool {
        if self.op_is_add_shift && dst.index() == ADD_SHIFT_FORBIDDEN_DST {
            return false;
        }

        if Some(dst) == self.forbidden_src {
            return false;
        }

        writer_pair_allowed(self.pass, self.writers[dst.index()], self.writer)
    }
}

/// Narrows the available source registers for `op`.
///
/// An `AddShift` facing exactly two candidates never reads register 5.
pub(crate) fn src_registers_allowed(available: RegisterSet, op: Opcode) -> RegisterSet {
    if matches!(op, Opcode::AddShift) && available.len() == 2 {
        available.filter(|reg| reg.index() != ADD_SHIFT_FORBIDDEN_DST)
    } else {
        available
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn writer_pairs() {
        let mul_r1 = RegisterWriter::with_src(WriterOp::Mul, RegisterId::R1);
        let mul_r2 = RegisterWriter::with_src(WriterOp::Mul, RegisterId::R2);
        let sub_r1 = RegisterWriter::with_src(WriterOp::AddSub, RegisterId::R1);

        assert!(!writer_pair_allowed(Pass::Original, mul_r1, mul_r1));
        assert!(writer_pair_allowed(Pass::Retry, mul_r1, mul_r1));
        assert!(writer_pair_allowed(Pass::Original, mul_r1, mul_r2));
        assert!(!writer_pair_allowed(Pass::Retry, sub_r1, sub_r1));
        assert!(writer_pair_allowed(Pass::Original, sub_r1, mul_r1));

        let add_const = RegisterWriter::new(WriterOp::AddConst, 0);
        assert!(!writer_pair_allowed(Pass::Original, add_const, add_const));
        assert!(writer_pair_allowed(
            Pass::Original,
            RegisterWriter::NONE,
            add_const,
        ));
    }

    #[test]
    fn destination_rules() {
        let mut validator = Validator::default();
        let xor = Instruction::Xor {
            dst: RegisterId::R0,
            src: RegisterId::R1,
        };
        let writer = RegisterWriter::with_src(WriterOp::Xor, RegisterId::R1);
        validator.record(xor, writer);

        let checker = validator.destination_allowed(
            Opcode::Xor,
            Pass::Original,
            writer,
            Some(RegisterId::R1),
        );
        assert!(!checker.check(RegisterId::R0), "redundant writer");
        assert!(!checker.check(RegisterId::R1), "src == dst");
        assert!(checker.check(RegisterId::R2));

        let checker = validator.destination_allowed(
            Opcode::AddShift,
            Pass::Original,
            RegisterWriter::with_src(WriterOp::AddSub, RegisterId::R0),
            Some(RegisterId::R0),
        );
        assert!(!checker.check(RegisterId::R5));
        assert!(checker.check(RegisterId::R4));

        // Wide multiplies may use the same register for both operands.
        let checker = validator.destination_allowed(
            Opcode::UMulH,
            Pass::Original,
            RegisterWriter::new(WriterOp::UMulH, 77),
            Some(RegisterId::R3),
        );
        assert!(checker.check(RegisterId::R3));

        validator.reset_writers();
        let checker = validator.destination_allowed(
            Opcode::Xor,
            Pass::Original,
            writer,
            Some(RegisterId::R1),
        );
        assert!(checker.check(RegisterId::R0));
    }

    #[test]
    #[should_panic(expected = "has no destination")]
    fn target_with_writer_panics() {
        let mut validator = Validator::default();
        validator.record(Instruction::Target, RegisterWriter::new(WriterOp::Mul, 1));
    }

    #[test]
    fn multiply_count() {
        let mut validator = Validator::default();
        let mul = Instruction::UMulH {
            dst: RegisterId::R0,
            src: RegisterId::R0,
        };
        validator.record(mul, RegisterWriter::new(WriterOp::UMulH, 1));
        validator.record(Instruction::Target, RegisterWriter::NONE);
        assert_eq!(validator.multiply_count(), 1);
    }

    #[test]
    fn add_shift_sources() {
        let two = RegisterSet::all().filter(|r| matches!(r, RegisterId::R5 | RegisterId::R6));
        let allowed = src_registers_allowed(two, Opcode::AddShift);
        assert_eq!(allowed.len(), 1);
        assert!(allowed.contains(RegisterId::R6));

        assert_eq!(src_registers_allowed(two, Opcode::Sub), two);
        assert_eq!(
            src_registers_allowed(RegisterSet::all(), Opcode::AddShift),
            RegisterSet::all()
        );
    }
}
