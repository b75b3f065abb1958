//! Program generation and interpretation.
mod constraints;
mod cpu;
mod executor;
mod generator;
mod instructions;
mod model;

use std::fmt;

pub use instructions::{Instruction, Opcode};

use crate::{error::Error, rand::RandomSource, register::RegisterFile, siphash::SipState};
use generator::Generator;

pub(crate) use executor::sign_extend_2s_compl;

/// A generated program, immutable once built.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Program {
    instructions: Box<[Instruction]>,
}

impl Program {
    /// Generates the program for `key` in a single attempt.
    ///
    /// # Errors
    /// [`Error::ProgramConstraints`] if the random stream produced a program that breaks the
    /// whole-program constraints, which happens for a small fraction of keys.
    pub fn generate(key: SipState) -> Result<Self, Error> {
        Self::generate_with_attempts(key, 1)
    }

    /// Generates the program for `key`, trying up to `attempts` salted random streams.
    ///
    /// # Errors
    /// [`Error::ProgramConstraints`] if every attempt failed.
    pub fn generate_with_attempts(key: SipState, attempts: u32) -> Result<Self, Error> {
        for salt in 0..attempts {
            match Generator::new(RandomSource::new(key, salt)).generate_program() {
                Ok(instructions) => {
                    tracing::debug!(salt, "generated program");
                    return Ok(Self {
                        instructions: instructions.into_boxed_slice(),
                    });
                }
                Err(violation) => tracing::debug!(salt, "program rejected: {violation}"),
            }
        }

        Err(Error::ProgramConstraints)
    }

    /// Builds a program from raw instructions, skipping every generation constraint.
    #[cfg(test)]
    pub(crate) fn from_instructions(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions: instructions.into_boxed_slice(),
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Runs the program over `registers` with the reference interpreter.
    pub fn interpret(&self, registers: &mut RegisterFile) {
        executor::execute(&self.instructions, registers);
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::config::{BRANCH_MASK_POPCOUNT, PROGRAM_SIZE, REQUIRED_MULTIPLIES};

    /// Generates with a generous retry budget so the invariants can be checked on every key.
    fn generate(key: [u64; 4]) -> Program {
        Program::generate_with_attempts(SipState::from_words(key), 32).unwrap()
    }

    fn assert_invariants(program: &Program) {
        assert_eq!(program.len(), PROGRAM_SIZE);

        let multiplies = program
            .instructions()
            .iter()
            .filter(|i| i.opcode().is_multiplication())
            .count();
        assert_eq!(multiplies, REQUIRED_MULTIPLIES);

        let mut seen_target = false;
        for instruction in program.instructions() {
            match instruction {
                Instruction::Target => seen_target = true,
                Instruction::Branch { mask } => {
                    assert!(seen_target, "Branch before any Target");
                    assert_eq!(mask.count_ones(), BRANCH_MASK_POPCOUNT);
                }
                Instruction::AddShift { dst, src, shift } => {
                    assert_ne!(dst, src);
                    assert_ne!(dst.index(), 5);
                    assert!(*shift < 4);
                }
                Instruction::Mul { dst, src }
                | Instruction::Sub { dst, src }
                | Instruction::Xor { dst, src } => assert_ne!(dst, src),
                Instruction::Rotate { right_rotate, .. } => {
                    assert!((1..64).contains(right_rotate));
                }
                Instruction::AddConst { imm, .. } | Instruction::XorConst { imm, .. } => {
                    assert_ne!(*imm, 0);
                }
                Instruction::UMulH { .. } | Instruction::SMulH { .. } => {}
            }
        }
    }

    #[test]
    fn zero_key() {
        let program = generate([0; 4]);
        assert_invariants(&program);
        assert_eq!(program, generate([0; 4]));
    }

    #[test]
    fn first_instructions_follow_pattern() {
        let program = generate([1, 2, 3, 4]);
        assert_eq!(program.instructions()[0].opcode(), Opcode::Mul);
        assert_eq!(program.instructions()[1].opcode(), Opcode::Target);
    }

    #[test]
    fn display_lists_every_instruction() {
        let program = generate([9, 9, 9, 9]);
        let listing = program.to_string();
        assert_eq!(listing.lines().count(), PROGRAM_SIZE);
        assert!(listing.contains("target:"));
    }

    #[test]
    fn overall_latency_is_checked() {
        // Re-running a generator by hand exposes the schedule it finished with.
        let key = SipState::from_words([5, 6, 7, 8]);
        for salt in 0..32 {
            let mut generator = Generator::new(RandomSource::new(key, salt));
            if let Ok(instructions) = generator.generate_program() {
                assert_eq!(instructions.len(), PROGRAM_SIZE);
                assert_eq!(generator.overall_latency(), 194);
                return;
            }
        }
        panic!("no attempt succeeded");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn generated_programs_hold_invariants(key in any::<[u64; 4]>()) {
            let program = generate(key);
            assert_invariants(&program);
        }

        #[test]
        fn generation_is_deterministic(key in any::<[u64; 4]>()) {
            let key = SipState::from_words(key);
            let a = Program::generate_with_attempts(key, 4);
            let b = Program::generate_with_attempts(key, 4);
            match (a, b) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "attempts diverged"),
            }
        }
    }
}
