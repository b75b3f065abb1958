use crate::{
    config::{BRANCH_MASK_POPCOUNT, PROGRAM_SIZE},
    program::{
        constraints::{
            ConstraintViolation, RegisterWriter, Validator, WriterOp, src_registers_allowed,
        },
        cpu::{InstructionPlan, ProgramSchedule},
        instructions::{Instruction, Opcode},
        model::{OpcodeSelector, Pass, opcode_pair_allowed},
    },
    rand::RandomSource,
    register::{RegisterId, RegisterSet},
};

/// Builds one program from a random stream.
///
/// A generator is used for exactly one attempt, all of its state is thrown away afterwards.
pub(crate) struct Generator {
    rng: RandomSource,
    schedule: ProgramSchedule,
    validator: Validator,
    /// The last opcode the selector produced, kept even if its attempt failed.
    last_selector_result: Option<Opcode>,
}

impl Generator {
    pub(crate) fn new(rng: RandomSource) -> Self {
        Self {
            rng,
            schedule: ProgramSchedule::default(),
            validator: Validator::default(),
            last_selector_result: None,
        }
    }

    /// Generates instructions until the program is full or the schedule runs out,
    /// then runs the whole-program check.
    pub(crate) fn generate_program(&mut self) -> Result<Vec<Instruction>, ConstraintViolation> {
        let mut instructions = Vec::with_capacity(PROGRAM_SIZE);

        while instructions.len() < PROGRAM_SIZE {
            let Ok((instruction, writer)) = self.generate_instruction() else {
                break;
            };

            let advanced = self.commit_instruction_state(instruction, writer);
            instructions.push(instruction);
            if advanced.is_err() {
                break;
            }
        }

        self.validator.check_program(&self.schedule, &instructions)?;
        tracing::debug!(
            instructions = instructions.len(),
            latency = self.schedule.overall_latency(),
            multiplies = self.validator.multiply_count(),
            "program meets every constraint"
        );

        Ok(instructions)
    }

    #[cfg(test)]
    pub(crate) fn overall_latency(&self) -> usize {
        self.schedule.overall_latency()
    }

    /// Tries both passes at the current position, stalling until one succeeds.
    fn generate_instruction(&mut self) -> Result<(Instruction, RegisterWriter), ()> {
        loop {
            if let Ok(result) = self.instruction_gen_attempt(Pass::Original) {
                return Ok(result);
            }
            if let Ok(result) = self.instruction_gen_attempt(Pass::Retry) {
                return Ok(result);
            }

            tracing::trace!(cycle = self.schedule.cycle(), "stall");
            self.schedule.stall()?;
        }
    }

    fn choose_opcode(&mut self, pass: Pass) -> Opcode {
        let selector = OpcodeSelector::for_sub_cycle(self.schedule.sub_cycle(), pass);

        let op = loop {
            let op = selector.apply(&mut self.rng);
            if opcode_pair_allowed(self.last_selector_result, op) {
                break op;
            }
        };

        self.last_selector_result = Some(op);
        op
    }

    fn instruction_gen_attempt(&mut self, pass: Pass) -> Result<(Instruction, RegisterWriter), ()> {
        let op = self.choose_opcode(pass);
        let plan = self.schedule.instruction_plan(op)?;
        let (instruction, writer) = self.choose_instruction_with_opcode_plan(op, pass, &plan)?;
        debug_assert_eq!(instruction.opcode(), op);

        self.schedule.commit(&plan, instruction);
        Ok((instruction, writer))
    }

    fn commit_instruction_state(
        &mut self,
        instruction: Instruction,
        writer: RegisterWriter,
    ) -> Result<(), ()> {
        self.validator.record(instruction, writer);
        if matches!(instruction, Instruction::Target) {
            self.validator.reset_writers();
        }
        self.schedule
            .advance_instruction_stream(instruction.opcode())
    }

    fn select_register(&mut self, options: RegisterSet) -> Result<RegisterId, ()> {
        let index = match options.len() {
            0 => return Err(()),
            1 => 0,
            len => self.rng.next_u32() as usize % len,
        };
        options.nth(index).ok_or(())
    }

    const fn select_constant_weight_bit_mask(&mut self) -> u32 {
        let mut mask = 0_u32;
        while mask.count_ones() < BRANCH_MASK_POPCOUNT {
            mask |= 1 << (self.rng.next_u8() % 32);
        }
        mask
    }

    #[expect(clippy::cast_possible_wrap, reason = "immediates are raw 32-bit values")]
    const fn select_immediate(&mut self) -> i32 {
        self.rng.select_nonzero_u32(u32::MAX) as i32
    }

    fn choose_src_reg(&mut self, op: Opcode, plan: &InstructionPlan) -> Result<RegisterId, ()> {
        let cycle = plan.cycle_issued();
        let available = RegisterSet::all()
            .filter(|reg| self.schedule.register_available(reg, cycle));
        self.select_register(src_registers_allowed(available, op))
    }

    fn choose_dst_reg(
        &mut self,
        op: Opcode,
        pass: Pass,
        writer: RegisterWriter,
        src: Option<RegisterId>,
        plan: &InstructionPlan,
    ) -> Result<RegisterId, ()> {
        let checker = self.validator.destination_allowed(op, pass, writer, src);
        let options = RegisterSet::all().filter(|reg| {
            self.schedule.register_available(reg, plan.cycle_issued()) && checker.check(reg)
        });
        self.select_register(options)
    }

    /// Picks a source, then a destination compatible with a writer tagged by that source.
    fn choose_src_dst_regs(
        &mut self,
        op: Opcode,
        pass: Pass,
        writer_op: WriterOp,
        plan: &InstructionPlan,
    ) -> Result<(RegisterId, RegisterId, RegisterWriter), ()> {
        let src = self.choose_src_reg(op, plan)?;
        let writer = RegisterWriter::with_src(writer_op, src);
        let dst = self.choose_dst_reg(op, pass, writer, Some(src), plan)?;
        Ok((src, dst, writer))
    }

    fn choose_instruction_with_opcode_plan(
        &mut self,
        op: Opcode,
        pass: Pass,
        plan: &InstructionPlan,
    ) -> Result<(Instruction, RegisterWriter), ()> {
        Ok(match op {
            Opcode::Target => (Instruction::Target, RegisterWriter::NONE),

            Opcode::Branch => (
                Instruction::Branch {
                    mask: self.select_constant_weight_bit_mask(),
                },
                RegisterWriter::NONE,
            ),

            Opcode::UMulH | Opcode::SMulH => {
                let writer_op = if matches!(op, Opcode::UMulH) {
                    WriterOp::UMulH
                } else {
                    WriterOp::SMulH
                };
                let writer = RegisterWriter::new(writer_op, self.rng.next_u32());
                let src = self.choose_src_reg(op, plan)?;
                let dst = self.choose_dst_reg(op, pass, writer, Some(src), plan)?;
                let instruction = if matches!(op, Opcode::UMulH) {
                    Instruction::UMulH { dst, src }
                } else {
                    Instruction::SMulH { dst, src }
                };
                (instruction, writer)
            }

            Opcode::Mul => {
                let (src, dst, writer) = self.choose_src_dst_regs(op, pass, WriterOp::Mul, plan)?;
                (Instruction::Mul { dst, src }, writer)
            }

            Opcode::Sub => {
                let (src, dst, writer) =
                    self.choose_src_dst_regs(op, pass, WriterOp::AddSub, plan)?;
                (Instruction::Sub { dst, src }, writer)
            }

            Opcode::Xor => {
                let (src, dst, writer) = self.choose_src_dst_regs(op, pass, WriterOp::Xor, plan)?;
                (Instruction::Xor { dst, src }, writer)
            }

            Opcode::AddShift => {
                let shift = (self.rng.next_u32() & 3) as u8;
                let (src, dst, writer) =
                    self.choose_src_dst_regs(op, pass, WriterOp::AddSub, plan)?;
                (Instruction::AddShift { dst, src, shift }, writer)
            }

            Opcode::AddConst => {
                let writer = RegisterWriter::new(WriterOp::AddConst, 0);
                let imm = self.select_immediate();
                let dst = self.choose_dst_reg(op, pass, writer, None, plan)?;
                (Instruction::AddConst { dst, imm }, writer)
            }

            Opcode::XorConst => {
                let writer = RegisterWriter::new(WriterOp::XorConst, 0);
                let imm = self.select_immediate();
                let dst = self.choose_dst_reg(op, pass, writer, None, plan)?;
                (Instruction::XorConst { dst, imm }, writer)
            }

            Opcode::Rotate => {
                let writer = RegisterWriter::new(WriterOp::Rotate, 0);
                #[expect(clippy::cast_possible_truncation, reason = "masked to 6 bits")]
                let right_rotate = self.rng.select_nonzero_u32(63) as u8;
                let dst = self.choose_dst_reg(op, pass, writer, None, plan)?;
                (Instruction::Rotate { dst, right_rotate }, writer)
            }
        })
    }
}
