//! A model of a 3-port superscalar CPU, used to schedule generated programs.
use crate::{
    config::{NUM_REGISTERS, SCHEDULE_SIZE, SUB_CYCLES_PER_CYCLE, TARGET_CYCLES},
    program::{
        instructions::{Instruction, Opcode},
        model::{MicroOps, latency},
    },
    register::RegisterId,
};

bitflags::bitflags! {
    /// A set of execution ports.
    #[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
    pub(crate) struct ExecutionPorts: u8 {
        const P0 = 0b001;
        const P1 = 0b010;
        const P5 = 0b100;
    }
}

/// The order free ports are tried in.
const PORT_PREFERENCE: [ExecutionPorts; 3] =
    [ExecutionPorts::P5, ExecutionPorts::P0, ExecutionPorts::P1];

/// Represents the ports availability during a single cycle.
#[derive(Debug, Default, Copy, Clone)]
struct CycleSchedule {
    busy: ExecutionPorts,
}

impl CycleSchedule {
    /// Returns the preferred port in `allowed` that is still free this cycle.
    fn space_for_micro_op(self, allowed: ExecutionPorts) -> Option<ExecutionPorts> {
        PORT_PREFERENCE
            .into_iter()
            .find(|port| allowed.contains(*port) && !self.busy.contains(*port))
    }
}

/// Where and when an instruction would issue.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct InstructionPlan {
    cycle: usize,
    ports: ExecutionPorts,
}

impl InstructionPlan {
    pub(crate) const fn cycle_issued(&self) -> usize {
        self.cycle
    }
}

/// Port schedule, register latencies and the instruction stream cursor.
#[derive(Debug)]
pub(crate) struct ProgramSchedule {
    ports_schedule: [CycleSchedule; SCHEDULE_SIZE],
    /// Cycle at which each register's latest value becomes readable.
    register_ready: [usize; NUM_REGISTERS],
    sub_cycle: usize,
}

impl Default for ProgramSchedule {
    fn default() -> Self {
        Self {
            ports_schedule: [CycleSchedule::default(); SCHEDULE_SIZE],
            register_ready: [0; NUM_REGISTERS],
            sub_cycle: 0,
        }
    }
}

impl ProgramSchedule {
    /// The instruction stream position, in sub-cycles.
    pub(crate) const fn sub_cycle(&self) -> usize {
        self.sub_cycle
    }

    /// The instruction stream position, in cycles.
    pub(crate) const fn cycle(&self) -> usize {
        self.sub_cycle / SUB_CYCLES_PER_CYCLE
    }

    /// Moves the instruction stream forward.
    ///
    /// Fails once the stream would reach the target cycle, which ends generation.
    pub(crate) const fn advance(&mut self, sub_cycles: usize) -> Result<(), ()> {
        let sub_cycle = self.sub_cycle + sub_cycles;
        if sub_cycle / SUB_CYCLES_PER_CYCLE < TARGET_CYCLES {
            self.sub_cycle = sub_cycle;
            Ok(())
        } else {
            Err(())
        }
    }

    /// Skips one full cycle without issuing anything.
    pub(crate) const fn stall(&mut self) -> Result<(), ()> {
        self.advance(SUB_CYCLES_PER_CYCLE)
    }

    /// Moves the instruction stream past an instruction with opcode `op`.
    pub(crate) const fn advance_instruction_stream(&mut self, op: Opcode) -> Result<(), ()> {
        self.advance(MicroOps::for_opcode(op).sub_cycles())
    }

    /// Finds the earliest cycle, at or after the current one, where `op` could issue.
    pub(crate) fn instruction_plan(&self, op: Opcode) -> Result<InstructionPlan, ()> {
        self.find_issue_slot(MicroOps::for_opcode(op), self.cycle())
    }

    /// Scans forward from `earliest_cycle` for a cycle with free ports for every micro-op.
    ///
    /// Dual micro-ops must land in the same cycle, on two different ports.
    pub(crate) fn find_issue_slot(
        &self,
        micro_ops: MicroOps,
        earliest_cycle: usize,
    ) -> Result<InstructionPlan, ()> {
        for (cycle, schedule) in self
            .ports_schedule
            .iter()
            .enumerate()
            .skip(earliest_cycle)
        {
            let ports = match micro_ops {
                MicroOps::Single(allowed) => schedule.space_for_micro_op(allowed),
                MicroOps::Dual(first, second) => {
                    schedule.space_for_micro_op(first).and_then(|first_port| {
                        let tentative = CycleSchedule {
                            busy: schedule.busy | first_port,
                        };
                        tentative
                            .space_for_micro_op(second)
                            .map(|second_port| first_port | second_port)
                    })
                }
            };

            if let Some(ports) = ports {
                return Ok(InstructionPlan { cycle, ports });
            }
        }

        Err(())
    }

    /// Is the value in `reg` readable by an instruction issued at `cycle`.
    pub(crate) const fn register_available(&self, reg: RegisterId, cycle: usize) -> bool {
        self.register_ready[reg.index()] <= cycle
    }

    /// Marks the planned ports busy and updates the destination's latency.
    pub(crate) fn commit(&mut self, plan: &InstructionPlan, instruction: Instruction) {
        let schedule = &mut self.ports_schedule[plan.cycle];
        debug_assert!(!schedule.busy.intersects(plan.ports));
        schedule.busy |= plan.ports;

        if let Some(dst) = instruction.dst() {
            self.register_ready[dst.index()] = plan.cycle + latency(instruction.opcode());
        }
    }

    /// The cycle at which every register has its final value.
    pub(crate) fn overall_latency(&self) -> usize {
        self.register_ready
            .iter()
            .copied()
            .max()
            .unwrap_or_default()
    }
}
