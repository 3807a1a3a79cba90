use crate::instructions::PROPERTIES;
use crate::opcode::OpCode;
use crate::util::Bytecode;
use ethereum_types::U256;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Candidate-program strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Uniformly random bytes.
    Random,
    /// Structured programs: weighted instructions, PUSH immediates intact,
    /// a proper terminator at the end.
    Grammar,
    /// A fixed catalog of programs built around numeric boundary values.
    Boundary,
    /// Programs that satisfy the stack preconditions of one opcode, invoke
    /// it and return its result.
    OpcodeFocused(OpCode),
    /// Pre-canned sequences stressing arithmetic identities.
    Sequence,
}

/// Values at the edges of common integer widths.
pub const BOUNDARY_VALUES: [U256; 8] = [
    U256([0, 0, 0, 0]),
    U256([1, 0, 0, 0]),
    U256([0xFF, 0, 0, 0]),
    U256([0x100, 0, 0, 0]),
    U256([u64::MAX, 0, 0, 0]),
    U256([0, 1, 0, 0]),
    U256([0, 0, 0, 0x8000_0000_0000_0000]),
    U256([u64::MAX, u64::MAX, u64::MAX, u64::MAX]),
];

const TERMINATORS: [OpCode; 4] = [
    OpCode::STOP,
    OpCode::RETURN,
    OpCode::REVERT,
    OpCode::INVALID,
];

/// Instruction pool for the grammar strategy, weighted towards pushes so
/// that generated programs keep a usable stack.
const GRAMMAR_POOL: &[(u32, &[OpCode])] = &[
    (4, &[OpCode::PUSH1, OpCode::PUSH2, OpCode::PUSH4, OpCode::PUSH32]),
    (
        2,
        &[
            OpCode::ADD,
            OpCode::SUB,
            OpCode::MUL,
            OpCode::DIV,
            OpCode::SDIV,
            OpCode::MOD,
            OpCode::SMOD,
            OpCode::EXP,
            OpCode::SIGNEXTEND,
        ],
    ),
    (
        2,
        &[
            OpCode::LT,
            OpCode::GT,
            OpCode::SLT,
            OpCode::SGT,
            OpCode::EQ,
            OpCode::ISZERO,
            OpCode::AND,
            OpCode::OR,
            OpCode::XOR,
            OpCode::NOT,
        ],
    ),
    (
        1,
        &[OpCode::BYTE, OpCode::SHL, OpCode::SHR, OpCode::SAR],
    ),
    (
        1,
        &[OpCode::DUP1, OpCode::DUP2, OpCode::SWAP1, OpCode::SWAP2],
    ),
    (
        1,
        &[OpCode::MLOAD, OpCode::MSTORE, OpCode::MSTORE8, OpCode::MSIZE],
    ),
    (
        1,
        &[
            OpCode::ADDRESS,
            OpCode::CALLER,
            OpCode::CALLVALUE,
            OpCode::CALLDATASIZE,
            OpCode::GAS,
            OpCode::PC,
            OpCode::POP,
        ],
    ),
];

/// Deterministic, lazy producer of candidate programs.
///
/// For a given `(strategy, seed)` pair the emitted sequence is identical
/// run to run, whatever the consumer does between pulls.
pub struct ProgramGenerator {
    strategy: Strategy,
    rng: StdRng,
    counter: usize,
}

impl ProgramGenerator {
    pub fn new(strategy: Strategy, seed: u64) -> Self {
        Self {
            strategy,
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
        }
    }

    fn random_program(&mut self) -> Vec<u8> {
        let len = self.rng.gen_range(1..=256);
        let mut program = vec![0u8; len];
        self.rng.fill(program.as_mut_slice());
        program
    }

    fn grammar_program(&mut self) -> Vec<u8> {
        let mut b = Bytecode::new();
        let instructions = self.rng.gen_range(1..=48);

        // Estimated stack height; kept within [0, 32] so most programs run
        // deeper than a handful of instructions.
        let mut depth: i32 = 0;

        let total_weight: u32 = GRAMMAR_POOL.iter().map(|(w, _)| w).sum();

        for _ in 0..instructions {
            let mut roll = self.rng.gen_range(0..total_weight);
            let pool = GRAMMAR_POOL
                .iter()
                .find(|(w, _)| {
                    if roll < *w {
                        true
                    } else {
                        roll -= w;
                        false
                    }
                })
                .map(|(_, ops)| *ops)
                .expect("roll below total weight");

            let op = pool[self.rng.gen_range(0..pool.len())];
            let properties = PROPERTIES[op.to_usize()].expect("pool opcode defined");

            if depth < properties.stack_height_required as i32 {
                // Precondition not met; push a filler value instead.
                b = b.pushv(self.rng.gen_range(0u64..=255));
                depth += 1;
                continue;
            }
            if depth + properties.stack_height_change as i32 > 32 {
                b = b.opcode(OpCode::POP);
                depth -= 1;
                continue;
            }

            b = b.opcode(op);
            for _ in 0..op.push_size() {
                b = b.append(&[self.rng.gen::<u8>()]);
            }
            depth += properties.stack_height_change as i32;
        }

        let terminator = TERMINATORS[self.rng.gen_range(0..TERMINATORS.len())];
        if matches!(terminator, OpCode::RETURN | OpCode::REVERT) {
            b = b.pushv(0).pushv(0);
        }
        b.opcode(terminator).build()
    }

    fn boundary_program(&mut self) -> Vec<u8> {
        let value = BOUNDARY_VALUES[self.counter % BOUNDARY_VALUES.len()];
        let variant = (self.counter / BOUNDARY_VALUES.len()) % 4;

        let b = Bytecode::new();
        match variant {
            // Push the value verbatim.
            0 => b.pushv(value),
            // Step just past the boundary.
            1 => b.pushv(1).pushv(value).opcode(OpCode::ADD),
            2 => b.pushv(1).pushv(value).opcode(OpCode::SUB),
            // Wrap it around by doubling.
            _ => b.pushv(2).pushv(value).opcode(OpCode::MUL),
        }
        .ret_top()
        .build()
    }

    fn opcode_focused_program(&mut self, op: OpCode) -> Vec<u8> {
        let properties = match PROPERTIES[op.to_usize()] {
            Some(p) => p,
            None => return vec![op.to_u8()],
        };

        let mut b = Bytecode::new();
        for _ in 0..properties.stack_height_required {
            b = b.pushv(self.rng.gen_range(0u64..=u64::MAX));
        }

        b = b.opcode(op);
        for _ in 0..op.push_size() {
            b = b.append(&[self.rng.gen::<u8>()]);
        }

        if properties.stack_height_change + (properties.stack_height_required as i8) > 0 {
            b.ret_top().build()
        } else {
            b.opcode(OpCode::STOP).build()
        }
    }

    fn sequence_program(&mut self) -> Vec<u8> {
        let a = self.rng.gen_range(0u64..=255);
        let c = self.rng.gen_range(1u64..=255);

        let sequences: [Bytecode; 5] = [
            // (a + b) * c
            Bytecode::new()
                .pushv(a)
                .pushv(a.wrapping_add(1))
                .opcode(OpCode::ADD)
                .pushv(c)
                .opcode(OpCode::MUL),
            // a - a == 0
            Bytecode::new()
                .pushv(a)
                .opcode(OpCode::DUP1)
                .opcode(OpCode::SUB),
            // (a / c) * c + (a % c) == a
            Bytecode::new()
                .pushv(c)
                .pushv(a)
                .opcode(OpCode::DUP2)
                .opcode(OpCode::DUP2)
                .opcode(OpCode::DIV)
                .opcode(OpCode::DUP3)
                .opcode(OpCode::MUL)
                .opcode(OpCode::SWAP2)
                .opcode(OpCode::SWAP1)
                .opcode(OpCode::MOD)
                .opcode(OpCode::ADD),
            // MAX + 1 wraps to zero.
            Bytecode::new()
                .pushv(U256::MAX)
                .pushv(1)
                .opcode(OpCode::ADD),
            // Double negation.
            Bytecode::new()
                .pushv(a)
                .opcode(OpCode::NOT)
                .opcode(OpCode::NOT),
        ];

        let index = self.counter % sequences.len();
        sequences[index].clone().ret_top().build()
    }
}

impl Iterator for ProgramGenerator {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let program = match self.strategy {
            Strategy::Random => self.random_program(),
            Strategy::Grammar => self.grammar_program(),
            Strategy::Boundary => self.boundary_program(),
            Strategy::OpcodeFocused(op) => self.opcode_focused_program(op),
            Strategy::Sequence => self.sequence_program(),
        };
        self.counter += 1;
        Some(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_seed() {
        for strategy in [
            Strategy::Random,
            Strategy::Grammar,
            Strategy::Boundary,
            Strategy::OpcodeFocused(OpCode::ADD),
            Strategy::Sequence,
        ] {
            let a: Vec<_> = ProgramGenerator::new(strategy, 42).take(50).collect();
            let b: Vec<_> = ProgramGenerator::new(strategy, 42).take(50).collect();
            assert_eq!(a, b, "{strategy:?}");

            let c: Vec<_> = ProgramGenerator::new(strategy, 43).take(50).collect();
            if matches!(strategy, Strategy::Random | Strategy::Grammar) {
                assert_ne!(a, c, "{strategy:?}");
            }
        }
    }

    #[test]
    fn grammar_programs_end_with_terminator() {
        for program in ProgramGenerator::new(Strategy::Grammar, 7).take(100) {
            let last = *program.last().unwrap();
            assert!(
                TERMINATORS.iter().any(|t| t.to_u8() == last),
                "program {} lacks terminator",
                hex::encode(&program)
            );
        }
    }

    #[test]
    fn random_length_bounds() {
        for program in ProgramGenerator::new(Strategy::Random, 1).take(200) {
            assert!((1..=256).contains(&program.len()));
        }
    }

    #[test]
    fn opcode_focused_establishes_arity() {
        let program = ProgramGenerator::new(Strategy::OpcodeFocused(OpCode::ADDMOD), 3)
            .next()
            .unwrap();
        // Three pushes precede ADDMOD.
        let pushes = program
            .iter()
            .filter(|&&b| OpCode(b).is_push())
            .count();
        assert!(pushes >= 3);
        assert!(program.contains(&OpCode::ADDMOD.to_u8()));
    }
}
