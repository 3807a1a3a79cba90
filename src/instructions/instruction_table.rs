use crate::instructions::properties::{gas_costs, PROPERTIES};
use crate::Revision;
use once_cell::sync::Lazy;

/// Everything dispatch needs to know about one opcode under one revision:
/// its base cost and its stack arity. The stack delta is kept signed so
/// the overflow check can be derived at dispatch and the generator's depth
/// bookkeeping reads the same numbers.
#[derive(Clone, Copy, Debug)]
pub struct InstructionTableEntry {
    pub gas_cost: u16,
    pub stack_height_required: u8,
    pub stack_height_change: i8,
}

/// One merged dispatch table; `None` marks an undefined byte.
pub type InstructionTable = [Option<InstructionTableEntry>; 256];

fn build(revision: Revision) -> InstructionTable {
    let costs = gas_costs(revision);
    let mut table = [None; 256];

    for opcode in 0..=0xFF {
        // An opcode is live under a revision iff it is priced there; the
        // arity side is revision-independent.
        let (cost, properties) = match (costs[opcode], PROPERTIES[opcode]) {
            (Some(cost), Some(properties)) => (cost, properties),
            _ => continue,
        };

        table[opcode] = Some(InstructionTableEntry {
            gas_cost: cost,
            stack_height_required: properties.stack_height_required,
            stack_height_change: properties.stack_height_change,
        });
    }

    table
}

static TABLES: Lazy<[InstructionTable; Revision::len()]> = Lazy::new(|| {
    [
        build(Revision::Frontier),
        build(Revision::Homestead),
        build(Revision::Shanghai),
    ]
});

pub fn instruction_table(revision: Revision) -> &'static InstructionTable {
    &TABLES[revision as usize]
}
