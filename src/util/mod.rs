mod bytecode;
mod tester;

pub use bytecode::{Bytecode, CallInstruction};
pub use tester::EvmTester;
