#![doc = include_str!("../README.md")]

pub use common::{
    CallKind, Environment, ForkRules, Message, Output, Revision, StatusCode, SuccessfulOutput,
};
pub use evm::{create2_address, create_address, Evm, MAX_CALL_DEPTH};
pub use interpreter::AnalyzedCode;
pub use opcode::OpCode;
pub use state::{ExecutionState, Stack};
pub use transaction::{
    apply, intrinsic_gas, signature_s_valid, ExecutionResult, Transaction, ValidationError,
};
pub use world::{Account, LogEntry, Snapshot, WorldState};

mod common;
pub mod differential;
pub mod eips;
mod evm;
pub mod generator;
#[doc(hidden)]
pub mod instructions;
mod interpreter;
pub mod opcode;
mod state;
pub mod transaction;
pub mod util;
mod world;
