use crate::common::*;
use crate::evm::Evm;
use crate::instructions::instruction_table::{instruction_table, InstructionTable};
use crate::instructions::{
    arithmetic, bitwise, boolean, call, control, external, memory, stack_manip,
};
use crate::opcode::OpCode;
use crate::state::*;
use bytes::Bytes;
use ethereum_types::U256;

fn check_requirements(
    instruction_table: &InstructionTable,
    state: &mut ExecutionState,
    op: OpCode,
) -> Result<(), StatusCode> {
    let metrics = if let Some(v) = instruction_table[op.to_usize()] {
        v
    } else {
        return Err(StatusCode::UndefinedInstruction);
    };

    state.gas_left -= metrics.gas_cost as i64;
    if state.gas_left < 0 {
        return Err(StatusCode::OutOfGas);
    }

    let stack_size = state.stack.len();
    if stack_size < metrics.stack_height_required.into() {
        return Err(StatusCode::StackUnderflow);
    }
    // No instruction grows the stack by more than one, so overflow can
    // only happen when the stack is already full.
    if metrics.stack_height_change > 0 && stack_size == Stack::limit() {
        return Err(StatusCode::StackOverflow);
    }

    Ok(())
}

/// Positions in a code blob where a jump may land.
///
/// Depends only on the code: a position is valid iff it holds JUMPDEST and
/// is not immediate data of a preceding PUSH.
#[derive(Clone, Debug)]
pub struct JumpdestMap(Vec<bool>);

impl JumpdestMap {
    pub fn contains(&self, dst: U256) -> bool {
        dst < self.0.len().into() && self.0[dst.as_usize()]
    }
}

/// Code with analysis.
#[derive(Clone, Debug)]
pub struct AnalyzedCode {
    jumpdest_map: JumpdestMap,
    code: Bytes,
}

impl AnalyzedCode {
    /// Analyze code and prepare it for execution.
    ///
    /// The code is padded with zeroes and a trailing STOP, so running off
    /// the end halts normally and a truncated PUSH reads zero-extended
    /// immediates.
    pub fn analyze(code: impl AsRef<[u8]>) -> Self {
        let code = code.as_ref();
        let mut jumpdest_map = vec![false; code.len()];

        let mut i = 0;
        while i < code.len() {
            let opcode = OpCode(code[i]);
            if opcode == OpCode::JUMPDEST {
                jumpdest_map[i] = true;
            }
            i += 1 + opcode.push_size();
        }

        let mut padded_code = vec![0_u8; i + 1];
        padded_code[..code.len()].copy_from_slice(code);
        padded_code[i] = OpCode::STOP.to_u8();

        Self {
            jumpdest_map: JumpdestMap(jumpdest_map),
            code: padded_code.into(),
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn jumpdest_map(&self) -> &JumpdestMap {
        &self.jumpdest_map
    }

    /// Execute the analyzed code in a fresh frame for `msg`.
    pub(crate) fn execute(
        &self,
        evm: &mut Evm,
        msg: Message,
    ) -> Result<SuccessfulOutput, StatusCode> {
        let mut state = ExecutionState::new(msg, evm.revision());
        self.run(evm, &mut state)
    }

    fn run(
        &self,
        evm: &mut Evm,
        state: &mut ExecutionState,
    ) -> Result<SuccessfulOutput, StatusCode> {
        let table = instruction_table(state.evm_revision);

        let mut reverted = false;

        let mut pc = 0;

        loop {
            let op = OpCode(self.code[pc]);

            check_requirements(table, state, op)?;

            match op {
                OpCode::STOP => {
                    break;
                }
                OpCode::ADD => {
                    arithmetic::add(&mut state.stack);
                }
                OpCode::MUL => {
                    arithmetic::mul(&mut state.stack);
                }
                OpCode::SUB => {
                    arithmetic::sub(&mut state.stack);
                }
                OpCode::DIV => {
                    arithmetic::div(&mut state.stack);
                }
                OpCode::SDIV => {
                    arithmetic::sdiv(&mut state.stack);
                }
                OpCode::MOD => {
                    arithmetic::modulo(&mut state.stack);
                }
                OpCode::SMOD => {
                    arithmetic::smod(&mut state.stack);
                }
                OpCode::ADDMOD => {
                    arithmetic::addmod(&mut state.stack);
                }
                OpCode::MULMOD => {
                    arithmetic::mulmod(&mut state.stack);
                }
                OpCode::EXP => {
                    arithmetic::exp(state)?;
                }
                OpCode::SIGNEXTEND => {
                    arithmetic::signextend(&mut state.stack);
                }
                OpCode::LT => {
                    boolean::lt(&mut state.stack);
                }
                OpCode::GT => {
                    boolean::gt(&mut state.stack);
                }
                OpCode::SLT => {
                    boolean::slt(&mut state.stack);
                }
                OpCode::SGT => {
                    boolean::sgt(&mut state.stack);
                }
                OpCode::EQ => {
                    boolean::eq(&mut state.stack);
                }
                OpCode::ISZERO => {
                    boolean::iszero(&mut state.stack);
                }
                OpCode::AND => {
                    boolean::and(&mut state.stack);
                }
                OpCode::OR => {
                    boolean::or(&mut state.stack);
                }
                OpCode::XOR => {
                    boolean::xor(&mut state.stack);
                }
                OpCode::NOT => {
                    boolean::not(&mut state.stack);
                }
                OpCode::BYTE => {
                    bitwise::byte(&mut state.stack);
                }
                OpCode::SHL => {
                    bitwise::shl(&mut state.stack);
                }
                OpCode::SHR => {
                    bitwise::shr(&mut state.stack);
                }
                OpCode::SAR => {
                    bitwise::sar(&mut state.stack);
                }

                OpCode::KECCAK256 => {
                    memory::keccak256(state)?;
                }
                OpCode::ADDRESS => {
                    external::address(state);
                }
                OpCode::BALANCE => {
                    external::balance(evm, state);
                }
                OpCode::ORIGIN => {
                    external::origin(evm, state);
                }
                OpCode::CALLER => {
                    external::caller(state);
                }
                OpCode::CALLVALUE => {
                    external::callvalue(state);
                }
                OpCode::CALLDATALOAD => {
                    control::calldataload(state);
                }
                OpCode::CALLDATASIZE => {
                    control::calldatasize(state);
                }
                OpCode::CALLDATACOPY => {
                    memory::calldatacopy(state)?;
                }
                OpCode::CODESIZE => {
                    memory::codesize(&mut state.stack, &self.code);
                }
                OpCode::CODECOPY => {
                    memory::codecopy(state, &self.code)?;
                }
                OpCode::GASPRICE => {
                    external::gasprice(evm, state);
                }
                OpCode::EXTCODESIZE => {
                    external::extcodesize(evm, state);
                }
                OpCode::EXTCODECOPY => {
                    external::extcodecopy(evm, state)?;
                }
                OpCode::RETURNDATASIZE => {
                    memory::returndatasize(state);
                }
                OpCode::RETURNDATACOPY => {
                    memory::returndatacopy(state)?;
                }
                OpCode::EXTCODEHASH => {
                    external::extcodehash(evm, state);
                }
                OpCode::BLOCKHASH => {
                    external::blockhash(evm, state);
                }
                OpCode::COINBASE => {
                    external::coinbase(evm, state);
                }
                OpCode::TIMESTAMP => {
                    external::timestamp(evm, state);
                }
                OpCode::NUMBER => {
                    external::number(evm, state);
                }
                OpCode::DIFFICULTY => {
                    external::difficulty(evm, state);
                }
                OpCode::GASLIMIT => {
                    external::gaslimit(evm, state);
                }
                OpCode::CHAINID => {
                    external::chainid(evm, state);
                }
                OpCode::SELFBALANCE => {
                    external::selfbalance(evm, state);
                }
                OpCode::BASEFEE => {
                    external::basefee(evm, state);
                }
                OpCode::POP => {
                    stack_manip::pop(&mut state.stack);
                }
                OpCode::MLOAD => {
                    memory::mload(state)?;
                }
                OpCode::MSTORE => {
                    memory::mstore(state)?;
                }
                OpCode::MSTORE8 => {
                    memory::mstore8(state)?;
                }
                OpCode::SLOAD => {
                    external::sload(evm, state);
                }
                OpCode::SSTORE => {
                    external::sstore(evm, state)?;
                }
                OpCode::JUMP => {
                    pc = control::op_jump(state, &self.jumpdest_map)?;

                    continue;
                }
                OpCode::JUMPI => {
                    if !state.stack.get(1).is_zero() {
                        pc = control::op_jump(state, &self.jumpdest_map)?;
                        state.stack.pop();

                        continue;
                    } else {
                        state.stack.pop();
                        state.stack.pop();
                    }
                }
                OpCode::PC => state.stack.push(pc.into()),
                OpCode::MSIZE => memory::msize(state),
                OpCode::GAS => state.stack.push(state.gas_left.into()),
                OpCode::JUMPDEST => {}
                OpCode::PUSH0 => {
                    stack_manip::push0(&mut state.stack);
                }

                OpCode::CREATE | OpCode::CREATE2 => {
                    call::do_create(evm, state, op == OpCode::CREATE2)?;
                }
                OpCode::CALL | OpCode::CALLCODE | OpCode::DELEGATECALL | OpCode::STATICCALL => {
                    call::do_call(
                        evm,
                        state,
                        match op {
                            OpCode::CALL | OpCode::STATICCALL => CallKind::Call,
                            OpCode::CALLCODE => CallKind::CallCode,
                            OpCode::DELEGATECALL => CallKind::DelegateCall,
                            _ => unreachable!(),
                        },
                        op == OpCode::STATICCALL,
                    )?;
                }
                OpCode::RETURN | OpCode::REVERT => {
                    control::ret(state)?;
                    reverted = op == OpCode::REVERT;
                    break;
                }
                OpCode::INVALID => {
                    return Err(StatusCode::InvalidInstruction);
                }
                OpCode::SELFDESTRUCT => {
                    external::selfdestruct(evm, state)?;
                    break;
                }

                op if op.is_push() => {
                    let n = op.push_size();
                    stack_manip::push(&mut state.stack, &self.code[pc + 1..], n);
                    pc += n;
                }
                op if (OpCode::DUP1..=OpCode::DUP16).contains(&op) => {
                    stack_manip::dup(
                        &mut state.stack,
                        op.to_usize() - OpCode::DUP1.to_usize() + 1,
                    );
                }
                op if (OpCode::SWAP1..=OpCode::SWAP16).contains(&op) => {
                    stack_manip::swap(
                        &mut state.stack,
                        op.to_usize() - OpCode::SWAP1.to_usize() + 1,
                    );
                }
                op if (OpCode::LOG0..=OpCode::LOG4).contains(&op) => {
                    external::log(evm, state, op.to_usize() - OpCode::LOG0.to_usize())?;
                }

                other => {
                    unreachable!("reached unhandled opcode: {}", other);
                }
            }

            pc += 1;
        }

        let output = SuccessfulOutput {
            reverted,
            gas_left: state.gas_left,
            output_data: state.output_data.clone(),
        };

        Ok(output)
    }
}
