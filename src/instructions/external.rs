use super::memory::{copy_into_region, verify_memory_region};
use super::properties::{SELFDESTRUCT_REFUND, SSTORE_CLEAR_REFUND, SSTORE_RESET, SSTORE_SET};
use crate::common::{address_to_u256, u256_to_address};
use crate::evm::Evm;
use crate::state::ExecutionState;
use crate::world::LogEntry;
use crate::StatusCode;
use arrayvec::ArrayVec;
use ethereum_types::{H256, U256};
use sha3::{Digest, Keccak256};

pub(crate) fn address(state: &mut ExecutionState) {
    state.stack.push(address_to_u256(state.message.recipient));
}

pub(crate) fn caller(state: &mut ExecutionState) {
    state.stack.push(address_to_u256(state.message.sender));
}

pub(crate) fn callvalue(state: &mut ExecutionState) {
    state.stack.push(state.message.value);
}

pub(crate) fn origin(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(address_to_u256(evm.origin));
}

pub(crate) fn gasprice(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(evm.gas_price);
}

pub(crate) fn coinbase(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(address_to_u256(evm.env.coinbase));
}

pub(crate) fn timestamp(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(evm.env.timestamp.into());
}

pub(crate) fn number(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(evm.env.number.into());
}

pub(crate) fn difficulty(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(evm.env.difficulty);
}

pub(crate) fn gaslimit(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(evm.env.gas_limit.into());
}

pub(crate) fn chainid(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(evm.env.chain_id);
}

pub(crate) fn basefee(evm: &Evm, state: &mut ExecutionState) {
    state.stack.push(evm.env.base_fee);
}

pub(crate) fn selfbalance(evm: &Evm, state: &mut ExecutionState) {
    state
        .stack
        .push(evm.world.balance_of(state.message.recipient));
}

pub(crate) fn balance(evm: &Evm, state: &mut ExecutionState) {
    let address = u256_to_address(state.stack.pop());
    state.stack.push(evm.world.balance_of(address));
}

pub(crate) fn extcodesize(evm: &Evm, state: &mut ExecutionState) {
    let address = u256_to_address(state.stack.pop());
    state.stack.push(evm.world.code_of(address).len().into());
}

pub(crate) fn extcodecopy(evm: &Evm, state: &mut ExecutionState) -> Result<(), StatusCode> {
    let address = u256_to_address(state.stack.pop());
    let mem_index = state.stack.pop();
    let input_index = state.stack.pop();
    let size = state.stack.pop();

    if let Some(region) = verify_memory_region(state, mem_index, size)? {
        let code = evm.world.code_of(address);
        copy_into_region(state, region, &code, input_index)?;
    }

    Ok(())
}

pub(crate) fn extcodehash(evm: &Evm, state: &mut ExecutionState) {
    let address = u256_to_address(state.stack.pop());

    // Empty accounts hash to zero, not to the hash of empty code.
    let hash = if evm.world.is_empty(address) {
        U256::zero()
    } else {
        U256::from_big_endian(&Keccak256::digest(&evm.world.code_of(address)))
    };

    state.stack.push(hash);
}

pub(crate) fn blockhash(evm: &Evm, state: &mut ExecutionState) {
    let number = state.stack.pop();

    let upper_bound = evm.env.number;
    let lower_bound = upper_bound.saturating_sub(256);

    let mut header = H256::zero();
    if number <= u64::MAX.into() {
        let n = number.as_u64();
        if (lower_bound..upper_bound).contains(&n) {
            if let Some(hash) = evm.env.block_hashes.get(&n) {
                header = *hash;
            }
        }
    }

    state.stack.push(U256::from_big_endian(&header.0));
}

pub(crate) fn sload(evm: &Evm, state: &mut ExecutionState) {
    let key = state.stack.pop();
    state
        .stack
        .push(evm.world.sload(state.message.recipient, key));
}

pub(crate) fn sstore(evm: &mut Evm, state: &mut ExecutionState) -> Result<(), StatusCode> {
    if state.message.is_static {
        return Err(StatusCode::StaticModeViolation);
    }

    let key = state.stack.pop();
    let value = state.stack.pop();

    let current = evm.world.sload(state.message.recipient, key);

    let cost = if current.is_zero() && !value.is_zero() {
        SSTORE_SET
    } else {
        SSTORE_RESET
    };
    state.gas_left -= cost;
    if state.gas_left < 0 {
        return Err(StatusCode::OutOfGas);
    }

    if !current.is_zero() && value.is_zero() {
        evm.world.add_refund(SSTORE_CLEAR_REFUND);
    }

    evm.world.sstore(state.message.recipient, key, value);

    Ok(())
}

pub(crate) fn log(
    evm: &mut Evm,
    state: &mut ExecutionState,
    num_topics: usize,
) -> Result<(), StatusCode> {
    if state.message.is_static {
        return Err(StatusCode::StaticModeViolation);
    }

    let offset = state.stack.pop();
    let size = state.stack.pop();

    let region = verify_memory_region(state, offset, size)?;

    if let Some(region) = &region {
        let cost = region.size.get() as i64 * 8;
        state.gas_left -= cost;
        if state.gas_left < 0 {
            return Err(StatusCode::OutOfGas);
        }
    }

    let mut topics = ArrayVec::new();
    for _ in 0..num_topics {
        topics.push(H256(state.stack.pop().into()));
    }

    let data = if let Some(region) = region {
        &state.memory[region.offset..region.offset + region.size.get()]
    } else {
        &[]
    };

    evm.world.emit_log(LogEntry {
        address: state.message.recipient,
        topics,
        data: data.to_vec().into(),
    });

    Ok(())
}

pub(crate) fn selfdestruct(evm: &mut Evm, state: &mut ExecutionState) -> Result<(), StatusCode> {
    if state.message.is_static {
        return Err(StatusCode::StaticModeViolation);
    }

    let beneficiary = u256_to_address(state.stack.pop());
    let address = state.message.recipient;

    let balance = evm.world.balance_of(address);
    evm.world.transfer(address, beneficiary, balance)?;

    if evm.world.schedule_destruct(address) {
        evm.world.add_refund(SELFDESTRUCT_REFUND);
    }

    Ok(())
}
