use super::memory::{self, num_words, MemoryRegion};
use super::properties::{CALL_NEW_ACCOUNT_COST, CALL_STIPEND, CALL_VALUE_COST};
use crate::common::{u256_to_address, CallKind, Message};
use crate::evm::Evm;
use crate::state::ExecutionState;
use crate::{Revision, StatusCode};
use bytes::Bytes;
use ethereum_types::{H256, U256};
use std::cmp::min;

pub(crate) fn do_call(
    evm: &mut Evm,
    state: &mut ExecutionState,
    kind: CallKind,
    is_static_call: bool,
) -> Result<(), StatusCode> {
    let gas = state.stack.pop();
    let dst = u256_to_address(state.stack.pop());
    let value = if is_static_call || matches!(kind, CallKind::DelegateCall) {
        U256::zero()
    } else {
        state.stack.pop()
    };
    let has_value = !value.is_zero();
    let input_offset = state.stack.pop();
    let input_size = state.stack.pop();
    let output_offset = state.stack.pop();
    let output_size = state.stack.pop();

    // Assume failure.
    state.stack.push(U256::zero());

    let input_region = memory::verify_memory_region(state, input_offset, input_size)?;

    let mut msg = Message {
        kind,
        is_static: is_static_call || state.message.is_static,
        depth: state.message.depth + 1,
        recipient: if matches!(kind, CallKind::Call) {
            dst
        } else {
            // CALLCODE and DELEGATECALL run foreign code against own
            // address and storage.
            state.message.recipient
        },
        code_address: dst,
        sender: if matches!(kind, CallKind::DelegateCall) {
            state.message.sender
        } else {
            state.message.recipient
        },
        gas: i64::MAX,
        value: if matches!(kind, CallKind::DelegateCall) {
            state.message.value
        } else {
            value
        },
        input_data: input_region
            .as_ref()
            .map(|&MemoryRegion { offset, size }| {
                state.memory[offset..offset + size.get()].to_vec().into()
            })
            .unwrap_or_default(),
    };

    let output_region = memory::verify_memory_region(state, output_offset, output_size)?;

    let mut cost = if has_value { CALL_VALUE_COST } else { 0 };

    if matches!(kind, CallKind::Call) {
        if has_value && state.message.is_static {
            return Err(StatusCode::StaticModeViolation);
        }

        if has_value && evm.world.is_empty(dst) {
            cost += CALL_NEW_ACCOUNT_COST;
        }
    }
    state.gas_left -= cost;
    if state.gas_left < 0 {
        return Err(StatusCode::OutOfGas);
    }

    if gas < U256::from(i64::MAX as u64) {
        msg.gas = gas.as_u64() as i64;
    }

    if state.evm_revision >= Revision::Homestead {
        // All but one 64th.
        msg.gas = min(msg.gas, state.gas_left - state.gas_left / 64);
    } else if msg.gas > state.gas_left {
        return Err(StatusCode::OutOfGas);
    }

    if has_value {
        // Add stipend.
        msg.gas += CALL_STIPEND;
        state.gas_left += CALL_STIPEND;
    }

    state.return_data.clear();

    // The depth limit is enforced by `Evm::execute_message` itself, which
    // returns the forwarded gas untouched.
    if !(has_value && evm.world.balance_of(state.message.recipient) < value) {
        let msg_gas = msg.gas;
        let result = evm.execute_message(msg);

        state.return_data = result.output_data.clone();
        if result.status_code == StatusCode::Success {
            *state.stack.get_mut(0) = U256::one();
        }

        if let Some(MemoryRegion { offset, size }) = output_region {
            let copy_size = min(size.get(), result.output_data.len());
            if copy_size > 0 {
                state.memory[offset..offset + copy_size]
                    .copy_from_slice(&result.output_data[..copy_size]);
            }
        }

        let gas_used = msg_gas - result.gas_left;
        state.gas_left -= gas_used;
    }

    Ok(())
}

pub(crate) fn do_create(
    evm: &mut Evm,
    state: &mut ExecutionState,
    create2: bool,
) -> Result<(), StatusCode> {
    if state.message.is_static {
        return Err(StatusCode::StaticModeViolation);
    }

    let endowment = state.stack.pop();
    let init_code_offset = state.stack.pop();
    let init_code_size = state.stack.pop();

    let region = memory::verify_memory_region(state, init_code_offset, init_code_size)?;

    let rules = state.evm_revision.rules();
    if let Some(region) = &region {
        if let Some(limit) = rules.initcode_limit {
            if region.size.get() > limit {
                return Err(StatusCode::OutOfGas);
            }
        }

        let initcode_cost = rules.initcode_word_cost * num_words(region.size.get());
        state.gas_left -= initcode_cost;
        if state.gas_left < 0 {
            return Err(StatusCode::OutOfGas);
        }
    }

    let kind = if create2 {
        let salt = state.stack.pop();

        if let Some(region) = &region {
            // Hashing the initcode for the address derivation.
            let salt_cost = num_words(region.size.get()) * 6;
            state.gas_left -= salt_cost;
            if state.gas_left < 0 {
                return Err(StatusCode::OutOfGas);
            }
        }

        CallKind::Create2 {
            salt: H256(salt.into()),
        }
    } else {
        CallKind::Create
    };

    state.stack.push(U256::zero());
    state.return_data.clear();

    if !(!endowment.is_zero() && evm.world.balance_of(state.message.recipient) < endowment) {
        let msg = Message {
            kind,
            is_static: false,
            depth: state.message.depth + 1,
            gas: if state.evm_revision >= Revision::Homestead {
                state.gas_left - state.gas_left / 64
            } else {
                state.gas_left
            },
            recipient: state.message.recipient,
            code_address: state.message.recipient,
            sender: state.message.recipient,
            input_data: region
                .map(|MemoryRegion { offset, size }| {
                    state.memory[offset..offset + size.get()].to_vec().into()
                })
                .unwrap_or_else(Bytes::new),
            value: endowment,
        };

        let msg_gas = msg.gas;
        let result = evm.execute_create(msg);
        state.gas_left -= msg_gas - result.gas_left;

        state.return_data = result.output_data;
        if result.status_code == StatusCode::Success {
            *state.stack.get_mut(0) =
                crate::common::address_to_u256(result.create_address.expect("created address"));
        }
    }

    Ok(())
}
