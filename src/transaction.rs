use bytes::Bytes;
use ethereum_types::{Address, U256, U512};
use thiserror::Error;
use tracing::{debug, trace};

use crate::common::{CallKind, Environment, Message, Revision, StatusCode};
use crate::evm::{create_address, Evm};
use crate::instructions::memory::num_words;
use crate::world::{LogEntry, WorldState};

/// Gas charged before any bytecode runs.
const TX_BASE_GAS: u64 = 21000;
const TX_CREATE_GAS: u64 = 32000;
const TX_DATA_ZERO_GAS: u64 = 4;
const TX_DATA_NONZERO_GAS: u64 = 16;

/// secp256k1 group order halved; the upper bound for `s` under the low-s
/// rule.
const SECP256K1N_HALF: U256 = U256([
    0xDFE9_2F46_681B_20A0,
    0x5D57_6E73_57A4_501D,
    0xFFFF_FFFF_FFFF_FFFF,
    0x7FFF_FFFF_FFFF_FFFF,
]);

/// A transaction with the sender already recovered from its signature.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub sender: Address,
    /// `None` requests contract creation; `data` is then initcode.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub nonce: u64,
}

/// Rejections raised before any bytecode runs. A rejected transaction has
/// no effect on the world state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("nonce mismatch: account at {expected}, transaction carries {got}")]
    NonceMismatch { expected: u64, got: u64 },

    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: U256, required: U512 },

    #[error("intrinsic gas {intrinsic} exceeds gas limit {gas_limit}")]
    IntrinsicGasTooHigh { intrinsic: u64, gas_limit: u64 },

    #[error("initcode of {length} bytes exceeds limit of {limit}")]
    InitcodeTooLarge { length: usize, limit: usize },
}

/// Outcome of a fully applied transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Gas paid for, after the refund was deducted.
    pub gas_used: u64,
    /// Gas left in the top-level frame, before the refund.
    pub gas_remaining: u64,
    pub return_data: Bytes,
    pub logs: Vec<LogEntry>,
    pub error: Option<StatusCode>,
    pub created_address: Option<Address>,
}

/// Whether a signature `s` value is acceptable under `revision`.
///
/// Signature recovery itself is the business of an external collaborator;
/// only the fork-dependent range rule lives here.
pub fn signature_s_valid(s: U256, revision: Revision) -> bool {
    if s.is_zero() {
        return false;
    }
    if revision.rules().low_s_only {
        s <= SECP256K1N_HALF
    } else {
        true
    }
}

/// `21000 + 4·zero_bytes + 16·nonzero_bytes`, plus the creation surcharges.
pub fn intrinsic_gas(data: &[u8], is_create: bool, revision: Revision) -> u64 {
    let zeros = data.iter().filter(|&&b| b == 0).count() as u64;
    let nonzeros = data.len() as u64 - zeros;

    let mut gas = TX_BASE_GAS + TX_DATA_ZERO_GAS * zeros + TX_DATA_NONZERO_GAS * nonzeros;

    if is_create {
        gas += TX_CREATE_GAS;
        gas += revision.rules().initcode_word_cost as u64 * num_words(data.len()) as u64;
    }

    gas
}

/// Validate and apply `tx` on top of `world`, returning the result and
/// leaving the world updated (or untouched, if validation rejects).
pub fn apply(
    world: &mut WorldState,
    env: &Environment,
    tx: &Transaction,
    revision: Revision,
) -> Result<ExecutionResult, ValidationError> {
    trace!(sender = ?tx.sender, to = ?tx.to, gas_limit = tx.gas_limit, %revision, "applying transaction");

    let is_create = tx.to.is_none();

    let account_nonce = world.nonce_of(tx.sender);
    if account_nonce != tx.nonce {
        return Err(ValidationError::NonceMismatch {
            expected: account_nonce,
            got: tx.nonce,
        });
    }

    if is_create {
        if let Some(limit) = revision.rules().initcode_limit {
            if tx.data.len() > limit {
                return Err(ValidationError::InitcodeTooLarge {
                    length: tx.data.len(),
                    limit,
                });
            }
        }
    }

    let intrinsic = intrinsic_gas(&tx.data, is_create, revision);
    if intrinsic > tx.gas_limit {
        return Err(ValidationError::IntrinsicGasTooHigh {
            intrinsic,
            gas_limit: tx.gas_limit,
        });
    }

    let balance = world.balance_of(tx.sender);
    let required = U256::from(tx.gas_limit).full_mul(tx.gas_price) + U512::from(tx.value);
    if U512::from(balance) < required {
        return Err(ValidationError::InsufficientFunds { balance, required });
    }

    world.begin_transaction();

    let gas_prepaid = U256::from(tx.gas_limit) * tx.gas_price;
    world
        .sub_balance(tx.sender, gas_prepaid)
        .expect("balance checked above");
    world.increment_nonce(tx.sender);

    let frame_gas = (tx.gas_limit - intrinsic) as i64;

    let mut evm = Evm::new(world, env, revision, tx.sender, tx.gas_price);

    let output = if is_create {
        let address = create_address(tx.sender, tx.nonce);
        evm.run_create_at(
            address,
            Message {
                kind: CallKind::Create,
                is_static: false,
                depth: 0,
                gas: frame_gas,
                recipient: address,
                code_address: address,
                sender: tx.sender,
                input_data: tx.data.clone(),
                value: tx.value,
            },
        )
    } else {
        let to = tx.to.expect("checked is_create");
        evm.execute_message(Message {
            kind: CallKind::Call,
            is_static: false,
            depth: 0,
            gas: frame_gas,
            recipient: to,
            code_address: to,
            sender: tx.sender,
            input_data: tx.data.clone(),
            value: tx.value,
        })
    };

    let gas_left = output.gas_left as u64;
    let gas_used_unrefunded = tx.gas_limit - gas_left;

    // A reverted or faulted frame already rolled its refund records back.
    let refund = (world.refund() as u64).min(gas_used_unrefunded / 2);
    let gas_used = gas_used_unrefunded - refund;

    world.add_balance(tx.sender, U256::from(gas_left + refund) * tx.gas_price);
    world.add_balance(env.coinbase, U256::from(gas_used) * tx.gas_price);

    world.destroy_scheduled();

    let logs = if output.status_code == StatusCode::Success {
        world.take_logs()
    } else {
        Vec::new()
    };

    let success = output.status_code == StatusCode::Success;

    debug!(
        status = %output.status_code,
        gas_used,
        refund,
        created = ?output.create_address,
        "transaction applied"
    );

    Ok(ExecutionResult {
        success,
        gas_used,
        gas_remaining: gas_left,
        return_data: output.output_data,
        logs,
        error: (!success).then_some(output.status_code),
        created_address: output.create_address.filter(|_| success),
    })
}
