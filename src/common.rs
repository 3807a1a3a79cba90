use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde::Serialize;
use std::collections::HashMap;
use strum_macros::Display;

/// EVM revision.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Revision {
    /// The Frontier revision.
    /// The one Ethereum launched with.
    Frontier = 0,

    /// [The Homestead revision.](https://eips.ethereum.org/EIPS/eip-606)
    ///
    /// Carries the combined Homestead-era gas adjustments: CALL family at
    /// 700, SELFDESTRUCT at 5000, EXP at 50 per exponent byte.
    Homestead = 1,

    /// [The Shanghai revision.](https://github.com/ethereum/execution-specs/blob/master/network-upgrades/mainnet-upgrades/shanghai.md)
    Shanghai = 2,
}

impl Revision {
    pub fn iter() -> impl Iterator<Item = Self> {
        [Self::Frontier, Self::Homestead, Self::Shanghai]
            .iter()
            .copied()
    }

    pub const fn len() -> usize {
        Self::Shanghai as usize + 1
    }

    pub const fn latest() -> Self {
        Self::Shanghai
    }

    /// The revision immediately preceding this one, if any.
    pub const fn pred(self) -> Option<Self> {
        match self {
            Self::Frontier => None,
            Self::Homestead => Some(Self::Frontier),
            Self::Shanghai => Some(Self::Homestead),
        }
    }

    pub const fn rules(self) -> ForkRules {
        match self {
            Self::Frontier => ForkRules {
                low_s_only: false,
                create_oog_consumes_all_gas: false,
                initcode_limit: None,
                initcode_word_cost: 0,
                push0: false,
                exp_byte_cost: 10,
            },
            Self::Homestead => ForkRules {
                low_s_only: true,
                create_oog_consumes_all_gas: true,
                initcode_limit: None,
                initcode_word_cost: 0,
                push0: false,
                exp_byte_cost: 50,
            },
            Self::Shanghai => ForkRules {
                low_s_only: true,
                create_oog_consumes_all_gas: true,
                initcode_limit: Some(0xC000),
                initcode_word_cost: 2,
                push0: true,
                exp_byte_cost: 50,
            },
        }
    }
}

/// Rule switches that vary between revisions but are not per-opcode gas
/// table entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkRules {
    /// ECDSA signatures must use the lower half of the curve order.
    pub low_s_only: bool,
    /// Running out of gas while depositing created code consumes all gas of
    /// the creation frame. Without it the creation keeps its gas and leaves
    /// the code empty.
    pub create_oog_consumes_all_gas: bool,
    /// Maximum accepted initcode length.
    pub initcode_limit: Option<usize>,
    /// Gas charged per 32-byte word of initcode on CREATE/CREATE2 and on
    /// creation transactions.
    pub initcode_word_cost: i64,
    /// PUSH0 (0x5F) is a defined instruction.
    pub push0: bool,
    /// EXP surcharge per significant exponent byte.
    pub exp_byte_cost: i64,
}

/// Message status code.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize)]
pub enum StatusCode {
    /// Execution finished with success.
    #[strum(serialize = "success")]
    Success = 0,

    /// Generic execution failure, e.g. a creation address collision.
    #[strum(serialize = "failure")]
    Failure = 1,

    /// Execution terminated with REVERT opcode.
    ///
    /// The amount of gas left MAY be non-zero and return data MAY be
    /// present; all state mutations of the frame are rolled back.
    #[strum(serialize = "revert")]
    Revert = 2,

    /// The execution has run out of gas.
    #[strum(serialize = "out of gas")]
    OutOfGas = 3,

    /// The designated INVALID instruction (0xFE) has been hit.
    #[strum(serialize = "invalid instruction")]
    InvalidInstruction = 4,

    /// An instruction undefined in the current revision has been encountered.
    #[strum(serialize = "undefined instruction")]
    UndefinedInstruction = 5,

    /// The execution has attempted to put more items on the EVM stack
    /// than the limit allows.
    #[strum(serialize = "stack overflow")]
    StackOverflow = 6,

    /// Execution of an opcode has required more items on the EVM stack.
    #[strum(serialize = "stack underflow")]
    StackUnderflow = 7,

    /// Execution has violated the jump destination restrictions.
    #[strum(serialize = "bad jump destination")]
    BadJumpDestination = 8,

    /// Tried to read outside memory bounds.
    ///
    /// An example is RETURNDATACOPY reading past the available buffer.
    #[strum(serialize = "invalid memory access")]
    InvalidMemoryAccess = 9,

    /// Call depth has exceeded the limit.
    #[strum(serialize = "call depth exceeded")]
    CallDepthExceeded = 10,

    /// Tried to execute an operation which is restricted in static mode.
    #[strum(serialize = "static mode violation")]
    StaticModeViolation = 11,

    /// The caller does not have enough funds for value transfer.
    #[strum(serialize = "insufficient balance")]
    InsufficientBalance = 12,
}

impl StatusCode {
    /// Exceptional halts consume all gas of the faulting frame. Revert and
    /// balance/depth failures leave the remaining gas with the caller.
    pub fn consumes_all_gas(self) -> bool {
        !matches!(
            self,
            StatusCode::Success
                | StatusCode::Revert
                | StatusCode::CallDepthExceeded
                | StatusCode::InsufficientBalance
        )
    }
}

/// The kind of call-like instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Call,
    DelegateCall,
    CallCode,
    Create,
    Create2 { salt: H256 },
}

/// The message describing an EVM call,
/// including a zero-depth call from a transaction origin.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// The kind of the call. For zero-depth calls `CallKind::Call` SHOULD be used.
    pub kind: CallKind,

    /// Static call mode.
    pub is_static: bool,

    /// The call depth.
    pub depth: i32,

    /// The amount of gas for message execution.
    pub gas: i64,

    /// The account whose address and storage the frame executes against.
    /// Ignored for creations, where the callee derives the new address.
    pub recipient: Address,

    /// The account whose code runs in the frame. Differs from `recipient`
    /// for CALLCODE and DELEGATECALL.
    pub code_address: Address,

    /// The sender of the message.
    pub sender: Address,

    /// Message input data. Initcode for creations.
    pub input_data: Bytes,

    /// The amount of Ether transferred with the message.
    pub value: U256,
}

/// Output of EVM execution.
#[derive(Clone, Debug, PartialEq)]
pub struct Output {
    /// EVM exited with this status code.
    pub status_code: StatusCode,
    /// How much gas was left after execution.
    pub gas_left: i64,
    /// Output data returned.
    pub output_data: Bytes,
    /// Contract creation address.
    pub create_address: Option<Address>,
}

impl Output {
    pub(crate) fn failure(status_code: StatusCode, gas_left: i64) -> Self {
        Self {
            status_code,
            gas_left,
            output_data: Bytes::new(),
            create_address: None,
        }
    }
}

/// Successful result of a frame, before halt classification is folded in.
#[derive(Clone, Debug, PartialEq)]
pub struct SuccessfulOutput {
    pub reverted: bool,
    pub gas_left: i64,
    pub output_data: Bytes,
}

impl From<SuccessfulOutput> for Output {
    fn from(output: SuccessfulOutput) -> Self {
        Self {
            status_code: if output.reverted {
                StatusCode::Revert
            } else {
                StatusCode::Success
            },
            gas_left: output.gas_left,
            output_data: output.output_data,
            create_address: None,
        }
    }
}

/// Block-level immutable context for a transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct Environment {
    /// The block number.
    pub number: u64,
    /// The block timestamp.
    pub timestamp: u64,
    /// The miner of the block.
    pub coinbase: Address,
    /// The block difficulty.
    pub difficulty: U256,
    /// The block gas limit.
    pub gas_limit: u64,
    /// The block base fee per gas.
    pub base_fee: U256,
    /// The blockchain's ChainID.
    pub chain_id: U256,
    /// Hashes of ancestor blocks, keyed by block number. BLOCKHASH only
    /// consults the 256 most recent.
    pub block_hashes: HashMap<u64, H256>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            number: 0,
            timestamp: 0,
            coinbase: Address::zero(),
            difficulty: U256::zero(),
            gas_limit: 30_000_000,
            base_fee: U256::zero(),
            chain_id: U256::one(),
            block_hashes: HashMap::new(),
        }
    }
}

#[inline]
pub(crate) fn u256_to_address(v: U256) -> Address {
    H256(v.into()).into()
}

#[inline]
pub(crate) fn address_to_u256(v: Address) -> U256 {
    U256::from_big_endian(&v.0)
}
