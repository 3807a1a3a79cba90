use bytes::Bytes;
use ethereum_types::{Address, U256};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use strum_macros::Display;
use tracing::debug;

use crate::common::Revision;
use crate::instructions::{gas_costs, PROPERTIES};
use crate::opcode::OpCode;
use crate::util::{Bytecode, CallInstruction};

/// Account the case bytecode is deployed at.
const TARGET_ADDRESS: Address = Address::repeat_byte(0xAA);
/// Helper account holding probe code for call-context cases.
const PROBE_ADDRESS: Address = Address::repeat_byte(0xBE);
/// Funded originator of every case transaction.
const SENDER_ADDRESS: Address = Address::repeat_byte(0x51);

const DEFAULT_CASE_GAS: u64 = 1_000_000;

/// One catalogued protocol change.
#[derive(Clone, Copy, Debug)]
pub struct EipEntry {
    pub eip_number: u32,
    pub title: &'static str,
    pub introduced_in_fork: Revision,
    pub opcodes_added: &'static [OpCode],
    /// `(subject, before, after)` gas repricings.
    pub gas_changes: &'static [(&'static str, u64, u64)],
    pub semantic_notes: &'static str,
}

pub static EIP_CATALOG: &[EipEntry] = &[
    EipEntry {
        eip_number: 2,
        title: "Homestead hard-fork changes",
        introduced_in_fork: Revision::Homestead,
        opcodes_added: &[],
        gas_changes: &[],
        semantic_notes: "Creation that runs out of gas at code deposit consumes all gas; \
                         transaction signatures must use low s values.",
    },
    EipEntry {
        eip_number: 150,
        title: "Gas cost changes for IO-heavy operations",
        introduced_in_fork: Revision::Homestead,
        opcodes_added: &[],
        gas_changes: &[("CALL", 40, 700), ("SELFDESTRUCT", 0, 5000)],
        semantic_notes: "Historically a Tangerine Whistle change; this codebase folds it \
                         into Homestead, following its source material.",
    },
    EipEntry {
        eip_number: 160,
        title: "EXP cost increase",
        introduced_in_fork: Revision::Homestead,
        opcodes_added: &[],
        gas_changes: &[("EXP per exponent byte", 10, 50)],
        semantic_notes: "Historically a Spurious Dragon change; folded into Homestead here, \
                         following the source material.",
    },
    EipEntry {
        eip_number: 3855,
        title: "PUSH0 instruction",
        introduced_in_fork: Revision::Shanghai,
        opcodes_added: &[OpCode::PUSH0],
        gas_changes: &[],
        semantic_notes: "0x5F pushes the constant zero for 2 gas; undefined before Shanghai.",
    },
    EipEntry {
        eip_number: 3860,
        title: "Limit and meter initcode",
        introduced_in_fork: Revision::Shanghai,
        opcodes_added: &[],
        gas_changes: &[("initcode per word", 0, 2)],
        semantic_notes: "Initcode is capped at 49152 bytes and costs 2 gas per word on \
                         creation transactions, CREATE and CREATE2.",
    },
];

pub fn find_eip(eip_number: u32) -> Option<&'static EipEntry> {
    EIP_CATALOG.iter().find(|e| e.eip_number == eip_number)
}

/// Test-emission strategies.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize)]
pub enum TestStrategy {
    #[strum(serialize = "BOUNDARY")]
    #[serde(rename = "BOUNDARY")]
    Boundary,
    #[strum(serialize = "OPCODE_INTERACTION")]
    #[serde(rename = "OPCODE_INTERACTION")]
    OpcodeInteraction,
    #[strum(serialize = "CALL_CONTEXT")]
    #[serde(rename = "CALL_CONTEXT")]
    CallContext,
    #[strum(serialize = "GAS_EXHAUSTION")]
    #[serde(rename = "GAS_EXHAUSTION")]
    GasExhaustion,
    #[strum(serialize = "FORK_BOUNDARY")]
    #[serde(rename = "FORK_BOUNDARY")]
    ForkBoundary,
    #[strum(serialize = "STACK_DEPTH")]
    #[serde(rename = "STACK_DEPTH")]
    StackDepth,
}

pub const ALL_STRATEGIES: [TestStrategy; 6] = [
    TestStrategy::Boundary,
    TestStrategy::OpcodeInteraction,
    TestStrategy::CallContext,
    TestStrategy::GasExhaustion,
    TestStrategy::ForkBoundary,
    TestStrategy::StackDepth,
];

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// A single generated vector.
#[derive(Clone, Debug, Serialize)]
pub struct TestCase {
    pub name: String,
    pub strategy: TestStrategy,
    #[serde(serialize_with = "serialize_hex")]
    pub bytecode: Vec<u8>,
    pub gas_limit: u64,
    pub expected_success: bool,
    pub expected_gas_used: Option<u64>,
    pub description: String,
    /// Revision the case is meant to run under.
    #[serde(skip)]
    pub revision: Revision,
    /// Extra pre-state accounts (address, code) the case relies on.
    #[serde(skip)]
    pub pre_accounts: Vec<(Address, Bytes)>,
}

/// Boundary substitution values: edges of the common integer widths.
pub fn boundary_values() -> [U256; 10] {
    let two_255 = U256::one() << 255;
    [
        U256::zero(),
        U256::one(),
        U256::from(2),
        U256::from(255),
        U256::from(256),
        U256::from(u32::MAX),
        U256::from(u64::MAX),
        two_255 - 1,
        two_255,
        U256::MAX,
    ]
}

const STATE_MODIFYING: [OpCode; 9] = [
    OpCode::SSTORE,
    OpCode::LOG0,
    OpCode::LOG1,
    OpCode::LOG2,
    OpCode::LOG3,
    OpCode::LOG4,
    OpCode::CREATE,
    OpCode::CREATE2,
    OpCode::SELFDESTRUCT,
];

/// Sum the base gas of a branch-free program, or `None` when any
/// instruction is undefined or carries a dynamic cost component.
pub fn estimate_straight_line_cost(code: &[u8], revision: Revision) -> Option<u64> {
    const DYNAMIC: [OpCode; 22] = [
        OpCode::EXP,
        OpCode::KECCAK256,
        OpCode::CALLDATACOPY,
        OpCode::CODECOPY,
        OpCode::EXTCODECOPY,
        OpCode::RETURNDATACOPY,
        OpCode::MLOAD,
        OpCode::MSTORE,
        OpCode::MSTORE8,
        OpCode::SSTORE,
        OpCode::LOG0,
        OpCode::LOG1,
        OpCode::LOG2,
        OpCode::LOG3,
        OpCode::LOG4,
        OpCode::CALL,
        OpCode::CALLCODE,
        OpCode::DELEGATECALL,
        OpCode::STATICCALL,
        OpCode::CREATE,
        OpCode::CREATE2,
        OpCode::SELFDESTRUCT,
    ];

    let costs = gas_costs(revision);
    let mut total = 0u64;
    let mut i = 0;

    while i < code.len() {
        let op = OpCode(code[i]);
        if DYNAMIC.contains(&op)
            || op == OpCode::JUMP
            || op == OpCode::JUMPI
            || matches!(op, OpCode::RETURN | OpCode::REVERT)
        {
            return None;
        }
        total += costs[op.to_usize()].map(u64::from)?;
        i += 1 + op.push_size();
    }

    Some(total)
}

/// Generate test vectors for one catalogued EIP under the given strategies.
pub fn generate_test_cases(eip: &EipEntry, strategies: &[TestStrategy]) -> Vec<TestCase> {
    let mut cases = Vec::new();

    for &strategy in strategies {
        match strategy {
            TestStrategy::Boundary => boundary_cases(eip, &mut cases),
            TestStrategy::OpcodeInteraction => opcode_interaction_cases(eip, &mut cases),
            TestStrategy::CallContext => call_context_cases(eip, &mut cases),
            TestStrategy::GasExhaustion => gas_exhaustion_cases(eip, &mut cases),
            TestStrategy::ForkBoundary => fork_boundary_cases(eip, &mut cases),
            TestStrategy::StackDepth => stack_depth_cases(eip, &mut cases),
        }
    }

    debug!(eip = eip.eip_number, count = cases.len(), "generated test cases");

    cases
}

fn tx_gas(code: &[u8], revision: Revision) -> Option<u64> {
    estimate_straight_line_cost(code, revision).map(|c| c + 21000)
}

fn straight_line_case(
    eip: &EipEntry,
    name: String,
    strategy: TestStrategy,
    code: Vec<u8>,
    description: String,
) -> TestCase {
    let revision = eip.introduced_in_fork;
    TestCase {
        expected_gas_used: tx_gas(&code, revision),
        name,
        strategy,
        bytecode: code,
        gas_limit: DEFAULT_CASE_GAS,
        expected_success: true,
        description,
        revision,
        pre_accounts: Vec::new(),
    }
}

fn boundary_cases(eip: &EipEntry, cases: &mut Vec<TestCase>) {
    for (i, value) in boundary_values().into_iter().enumerate() {
        let code = if let Some(&op) = eip.opcodes_added.first() {
            let required = PROPERTIES[op.to_usize()]
                .map(|p| p.stack_height_required)
                .unwrap_or(0);
            let mut b = Bytecode::new();
            for _ in 0..required.max(1) {
                b = b.pushv(value);
            }
            b.opcode(op).opcode(OpCode::STOP).build()
        } else {
            // No new opcode: exercise plain arithmetic around the value.
            Bytecode::new()
                .pushv(1)
                .pushv(value)
                .opcode(OpCode::ADD)
                .opcode(OpCode::POP)
                .opcode(OpCode::STOP)
                .build()
        };

        cases.push(straight_line_case(
            eip,
            format!("eip{}_boundary_{}", eip.eip_number, i),
            TestStrategy::Boundary,
            code,
            format!("boundary value {value} substituted into EIP-{}", eip.eip_number),
        ));
    }
}

fn opcode_interaction_cases(eip: &EipEntry, cases: &mut Vec<TestCase>) {
    for &op in eip.opcodes_added {
        let variants: [(&str, Bytecode); 4] = [
            (
                "dup",
                Bytecode::new().opcode(op).opcode(OpCode::DUP1).opcode(OpCode::STOP),
            ),
            (
                "swap",
                Bytecode::new()
                    .opcode(op)
                    .pushv(1)
                    .opcode(OpCode::SWAP1)
                    .opcode(OpCode::STOP),
            ),
            (
                "mstore",
                Bytecode::new()
                    .opcode(op)
                    .pushv(0)
                    .opcode(OpCode::MSTORE)
                    .opcode(OpCode::STOP),
            ),
            (
                // Result as the JUMPI condition; the destination follows the
                // STOP so a taken branch still lands on a JUMPDEST.
                "jumpi",
                Bytecode::new()
                    .opcode(op)
                    .pushv(5)
                    .opcode(OpCode::JUMPI)
                    .opcode(OpCode::STOP)
                    .opcode(OpCode::JUMPDEST)
                    .opcode(OpCode::STOP),
            ),
        ];

        for (label, code) in variants {
            let code = code.build();
            cases.push(TestCase {
                name: format!("eip{}_{}_{}", eip.eip_number, op_label(op), label),
                strategy: TestStrategy::OpcodeInteraction,
                expected_gas_used: tx_gas(&code, eip.introduced_in_fork),
                bytecode: code,
                gas_limit: DEFAULT_CASE_GAS,
                expected_success: true,
                description: format!("{op} result consumed by {label}"),
                revision: eip.introduced_in_fork,
                pre_accounts: Vec::new(),
            });
        }
    }
}

fn call_context_cases(eip: &EipEntry, cases: &mut Vec<TestCase>) {
    for &op in eip.opcodes_added {
        let probe: Bytes = Bytecode::new().opcode(op).opcode(OpCode::STOP).build().into();
        let non_modifying = !STATE_MODIFYING.contains(&op);

        let direct = Bytecode::new().opcode(op).opcode(OpCode::STOP).build();
        cases.push(TestCase {
            name: format!("eip{}_{}_direct", eip.eip_number, op_label(op)),
            strategy: TestStrategy::CallContext,
            expected_gas_used: tx_gas(&direct, eip.introduced_in_fork),
            bytecode: direct,
            gas_limit: DEFAULT_CASE_GAS,
            expected_success: true,
            description: format!("{op} executed directly"),
            revision: eip.introduced_in_fork,
            pre_accounts: Vec::new(),
        });

        let contexts: [(&str, CallInstruction, bool); 3] = [
            (
                "call",
                CallInstruction::call(crate::common::address_to_u256(PROBE_ADDRESS)).gas(100_000),
                true,
            ),
            (
                "delegatecall",
                CallInstruction::delegatecall(crate::common::address_to_u256(PROBE_ADDRESS))
                    .gas(100_000),
                true,
            ),
            (
                "staticcall",
                CallInstruction::staticcall(crate::common::address_to_u256(PROBE_ADDRESS))
                    .gas(100_000),
                non_modifying,
            ),
        ];

        for (label, call, expected_success) in contexts {
            // Propagate the sub-call's status: a zero flag jumps to INVALID,
            // so the transaction outcome mirrors the wrapped execution.
            let base: Bytecode = call.into();
            let dest = base.len() + 5;
            let code = base
                .opcode(OpCode::ISZERO)
                .pushb(&[dest as u8])
                .opcode(OpCode::JUMPI)
                .opcode(OpCode::STOP)
                .opcode(OpCode::JUMPDEST)
                .opcode(OpCode::INVALID)
                .build();

            cases.push(TestCase {
                name: format!("eip{}_{}_{}", eip.eip_number, op_label(op), label),
                strategy: TestStrategy::CallContext,
                bytecode: code,
                gas_limit: DEFAULT_CASE_GAS,
                expected_success,
                expected_gas_used: None,
                description: format!("{op} wrapped in {label}"),
                revision: eip.introduced_in_fork,
                pre_accounts: vec![(PROBE_ADDRESS, probe.clone())],
            });
        }
    }
}

fn gas_exhaustion_cases(eip: &EipEntry, cases: &mut Vec<TestCase>) {
    for &op in eip.opcodes_added {
        let code = Bytecode::new().opcode(op).opcode(OpCode::STOP).build();
        let exact = match tx_gas(&code, eip.introduced_in_fork) {
            Some(g) => g,
            None => continue,
        };

        cases.push(TestCase {
            name: format!("eip{}_{}_exact_gas", eip.eip_number, op_label(op)),
            strategy: TestStrategy::GasExhaustion,
            bytecode: code.clone(),
            gas_limit: exact,
            expected_success: true,
            expected_gas_used: Some(exact),
            description: format!("{op} with exactly enough gas"),
            revision: eip.introduced_in_fork,
            pre_accounts: Vec::new(),
        });

        cases.push(TestCase {
            name: format!("eip{}_{}_one_short", eip.eip_number, op_label(op)),
            strategy: TestStrategy::GasExhaustion,
            bytecode: code,
            gas_limit: exact - 1,
            expected_success: false,
            expected_gas_used: Some(exact - 1),
            description: format!("{op} one gas short of the requirement"),
            revision: eip.introduced_in_fork,
            pre_accounts: Vec::new(),
        });

        // JUMPDEST op POP PUSH1 0 JUMP: spin until the gas runs out.
        let eats_stack = PROPERTIES[op.to_usize()]
            .map(|p| p.stack_height_change > 0)
            .unwrap_or(false);
        let mut b = Bytecode::new().opcode(OpCode::JUMPDEST).opcode(op);
        if eats_stack {
            b = b.opcode(OpCode::POP);
        }
        let loop_code = b.jump(0).build();

        cases.push(TestCase {
            name: format!("eip{}_{}_oog_loop", eip.eip_number, op_label(op)),
            strategy: TestStrategy::GasExhaustion,
            bytecode: loop_code,
            gas_limit: 100_000,
            expected_success: false,
            expected_gas_used: Some(100_000),
            description: format!("{op} looped until out of gas"),
            revision: eip.introduced_in_fork,
            pre_accounts: Vec::new(),
        });
    }
}

fn fork_boundary_cases(eip: &EipEntry, cases: &mut Vec<TestCase>) {
    for &op in eip.opcodes_added {
        let code = Bytecode::new().opcode(op).opcode(OpCode::STOP).build();

        if let Some(pred) = eip.introduced_in_fork.pred() {
            cases.push(TestCase {
                name: format!("eip{}_{}_pre_fork", eip.eip_number, op_label(op)),
                strategy: TestStrategy::ForkBoundary,
                bytecode: code.clone(),
                gas_limit: DEFAULT_CASE_GAS,
                expected_success: false,
                // An undefined instruction consumes everything.
                expected_gas_used: Some(DEFAULT_CASE_GAS),
                description: format!("{op} under {pred}, before its introduction"),
                revision: pred,
                pre_accounts: Vec::new(),
            });
        }

        cases.push(TestCase {
            name: format!("eip{}_{}_at_fork", eip.eip_number, op_label(op)),
            strategy: TestStrategy::ForkBoundary,
            expected_gas_used: tx_gas(&code, eip.introduced_in_fork),
            bytecode: code,
            gas_limit: DEFAULT_CASE_GAS,
            expected_success: true,
            description: format!("{op} under {}, where it is defined", eip.introduced_in_fork),
            revision: eip.introduced_in_fork,
            pre_accounts: Vec::new(),
        });
    }
}

fn stack_depth_cases(eip: &EipEntry, cases: &mut Vec<TestCase>) {
    for &op in eip.opcodes_added {
        let pushes_result = PROPERTIES[op.to_usize()]
            .map(|p| p.stack_height_change > 0)
            .unwrap_or(false);

        for (prefill, ok_at_limit) in [(1023usize, true), (1024usize, !pushes_result)] {
            let code = Bytecode::new().pushv(0).repeat(prefill)
                .opcode(op)
                .opcode(OpCode::STOP)
                .build();

            cases.push(TestCase {
                name: format!(
                    "eip{}_{}_depth_{}",
                    eip.eip_number,
                    op_label(op),
                    prefill
                ),
                strategy: TestStrategy::StackDepth,
                expected_gas_used: if ok_at_limit {
                    tx_gas(&code, eip.introduced_in_fork)
                } else {
                    Some(DEFAULT_CASE_GAS)
                },
                bytecode: code,
                gas_limit: DEFAULT_CASE_GAS,
                expected_success: ok_at_limit,
                description: format!("{op} on a stack prefilled to {prefill}"),
                revision: eip.introduced_in_fork,
                pre_accounts: Vec::new(),
            });
        }
    }
}

fn op_label(op: OpCode) -> String {
    op.name()
        .map(|n| n.to_ascii_lowercase())
        .unwrap_or_else(|| format!("op{:02x}", op.to_u8()))
}

/// Top level of the native fixture layout.
#[derive(Clone, Debug, Serialize)]
pub struct NativeFixture {
    pub eip_number: u32,
    pub eip_title: String,
    pub generated_at: u64,
    pub test_cases: Vec<TestCase>,
}

pub fn native_fixture(eip: &EipEntry, test_cases: Vec<TestCase>) -> NativeFixture {
    NativeFixture {
        eip_number: eip.eip_number,
        eip_title: eip.title.to_string(),
        generated_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        test_cases,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EcosystemEnv {
    #[serde(rename = "currentNumber")]
    pub current_number: String,
    #[serde(rename = "currentGasLimit")]
    pub current_gas_limit: String,
    #[serde(rename = "currentTimestamp")]
    pub current_timestamp: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EcosystemAccount {
    pub balance: String,
    pub code: String,
    pub nonce: String,
    pub storage: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EcosystemTransaction {
    pub to: String,
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    pub data: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EcosystemCase {
    pub env: EcosystemEnv,
    pub pre: BTreeMap<String, EcosystemAccount>,
    pub transaction: EcosystemTransaction,
}

fn hex_u64(v: u64) -> String {
    format!("0x{v:x}")
}

fn hex_u256(v: U256) -> String {
    format!("0x{v:x}")
}

fn hex_bytes(b: &[u8]) -> String {
    format!("0x{}", hex::encode(b))
}

fn hex_address(a: Address) -> String {
    format!("0x{}", hex::encode(a.0))
}

/// Render cases in the Ethereum-ecosystem fixture layout, keyed by case
/// name.
pub fn ecosystem_fixture(test_cases: &[TestCase]) -> BTreeMap<String, EcosystemCase> {
    test_cases
        .iter()
        .map(|case| {
            let mut pre = BTreeMap::new();

            pre.insert(
                hex_address(SENDER_ADDRESS),
                EcosystemAccount {
                    balance: hex_u256(U256::exp10(18)),
                    code: "0x".to_string(),
                    nonce: "0x0".to_string(),
                    storage: BTreeMap::new(),
                },
            );

            pre.insert(
                hex_address(TARGET_ADDRESS),
                EcosystemAccount {
                    balance: "0x0".to_string(),
                    code: hex_bytes(&case.bytecode),
                    nonce: "0x1".to_string(),
                    storage: BTreeMap::new(),
                },
            );

            for (address, code) in &case.pre_accounts {
                pre.insert(
                    hex_address(*address),
                    EcosystemAccount {
                        balance: "0x0".to_string(),
                        code: hex_bytes(code),
                        nonce: "0x1".to_string(),
                        storage: BTreeMap::new(),
                    },
                );
            }

            (
                case.name.clone(),
                EcosystemCase {
                    env: EcosystemEnv {
                        current_number: "0x0".to_string(),
                        current_gas_limit: hex_u64(30_000_000),
                        current_timestamp: "0x0".to_string(),
                    },
                    pre,
                    transaction: EcosystemTransaction {
                        to: hex_address(TARGET_ADDRESS),
                        gas_limit: hex_u64(case.gas_limit),
                        data: "0x".to_string(),
                    },
                },
            )
        })
        .collect()
}

/// The addresses every emitted case revolves around, for consumers that
/// replay fixtures.
pub fn fixture_addresses() -> (Address, Address, Address) {
    (SENDER_ADDRESS, TARGET_ADDRESS, PROBE_ADDRESS)
}

/// UTF-8 JSON rendering of the native fixture.
pub fn native_fixture_json(fixture: &NativeFixture) -> serde_json::Result<String> {
    serde_json::to_string_pretty(fixture)
}

/// UTF-8 JSON rendering of the ecosystem fixture.
pub fn ecosystem_fixture_json(
    fixture: &BTreeMap<String, EcosystemCase>,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(fixture)
}
