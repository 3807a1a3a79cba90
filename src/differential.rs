use bytes::Bytes;
use ethereum_types::{Address, U256};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tracing::{debug, info};

use crate::common::{Environment, Revision};
use crate::opcode::OpCode;
use crate::transaction::{apply, Transaction};
use crate::world::{Account, LogEntry, WorldState};

/// Account the candidate program is deployed at.
const CANDIDATE_ADDRESS: Address = Address::repeat_byte(0xCD);
/// Funded account all candidate transactions originate from.
const SENDER_ADDRESS: Address = Address::repeat_byte(0x51);

const CANDIDATE_GAS_LIMIT: u64 = 1_000_000;

/// The first observed disagreement between two runs of one program.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum DivergenceKind {
    #[strum(serialize = "success mismatch")]
    SuccessMismatch,
    #[strum(serialize = "return data mismatch")]
    ReturnDataMismatch,
    #[strum(serialize = "gas mismatch")]
    GasMismatch,
    #[strum(serialize = "logs mismatch")]
    LogsMismatch,
    #[strum(serialize = "state mismatch")]
    StateMismatch,
}

/// Post-state of one account, projected for comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSummary {
    pub balance: U256,
    pub nonce: u64,
    pub code: Bytes,
    pub storage: BTreeMap<U256, U256>,
}

/// Observables of a single run of a candidate under one revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub revision: Revision,
    pub success: bool,
    pub gas_used: u64,
    pub return_data: Bytes,
    pub logs: Vec<LogEntry>,
    pub state: BTreeMap<Address, AccountSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    pub kind: DivergenceKind,
    pub first: RunSummary,
    pub second: RunSummary,
}

/// Outcome of one candidate. A blown wall-clock budget is reported apart,
/// not as a bug.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffOutcome {
    Agreement,
    Diverged(Divergence),
    Timeout,
}

/// A divergence predicate: differences in `kinds` (empty: any kind) for
/// programs touching `opcodes` are explained by the rule change at
/// `boundary` when the compared revisions straddle it.
#[derive(Clone, Copy, Debug)]
pub struct ExpectedDivergence {
    pub boundary: Revision,
    pub opcodes: &'static [OpCode],
    pub kinds: &'static [DivergenceKind],
    pub rule: &'static str,
}

/// The documented fork-boundary rule changes. Anything not explained here
/// is signal.
pub static EXPECTED_DIVERGENCES: &[ExpectedDivergence] = &[
    ExpectedDivergence {
        boundary: Revision::Shanghai,
        opcodes: &[OpCode::PUSH0],
        kinds: &[],
        rule: "PUSH0 is only defined from Shanghai",
    },
    ExpectedDivergence {
        boundary: Revision::Homestead,
        opcodes: &[OpCode::CREATE, OpCode::CREATE2],
        kinds: &[],
        rule: "creation out-of-gas consumes all gas from Homestead",
    },
    ExpectedDivergence {
        boundary: Revision::Shanghai,
        opcodes: &[OpCode::CREATE, OpCode::CREATE2],
        kinds: &[],
        rule: "initcode is metered and size-capped from Shanghai",
    },
    ExpectedDivergence {
        boundary: Revision::Homestead,
        opcodes: &[OpCode::EXP],
        kinds: &[],
        rule: "EXP per-byte cost raised from 10 to 50 in Homestead",
    },
    ExpectedDivergence {
        boundary: Revision::Homestead,
        opcodes: &[
            OpCode::CALL,
            OpCode::CALLCODE,
            OpCode::DELEGATECALL,
            OpCode::STATICCALL,
        ],
        kinds: &[],
        rule: "CALL-family base cost raised to 700 in Homestead",
    },
    ExpectedDivergence {
        boundary: Revision::Homestead,
        opcodes: &[OpCode::SELFDESTRUCT],
        kinds: &[],
        rule: "SELFDESTRUCT cost raised to 5000 in Homestead",
    },
];

/// Whether `code` contains any of `opcodes` as an instruction (PUSH
/// immediates are skipped).
pub fn code_uses_opcode(code: &[u8], opcodes: &[OpCode]) -> bool {
    let mut i = 0;
    while i < code.len() {
        let op = OpCode(code[i]);
        if opcodes.contains(&op) {
            return true;
        }
        i += 1 + op.push_size();
    }
    false
}

/// Runs candidate programs under two revisions with identical initial
/// state and classifies disagreements.
#[derive(Clone, Debug)]
pub struct DifferentialExecutor {
    first: Revision,
    second: Revision,
    gas_limit: u64,
    /// Per-candidate wall-clock budget.
    budget: Duration,
}

impl DifferentialExecutor {
    pub fn new(first: Revision, second: Revision) -> Self {
        Self {
            first,
            second,
            gas_limit: CANDIDATE_GAS_LIMIT,
            budget: Duration::from_millis(500),
        }
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    fn run_one(&self, code: &[u8], revision: Revision) -> RunSummary {
        let mut world = WorldState::new();
        world.insert_account(
            SENDER_ADDRESS,
            Account {
                nonce: 0,
                balance: U256::exp10(18),
                code: Bytes::new(),
                storage: Default::default(),
            },
        );
        world.insert_account(
            CANDIDATE_ADDRESS,
            Account {
                nonce: 1,
                balance: U256::zero(),
                code: code.to_vec().into(),
                storage: Default::default(),
            },
        );

        let env = Environment::default();

        // Gas price zero keeps fee flows out of the state comparison.
        let tx = Transaction {
            sender: SENDER_ADDRESS,
            to: Some(CANDIDATE_ADDRESS),
            value: U256::zero(),
            data: Bytes::new(),
            gas_limit: self.gas_limit,
            gas_price: U256::zero(),
            nonce: 0,
        };

        let result = apply(&mut world, &env, &tx, revision).expect("candidate tx is always valid");

        let state = world
            .accounts()
            .iter()
            .filter(|(_, account)| !account.is_empty())
            .map(|(&address, account)| {
                (
                    address,
                    AccountSummary {
                        balance: account.balance,
                        nonce: account.nonce,
                        code: account.code.clone(),
                        storage: account.storage.iter().map(|(&k, &v)| (k, v)).collect(),
                    },
                )
            })
            .collect();

        RunSummary {
            revision,
            success: result.success,
            gas_used: result.gas_used,
            return_data: result.return_data,
            logs: result.logs,
            state,
        }
    }

    /// Execute `code` under both revisions and classify the first
    /// disagreement.
    pub fn execute(&self, code: &[u8]) -> DiffOutcome {
        let started = Instant::now();

        let first = self.run_one(code, self.first);
        if started.elapsed() > self.budget {
            return DiffOutcome::Timeout;
        }

        let second = self.run_one(code, self.second);
        if started.elapsed() > self.budget {
            return DiffOutcome::Timeout;
        }

        let kind = if first.success != second.success {
            DivergenceKind::SuccessMismatch
        } else if first.return_data != second.return_data {
            DivergenceKind::ReturnDataMismatch
        } else if first.gas_used != second.gas_used {
            DivergenceKind::GasMismatch
        } else if first.logs != second.logs {
            DivergenceKind::LogsMismatch
        } else if first.state != second.state {
            DivergenceKind::StateMismatch
        } else {
            return DiffOutcome::Agreement;
        };

        debug!(%kind, code = %hex::encode(code), "divergence");

        DiffOutcome::Diverged(Divergence {
            kind,
            first,
            second,
        })
    }

    /// Whether `divergence` on `code` is wholly explained by a documented
    /// fork-boundary rule. Returns the matching rule.
    pub fn expected_rule(&self, code: &[u8], divergence: &Divergence) -> Option<&'static str> {
        let (lo, hi) = if self.first <= self.second {
            (self.first, self.second)
        } else {
            (self.second, self.first)
        };

        EXPECTED_DIVERGENCES
            .iter()
            .find(|entry| {
                let straddles = lo < entry.boundary && entry.boundary <= hi;
                let kind_matches =
                    entry.kinds.is_empty() || entry.kinds.contains(&divergence.kind);
                straddles && kind_matches && code_uses_opcode(code, entry.opcodes)
            })
            .map(|entry| entry.rule)
    }

    /// Delta-debug `code` down to a locally minimal program that still
    /// diverges with the same classification.
    pub fn minimize(&self, code: &[u8]) -> Vec<u8> {
        let kind = match self.execute(code) {
            DiffOutcome::Diverged(divergence) => divergence.kind,
            _ => return code.to_vec(),
        };

        let still_diverges = |candidate: &[u8]| match self.execute(candidate) {
            DiffOutcome::Diverged(divergence) => divergence.kind == kind,
            _ => false,
        };

        let mut current = code.to_vec();
        let mut n = 2usize;

        'outer: while current.len() >= 2 {
            let chunk_size = (current.len() + n - 1) / n;
            let chunks: Vec<Vec<u8>> = current.chunks(chunk_size).map(<[u8]>::to_vec).collect();

            // Reduce to a single chunk if one suffices.
            for chunk in &chunks {
                if chunk.len() < current.len() && still_diverges(chunk) {
                    current = chunk.clone();
                    n = 2;
                    debug!(len = current.len(), "reduced to chunk");
                    continue 'outer;
                }
            }

            // Otherwise try dropping one chunk at a time.
            for skip in 0..chunks.len() {
                let complement: Vec<u8> = chunks
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != skip)
                    .flat_map(|(_, c)| c.iter().copied())
                    .collect();

                if complement.len() < current.len() && still_diverges(&complement) {
                    current = complement;
                    n = (n - 1).max(2);
                    debug!(len = current.len(), "reduced to complement");
                    continue 'outer;
                }
            }

            if n >= current.len() {
                break;
            }
            n = (n * 2).min(current.len());
        }

        current
    }
}

/// One unexplained divergence found by a campaign.
#[derive(Clone, Debug)]
pub struct Finding {
    pub code: Vec<u8>,
    pub minimized: Vec<u8>,
    pub divergence: Divergence,
}

/// Aggregate result of running a batch of candidates.
#[derive(Clone, Debug, Default)]
pub struct CampaignReport {
    pub candidates: usize,
    pub agreements: usize,
    pub timeouts: usize,
    pub expected: usize,
    pub findings: Vec<Finding>,
}

impl DifferentialExecutor {
    /// Run every candidate from `programs`, minimizing and collecting the
    /// divergences no fork-boundary rule explains.
    pub fn campaign(&self, programs: impl IntoIterator<Item = Vec<u8>>) -> CampaignReport {
        let mut report = CampaignReport::default();

        for code in programs {
            report.candidates += 1;
            match self.execute(&code) {
                DiffOutcome::Agreement => report.agreements += 1,
                DiffOutcome::Timeout => report.timeouts += 1,
                DiffOutcome::Diverged(divergence) => {
                    if let Some(rule) = self.expected_rule(&code, &divergence) {
                        debug!(rule, "expected divergence");
                        report.expected += 1;
                    } else {
                        let minimized = self.minimize(&code);
                        info!(
                            kind = %divergence.kind,
                            code = %hex::encode(&code),
                            minimized = %hex::encode(&minimized),
                            "unexplained divergence"
                        );
                        report.findings.push(Finding {
                            code,
                            minimized,
                            divergence,
                        });
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_scan_skips_push_immediates() {
        // PUSH1 0x5F: the 0x5F byte is data, not PUSH0.
        assert!(!code_uses_opcode(&[0x60, 0x5F, 0x00], &[OpCode::PUSH0]));
        assert!(code_uses_opcode(&[0x5F, 0x00], &[OpCode::PUSH0]));
    }

    #[test]
    fn identical_revisions_agree() {
        let executor = DifferentialExecutor::new(Revision::Shanghai, Revision::Shanghai);
        // PUSH1 1 PUSH1 2 ADD STOP
        assert_eq!(
            executor.execute(&[0x60, 0x01, 0x60, 0x02, 0x01, 0x00]),
            DiffOutcome::Agreement
        );
    }
}
