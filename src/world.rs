use arrayvec::ArrayVec;
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use std::collections::{HashMap, HashSet};

use crate::StatusCode;

/// A single account: nonce, balance, code and storage.
///
/// Storage values of zero are not stored; absent and zero are
/// indistinguishable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub code: Bytes,
    pub storage: HashMap<U256, U256>,
}

impl Account {
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code.is_empty()
    }
}

/// A log record emitted by LOG0..LOG4.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: ArrayVec<H256, 4>,
    pub data: Bytes,
}

/// Checkpoint into the mutation journal. Snapshots compose to any depth;
/// reverting to one undoes everything recorded after it.
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct Snapshot(usize);

#[derive(Clone, Debug)]
enum JournalEntry {
    AccountCreated {
        address: Address,
    },
    BalanceChanged {
        address: Address,
        prev: U256,
    },
    NonceChanged {
        address: Address,
        prev: u64,
    },
    CodeChanged {
        address: Address,
        prev: Bytes,
    },
    StorageChanged {
        address: Address,
        key: U256,
        prev: U256,
    },
    LogEmitted,
    RefundAdded {
        amount: i64,
    },
    DestructScheduled {
        address: Address,
    },
}

/// In-memory world state with journaled mutation, so any sub-frame can be
/// rolled back byte-exactly.
///
/// Every mutating operation appends a reversal record. `snapshot` captures
/// the journal position; `revert_to` pops back to it; `commit` merely drops
/// the marker, leaving the records in place so an ancestor frame can still
/// revert past the committed child.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    accounts: HashMap<Address, Account>,
    journal: Vec<JournalEntry>,
    logs: Vec<LogEntry>,
    refund: i64,
    destructs: HashSet<Address>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account before execution starts. Not journaled.
    pub fn insert_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    pub fn get_account(&self, address: Address) -> Option<&Account> {
        self.accounts.get(&address)
    }

    pub fn accounts(&self) -> &HashMap<Address, Account> {
        &self.accounts
    }

    pub fn has_account(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    /// An account that does not exist or equals the empty tuple reads as
    /// empty.
    pub fn is_empty(&self, address: Address) -> bool {
        self.accounts
            .get(&address)
            .map(Account::is_empty)
            .unwrap_or(true)
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.accounts
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default()
    }

    pub fn nonce_of(&self, address: Address) -> u64 {
        self.accounts
            .get(&address)
            .map(|a| a.nonce)
            .unwrap_or_default()
    }

    pub fn code_of(&self, address: Address) -> Bytes {
        self.accounts
            .get(&address)
            .map(|a| a.code.clone())
            .unwrap_or_default()
    }

    fn account_mut(&mut self, address: Address) -> &mut Account {
        if !self.accounts.contains_key(&address) {
            self.journal.push(JournalEntry::AccountCreated { address });
            self.accounts.insert(address, Account::default());
        }
        self.accounts.get_mut(&address).expect("just inserted")
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        let account = self.account_mut(address);
        let prev = account.nonce;
        account.nonce = nonce;
        self.journal.push(JournalEntry::NonceChanged { address, prev });
    }

    pub fn increment_nonce(&mut self, address: Address) {
        let nonce = self.nonce_of(address);
        self.set_nonce(address, nonce + 1);
    }

    pub fn add_balance(&mut self, address: Address, amount: U256) {
        let account = self.account_mut(address);
        let prev = account.balance;
        account.balance = prev.overflowing_add(amount).0;
        self.journal
            .push(JournalEntry::BalanceChanged { address, prev });
    }

    pub fn sub_balance(&mut self, address: Address, amount: U256) -> Result<(), StatusCode> {
        if self.balance_of(address) < amount {
            return Err(StatusCode::InsufficientBalance);
        }
        let account = self.account_mut(address);
        let prev = account.balance;
        account.balance = prev - amount;
        self.journal
            .push(JournalEntry::BalanceChanged { address, prev });
        Ok(())
    }

    /// Move `amount` from `from` to `to`, failing without side effects if
    /// the sender cannot cover it.
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), StatusCode> {
        self.sub_balance(from, amount)?;
        self.add_balance(to, amount);
        Ok(())
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) {
        let account = self.account_mut(address);
        let prev = core::mem::replace(&mut account.code, code);
        self.journal.push(JournalEntry::CodeChanged { address, prev });
    }

    pub fn sload(&self, address: Address, key: U256) -> U256 {
        self.accounts
            .get(&address)
            .and_then(|a| a.storage.get(&key))
            .copied()
            .unwrap_or_default()
    }

    pub fn sstore(&mut self, address: Address, key: U256, value: U256) {
        let account = self.account_mut(address);
        let prev = if value.is_zero() {
            account.storage.remove(&key).unwrap_or_default()
        } else {
            account.storage.insert(key, value).unwrap_or_default()
        };
        self.journal
            .push(JournalEntry::StorageChanged { address, key, prev });
    }

    pub fn emit_log(&mut self, log: LogEntry) {
        self.logs.push(log);
        self.journal.push(JournalEntry::LogEmitted);
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn add_refund(&mut self, amount: i64) {
        self.refund += amount;
        self.journal.push(JournalEntry::RefundAdded { amount });
    }

    pub fn refund(&self) -> i64 {
        self.refund
    }

    /// Mark `address` for destruction at transaction end. Returns whether it
    /// was newly scheduled in this transaction.
    pub fn schedule_destruct(&mut self, address: Address) -> bool {
        let newly = self.destructs.insert(address);
        if newly {
            self.journal.push(JournalEntry::DestructScheduled { address });
        }
        newly
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.journal.len())
    }

    pub fn revert_to(&mut self, snapshot: Snapshot) {
        while self.journal.len() > snapshot.0 {
            match self.journal.pop().expect("journal longer than snapshot") {
                JournalEntry::AccountCreated { address } => {
                    self.accounts.remove(&address);
                }
                JournalEntry::BalanceChanged { address, prev } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.balance = prev;
                    }
                }
                JournalEntry::NonceChanged { address, prev } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.nonce = prev;
                    }
                }
                JournalEntry::CodeChanged { address, prev } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        account.code = prev;
                    }
                }
                JournalEntry::StorageChanged { address, key, prev } => {
                    if let Some(account) = self.accounts.get_mut(&address) {
                        if prev.is_zero() {
                            account.storage.remove(&key);
                        } else {
                            account.storage.insert(key, prev);
                        }
                    }
                }
                JournalEntry::LogEmitted => {
                    self.logs.pop();
                }
                JournalEntry::RefundAdded { amount } => {
                    self.refund -= amount;
                }
                JournalEntry::DestructScheduled { address } => {
                    self.destructs.remove(&address);
                }
            }
        }
    }

    pub fn commit(&mut self, _snapshot: Snapshot) {}

    /// Reset per-transaction bookkeeping. Called at the start of a
    /// transaction; accounts persist, journal/logs/refund/destructs do not.
    pub fn begin_transaction(&mut self) {
        self.journal.clear();
        self.logs.clear();
        self.refund = 0;
        self.destructs.clear();
    }

    /// Drain the logs accumulated by the current transaction.
    pub fn take_logs(&mut self) -> Vec<LogEntry> {
        core::mem::take(&mut self.logs)
    }

    /// Delete every account scheduled for destruction.
    pub fn destroy_scheduled(&mut self) {
        for address in core::mem::take(&mut self.destructs) {
            self.accounts.remove(&address);
        }
    }
}
