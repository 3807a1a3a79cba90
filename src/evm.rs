use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use rlp::RlpStream;
use sha3::{Digest, Keccak256};

use crate::common::{CallKind, Environment, Message, Output, Revision, StatusCode};
use crate::instructions::properties::CODE_DEPOSIT_COST;
use crate::interpreter::AnalyzedCode;
use crate::world::WorldState;

/// Maximum message-call / creation nesting depth.
pub const MAX_CALL_DEPTH: i32 = 1024;

/// Execution context for one transaction: the world state lent to the
/// interpreter, the block environment, and the per-transaction constants.
///
/// Sub-calls are synchronous and depth-first; each one runs under a world
/// snapshot that is reverted unless the frame halts normally.
pub struct Evm<'w> {
    pub(crate) world: &'w mut WorldState,
    pub(crate) env: &'w Environment,
    pub(crate) revision: Revision,
    pub(crate) origin: Address,
    pub(crate) gas_price: U256,
}

impl<'w> Evm<'w> {
    pub fn new(
        world: &'w mut WorldState,
        env: &'w Environment,
        revision: Revision,
        origin: Address,
        gas_price: U256,
    ) -> Self {
        Self {
            world,
            env,
            revision,
            origin,
            gas_price,
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Run a message call to completion. State mutations of the frame are
    /// committed iff it halts normally; value is transferred for plain
    /// calls before the code runs.
    ///
    /// A message past the depth limit is refused before any state is
    /// touched; the caller keeps the gas it would have forwarded.
    pub fn execute_message(&mut self, msg: Message) -> Output {
        if msg.depth > MAX_CALL_DEPTH {
            return Output::failure(StatusCode::CallDepthExceeded, msg.gas);
        }

        let snapshot = self.world.snapshot();

        if msg.kind == CallKind::Call && !msg.value.is_zero() {
            if let Err(status_code) = self.world.transfer(msg.sender, msg.recipient, msg.value) {
                self.world.revert_to(snapshot);
                return Output::failure(status_code, msg.gas);
            }
        }

        let code = self.world.code_of(msg.code_address);
        if code.is_empty() {
            // Nothing to run; a call to code-less account trivially succeeds.
            self.world.commit(snapshot);
            return Output {
                status_code: StatusCode::Success,
                gas_left: msg.gas,
                output_data: Bytes::new(),
                create_address: None,
            };
        }

        let gas = msg.gas;
        let analyzed = AnalyzedCode::analyze(code);
        let result = analyzed.execute(self, msg);

        match result {
            Ok(output) => {
                let output: Output = output.into();
                if output.status_code == StatusCode::Success {
                    self.world.commit(snapshot);
                } else {
                    self.world.revert_to(snapshot);
                }
                output
            }
            Err(status_code) => {
                self.world.revert_to(snapshot);
                let gas_left = if status_code.consumes_all_gas() { 0 } else { gas };
                Output::failure(status_code, gas_left)
            }
        }
    }

    /// CREATE/CREATE2 entry point for the interpreter: derives the new
    /// address from the sender, bumps the sender nonce, then runs the
    /// shared creation path.
    pub fn execute_create(&mut self, msg: Message) -> Output {
        if msg.depth > MAX_CALL_DEPTH {
            return Output::failure(StatusCode::CallDepthExceeded, msg.gas);
        }

        let create_address = match msg.kind {
            CallKind::Create => create_address(msg.sender, self.world.nonce_of(msg.sender)),
            CallKind::Create2 { salt } => create2_address(msg.sender, salt, &msg.input_data),
            _ => unreachable!("creation message with call kind"),
        };

        self.world.increment_nonce(msg.sender);

        self.run_create_at(create_address, msg)
    }

    /// Run initcode in a fresh frame at `create_address` and deposit the
    /// returned code. The caller has already derived the address and
    /// settled the sender nonce.
    pub(crate) fn run_create_at(&mut self, create_address: Address, msg: Message) -> Output {
        if let Some(account) = self.world.get_account(create_address) {
            if account.nonce > 0 || !account.code.is_empty() {
                return Output::failure(StatusCode::Failure, 0);
            }
        }

        let snapshot = self.world.snapshot();

        if !msg.value.is_zero() {
            if let Err(status_code) = self.world.transfer(msg.sender, create_address, msg.value) {
                self.world.revert_to(snapshot);
                return Output::failure(status_code, msg.gas);
            }
        }

        let initcode = msg.input_data.clone();
        let gas = msg.gas;

        let frame_msg = Message {
            recipient: create_address,
            code_address: create_address,
            input_data: Bytes::new(),
            ..msg
        };

        let analyzed = AnalyzedCode::analyze(initcode);
        let result = analyzed.execute(self, frame_msg);

        match result {
            Ok(output) if !output.reverted => {
                let code: Bytes = output.output_data;
                let mut gas_left = output.gas_left;

                let deposit_cost = CODE_DEPOSIT_COST * code.len() as i64;
                if gas_left < deposit_cost {
                    if self.revision.rules().create_oog_consumes_all_gas {
                        self.world.revert_to(snapshot);
                        return Output::failure(StatusCode::OutOfGas, 0);
                    }
                    // Frontier tolerates the shortfall: the account keeps no
                    // code and the frame keeps its gas.
                } else {
                    gas_left -= deposit_cost;
                    self.world.set_code(create_address, code);
                }

                self.world.commit(snapshot);
                Output {
                    status_code: StatusCode::Success,
                    gas_left,
                    output_data: Bytes::new(),
                    create_address: Some(create_address),
                }
            }
            Ok(output) => {
                self.world.revert_to(snapshot);
                Output {
                    status_code: StatusCode::Revert,
                    gas_left: output.gas_left,
                    output_data: output.output_data,
                    create_address: None,
                }
            }
            Err(status_code) => {
                self.world.revert_to(snapshot);
                let gas_left = if status_code.consumes_all_gas() { 0 } else { gas };
                Output::failure(status_code, gas_left)
            }
        }
    }
}

/// `keccak256(rlp([sender, nonce]))[12..]`
pub fn create_address(sender: Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender.0.as_ref());
    stream.append(&nonce);
    let hash = Keccak256::digest(&stream.out());
    Address::from_slice(&hash[12..])
}

/// `keccak256(0xff ++ sender ++ salt ++ keccak256(initcode))[12..]`
pub fn create2_address(sender: Address, salt: H256, initcode: &[u8]) -> Address {
    let mut hasher = Keccak256::new();
    hasher.update([0xff]);
    hasher.update(sender.0);
    hasher.update(salt.0);
    hasher.update(Keccak256::digest(initcode));
    let hash = hasher.finalize();
    Address::from_slice(&hash[12..])
}
