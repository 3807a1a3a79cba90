use crate::util::Bytecode;
use crate::{
    Account, CallKind, Environment, Evm, Message, Output, Revision, StatusCode, WorldState,
};
use bytes::Bytes;
use ethereum_types::{Address, U256};
use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
enum GasCheck {
    Used(i64),
    Left(i64),
}

/// Tester that executes EVM bytecode against an in-memory world state and
/// runs the configured checks.
#[derive(Clone)]
#[must_use]
pub struct EvmTester {
    world: WorldState,
    env: Environment,
    apply_world_fns: Vec<Arc<dyn Fn(&mut WorldState)>>,
    inspect_output_fn: Arc<dyn Fn(&[u8])>,
    inspect_world_fn: Arc<dyn Fn(&WorldState)>,
    revision: Revision,
    message: Message,
    code: Bytes,
    gas_check: Option<GasCheck>,
    expected_status_codes: Option<Vec<StatusCode>>,
    expected_output_data: Option<Vec<u8>>,
}

impl Default for EvmTester {
    fn default() -> Self {
        Self::new()
    }
}

impl EvmTester {
    pub fn new() -> Self {
        Self {
            world: WorldState::new(),
            env: Environment::default(),
            apply_world_fns: vec![],
            inspect_output_fn: Arc::new(|_| ()),
            inspect_world_fn: Arc::new(|_| ()),
            revision: Revision::latest(),
            message: Message {
                kind: CallKind::Call,
                is_static: false,
                depth: 0,
                gas: i64::MAX,
                recipient: Address::zero(),
                code_address: Address::zero(),
                sender: Address::zero(),
                input_data: Bytes::new(),
                value: 0.into(),
            },
            code: Bytes::new(),
            gas_check: None,
            expected_status_codes: None,
            expected_output_data: None,
        }
    }

    /// Set code to be executed.
    pub fn code(mut self, code: impl Into<Bytecode>) -> Self {
        self.code = code.into().build().into();
        self
    }

    /// Queue a function that will modify the world before execution.
    pub fn apply_world_fn(mut self, world_fn: impl Fn(&mut WorldState) + 'static) -> Self {
        self.apply_world_fns.push(Arc::new(world_fn));
        self
    }

    /// Set EVM revision for this tester.
    pub fn revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    /// Set the block environment.
    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Set message depth.
    pub fn depth(mut self, depth: u16) -> Self {
        self.message.depth = depth.into();
        self
    }

    /// Set provided gas.
    pub fn gas(mut self, gas: i64) -> Self {
        self.message.gas = gas;
        self
    }

    /// Set static message flag.
    pub fn set_static(mut self, is_static: bool) -> Self {
        self.message.is_static = is_static;
        self
    }

    /// Set the account the code runs as.
    pub fn recipient(mut self, recipient: impl Into<Address>) -> Self {
        let recipient = recipient.into();
        self.message.recipient = recipient;
        self.message.code_address = recipient;
        self
    }

    /// Set message sender.
    pub fn sender(mut self, sender: impl Into<Address>) -> Self {
        self.message.sender = sender.into();
        self
    }

    /// Set transferred value. The sender is funded with it automatically.
    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.message.value = value.into();
        self
    }

    /// Set provided input data.
    pub fn input(mut self, input: impl Into<Bytes>) -> Self {
        self.message.input_data = input.into();
        self
    }

    /// Check how much gas will be used. Mutually exclusive with `EvmTester::gas_left`.
    pub fn gas_used(mut self, expected_gas_used: i64) -> Self {
        self.gas_check = Some(GasCheck::Used(expected_gas_used));
        self
    }

    /// Check how much gas will be left after execution. Mutually exclusive with `EvmTester::gas_used`.
    pub fn gas_left(mut self, expected_gas_left: i64) -> Self {
        self.gas_check = Some(GasCheck::Left(expected_gas_left));
        self
    }

    /// Check returned status.
    pub fn status(mut self, expected_status_code: StatusCode) -> Self {
        self.expected_status_codes = Some(vec![expected_status_code]);
        self
    }

    /// Check returned status to be one of these.
    pub fn status_one_of<const N: usize>(mut self, expected_status_code: [StatusCode; N]) -> Self {
        self.expected_status_codes = Some(expected_status_code.to_vec());
        self
    }

    /// Check output to be equal to provided integer.
    pub fn output_value(mut self, expected_output_data: impl Into<U256>) -> Self {
        let mut data = [0; 32];
        expected_output_data.into().to_big_endian(&mut data);
        self.expected_output_data = Some(data.to_vec());
        self
    }

    /// Check output data to be equal to provided byte string.
    pub fn output_data(mut self, expected_output_data: impl Into<Vec<u8>>) -> Self {
        self.expected_output_data = Some(expected_output_data.into());
        self
    }

    /// Inspect output with provided function.
    pub fn inspect_output(mut self, inspect_output_fn: impl Fn(&[u8]) + 'static) -> Self {
        self.inspect_output_fn = Arc::new(inspect_output_fn);
        self
    }

    /// Inspect the post-execution world with provided function.
    pub fn inspect_world(mut self, f: impl Fn(&WorldState) + 'static) -> Self {
        self.inspect_world_fn = Arc::new(f);
        self
    }

    /// Execute provided code, run checks and return the output.
    pub fn check_and_get_result(self) -> Output {
        let mut world = self.world;
        for f in &self.apply_world_fns {
            (f)(&mut world);
        }

        let mut account = world
            .get_account(self.message.recipient)
            .cloned()
            .unwrap_or_else(Account::default);
        account.code = self.code.clone();
        world.insert_account(self.message.recipient, account);

        if !self.message.value.is_zero() {
            world.add_balance(self.message.sender, self.message.value);
        }

        let mut evm = Evm::new(
            &mut world,
            &self.env,
            self.revision,
            self.message.sender,
            U256::zero(),
        );
        let output = evm.execute_message(self.message.clone());

        if let Some(status_codes) = self.expected_status_codes {
            if !status_codes.iter().any(|s| *s == output.status_code) {
                panic!(
                    "Status code mismatch: {}, but must be one of {:?}",
                    output.status_code, status_codes
                );
            }
        }

        if let Some(gas_check) = self.gas_check {
            match gas_check {
                GasCheck::Used(used) => assert_eq!(self.message.gas - output.gas_left, used),
                GasCheck::Left(left) => assert_eq!(output.gas_left, left),
            }
        }

        if let Some(expected_data) = &self.expected_output_data {
            assert_eq!(&*output.output_data, expected_data);
        }

        (self.inspect_output_fn)(&output.output_data);
        (self.inspect_world_fn)(&world);

        output
    }

    /// Execute provided code and run checks.
    pub fn check(self) {
        self.check_and_get_result();
    }
}
