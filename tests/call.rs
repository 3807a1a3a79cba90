use bytes::Bytes;
use ethereum_types::{Address, U256};
use evmdiff::{opcode::*, util::*, Account, Revision, StatusCode};
use hex_literal::hex;

fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

fn deploy(world: &mut evmdiff::WorldState, address: Address, code: Vec<u8>) {
    world.insert_account(
        address,
        Account {
            nonce: 1,
            balance: U256::zero(),
            code: code.into(),
            storage: Default::default(),
        },
    );
}

#[test]
fn delegatecall_inherits_caller_and_value() {
    // The callee records CALLER and CALLVALUE; under DELEGATECALL both must
    // be the parent's own context.
    let callee = Bytecode::new()
        .opcode(OpCode::CALLER)
        .mstore(0)
        .opcode(OpCode::CALLVALUE)
        .mstore(32)
        .ret(0, 64)
        .build();

    EvmTester::new()
        .recipient(addr(0x0A))
        .sender(addr(0x05))
        .value(0xFE)
        .apply_world_fn(move |world| deploy(world, addr(0x0B), callee.clone()))
        .code(
            Bytecode::new()
                .append_bc(
                    CallInstruction::delegatecall(0x0Bu64)
                        .gas(100_000)
                        .output(0, 64),
                )
                .ret(0, 64),
        )
        .status(StatusCode::Success)
        .inspect_output(|output| {
            assert_eq!(output.len(), 64);
            assert_eq!(&output[12..32], addr(0x05).as_bytes());
            assert_eq!(U256::from_big_endian(&output[32..]), 0xFE.into());
        })
        .check();
}

#[test]
fn delegatecall_forwards_static_flag() {
    // A static parent delegatecalls storage-writing code; the child frame
    // must fault and the parent sees a zero flag.
    let callee = Bytecode::new().sstore(0, 1).build();

    EvmTester::new()
        .recipient(addr(0x0A))
        .set_static(true)
        .apply_world_fn(move |world| deploy(world, addr(0x0B), callee.clone()))
        .code(
            Bytecode::new()
                .append_bc(CallInstruction::delegatecall(0x0Bu64).gas(50_000))
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(0)
        .inspect_world(|world| {
            assert_eq!(world.sload(addr(0x0A), 0.into()), 0.into());
        })
        .check();
}

#[test]
fn delegatecall_depth_limit() {
    let t = EvmTester::new()
        .revision(Revision::Homestead)
        .depth(1024)
        .code(
            Bytecode::new()
                .append_bc(CallInstruction::delegatecall(0).gas(16))
                .ret_top(),
        );

    t.clone()
        .status(StatusCode::Success)
        .gas_used(733)
        .output_value(0)
        .check();

    t.gas(732).status(StatusCode::OutOfGas).check();
}

#[test]
fn call_with_value_surcharges() {
    // Value transfer to an empty account: 9000 value surcharge, 25000
    // new-account surcharge, and the unspent 2300 stipend returned.
    EvmTester::new()
        .revision(Revision::Homestead)
        .recipient(addr(0x0A))
        .apply_world_fn(|world| world.add_balance(addr(0x0A), 5.into()))
        .code(
            Bytecode::new()
                .append_bc(CallInstruction::call(0xDDu64).value(5).gas(0))
                .opcode(OpCode::STOP),
        )
        .status(StatusCode::Success)
        .gas_used(7 * 3 + 700 + 9000 + 25000 - 2300)
        .inspect_world(|world| {
            assert_eq!(world.balance_of(addr(0x0A)), U256::zero());
            assert_eq!(
                world.balance_of(Address::from_low_u64_be(0xDD)),
                U256::from(5)
            );
        })
        .check();
}

#[test]
fn call_insufficient_balance_pushes_zero() {
    // The caller holds nothing; the child is never invoked and the flag
    // stays zero.
    EvmTester::new()
        .recipient(addr(0x0A))
        .code(
            Bytecode::new()
                .append_bc(CallInstruction::call(0xDDu64).value(5).gas(0))
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(0)
        .inspect_world(|world| {
            assert_eq!(world.balance_of(Address::from_low_u64_be(0xDD)), U256::zero());
        })
        .check();
}

#[test]
fn callcode_writes_own_storage() {
    let callee = Bytecode::new().sstore(1, 42).opcode(OpCode::STOP).build();

    EvmTester::new()
        .recipient(addr(0x0A))
        .apply_world_fn(move |world| deploy(world, addr(0x0B), callee.clone()))
        .code(
            Bytecode::new()
                .append_bc(CallInstruction::callcode(0x0Bu64).gas(100_000))
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(1)
        .inspect_world(|world| {
            assert_eq!(world.sload(addr(0x0A), 1.into()), 42.into());
            assert_eq!(world.sload(Address::from_low_u64_be(0x0B), 1.into()), 0.into());
        })
        .check();
}

#[test]
fn staticcall_violation_in_callee() {
    // The callee attempts SSTORE inside a static frame; it faults, its gas
    // is gone, and the outer STATICCALL pushes zero.
    let callee = Bytecode::new().append(&hex!("6001600055")).build();

    EvmTester::new()
        .recipient(addr(0x0A))
        .apply_world_fn(move |world| deploy(world, addr(0x0B), callee.clone()))
        .code(
            Bytecode::new()
                .append_bc(CallInstruction::staticcall(0x0Bu64).gas(50_000))
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(0)
        .inspect_world(|world| {
            assert_eq!(world.sload(Address::from_low_u64_be(0x0B), 0.into()), 0.into());
        })
        .check();
}

#[test]
fn returndata_of_reverting_callee() {
    let callee = Bytecode::new()
        .mstore_value(0, 0xDD)
        .pushv(32)
        .pushv(0)
        .opcode(OpCode::REVERT)
        .build();

    EvmTester::new()
        .recipient(addr(0x0A))
        .apply_world_fn(move |world| deploy(world, addr(0x0B), callee.clone()))
        .code(
            Bytecode::new()
                .append_bc(CallInstruction::call(0x0Bu64).gas(100_000))
                .pushv(32)
                .pushv(0)
                .pushv(0)
                .opcode(OpCode::RETURNDATACOPY)
                .ret(0, 32),
        )
        .status(StatusCode::Success)
        .output_value(0xDD)
        .check();
}

#[test]
fn returndatacopy_past_buffer_faults() {
    EvmTester::new()
        .code(
            Bytecode::new()
                .pushv(1)
                .pushv(0)
                .pushv(0)
                .opcode(OpCode::RETURNDATACOPY),
        )
        .status(StatusCode::InvalidMemoryAccess)
        .gas_left(0)
        .check();
}

#[test]
fn create_deploys_and_transfers_value() {
    // PUSH1 32, PUSH1 0, PUSH1 1, CREATE, PUSH1 1, SSTORE: create a child
    // from 32 zero bytes of initcode, endow it with 1 wei, store the
    // resulting address at key 1.
    let parent = addr(0x0A);
    let expected_child = evmdiff::create_address(parent, 0);

    EvmTester::new()
        .recipient(parent)
        .apply_world_fn(move |world| world.add_balance(parent, 1.into()))
        .gas(300_000)
        .code(Bytecode::new().append(&hex!("602060006001f0600155")))
        .status(StatusCode::Success)
        .inspect_world(move |world| {
            let stored = world.sload(parent, 1.into());
            assert_eq!(
                stored,
                U256::from_big_endian(expected_child.as_bytes()),
                "created address must land in storage"
            );
            assert_eq!(world.balance_of(expected_child), U256::one());
            assert_eq!(world.balance_of(parent), U256::zero());
            assert!(world.code_of(expected_child).is_empty());
        })
        .check();
}

#[test]
fn create2_address_is_salt_derived() {
    let parent = addr(0x0A);
    let expected = evmdiff::create2_address(
        parent,
        ethereum_types::H256::from_low_u64_be(0xAB),
        &[],
    );

    // salt, size, offset, value; then CREATE2 and return the address.
    EvmTester::new()
        .recipient(parent)
        .gas(100_000)
        .code(
            Bytecode::new()
                .pushv(0xAB)
                .pushv(0)
                .pushv(0)
                .pushv(0)
                .opcode(OpCode::CREATE2)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(U256::from_big_endian(expected.as_bytes()))
        .check();
}

#[test]
fn create_collision_fails() {
    let parent = addr(0x0A);
    let child = evmdiff::create_address(parent, 0);

    EvmTester::new()
        .recipient(parent)
        .apply_world_fn(move |world| {
            deploy(world, child, vec![0x00]);
        })
        .gas(100_000)
        .code(
            Bytecode::new()
                .pushv(0)
                .pushv(0)
                .pushv(0)
                .opcode(OpCode::CREATE)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(0)
        .check();
}

#[test]
fn create_deposit_oog_semantics_differ_by_fork() {
    // Initcode returning 32 bytes whose deposit cost (6400) the child
    // cannot pay. Frontier keeps the remaining gas and deploys nothing;
    // Homestead consumes everything forwarded.
    let initcode = hex!("60aa60005260206000f3");
    let mut word = [0u8; 32];
    word[..initcode.len()].copy_from_slice(&initcode);

    let code = Bytecode::new()
        .mstore_value(0, U256::from_big_endian(&word))
        .pushv(initcode.len())
        .pushv(0)
        .pushv(0)
        .opcode(OpCode::CREATE)
        .opcode(OpCode::STOP);

    EvmTester::new()
        .recipient(addr(0x0A))
        .revision(Revision::Frontier)
        .gas(32121)
        .code(code.clone())
        .status(StatusCode::Success)
        .gas_used(32039)
        .check();

    EvmTester::new()
        .recipient(addr(0x0A))
        .revision(Revision::Homestead)
        .gas(32121)
        .code(code)
        .status(StatusCode::Success)
        .gas_used(32120)
        .check();
}

#[test]
fn shanghai_initcode_limit() {
    // CREATE with initcode one byte over the cap faults under Shanghai and
    // is accepted (as a plain big memory read) under Homestead.
    let size = 0xC000 + 1;

    let t = EvmTester::new()
        .recipient(addr(0x0A))
        .gas(10_000_000)
        .code(
            Bytecode::new()
                .pushv(size)
                .pushv(0)
                .pushv(0)
                .opcode(OpCode::CREATE)
                .ret_top(),
        );

    t.clone()
        .revision(Revision::Shanghai)
        .status(StatusCode::OutOfGas)
        .gas_left(0)
        .check();

    t.revision(Revision::Homestead)
        .status(StatusCode::Success)
        .check();
}

#[test]
fn selfdestruct_moves_balance_and_schedules() {
    let contract = addr(0x0A);

    EvmTester::new()
        .recipient(contract)
        .apply_world_fn(move |world| world.add_balance(contract, 100.into()))
        .code(Bytecode::new().pushv(0xBB).opcode(OpCode::SELFDESTRUCT))
        .status(StatusCode::Success)
        .gas_used(3 + 5000)
        .inspect_world(move |world| {
            assert_eq!(
                world.balance_of(Address::from_low_u64_be(0xBB)),
                U256::from(100)
            );
            assert_eq!(world.balance_of(contract), U256::zero());
            assert_eq!(world.refund(), 24000);
        })
        .check();

    // Frontier charges nothing for the opcode itself.
    EvmTester::new()
        .revision(Revision::Frontier)
        .recipient(contract)
        .code(Bytecode::new().pushv(0xBB).opcode(OpCode::SELFDESTRUCT))
        .status(StatusCode::Success)
        .gas_used(3)
        .check();
}

#[test]
fn static_create_and_selfdestruct_fault() {
    EvmTester::new()
        .set_static(true)
        .code(
            Bytecode::new()
                .pushv(0)
                .pushv(0)
                .pushv(0)
                .opcode(OpCode::CREATE),
        )
        .status(StatusCode::StaticModeViolation)
        .gas_left(0)
        .check();

    EvmTester::new()
        .set_static(true)
        .code(Bytecode::new().pushv(0xBB).opcode(OpCode::SELFDESTRUCT))
        .status(StatusCode::StaticModeViolation)
        .gas_left(0)
        .check();
}

#[test]
fn depth_limit_is_reported_as_a_status() {
    let mut world = evmdiff::WorldState::new();
    let env = evmdiff::Environment::default();
    let mut evm = evmdiff::Evm::new(
        &mut world,
        &env,
        Revision::Shanghai,
        Address::zero(),
        U256::zero(),
    );

    let output = evm.execute_message(evmdiff::Message {
        kind: evmdiff::CallKind::Call,
        is_static: false,
        depth: 1025,
        gas: 5000,
        recipient: addr(0x0A),
        code_address: addr(0x0A),
        sender: addr(0x01),
        input_data: Bytes::new(),
        value: U256::zero(),
    });

    assert_eq!(output.status_code, StatusCode::CallDepthExceeded);
    // The gas the caller would have forwarded comes back untouched.
    assert_eq!(output.gas_left, 5000);
}
