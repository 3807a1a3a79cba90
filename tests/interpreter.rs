use bytes::Bytes;
use ethereum_types::U256;
use evmdiff::{opcode::*, util::*, Revision, StatusCode};
use hex_literal::hex;

#[test]
fn add_overflow_wraps() {
    // PUSH1 1, PUSH32 2^256-1, ADD, STOP
    EvmTester::new()
        .revision(Revision::Frontier)
        .code(
            Bytecode::new()
                .append(&hex!("6001"))
                .append(&hex!("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"))
                .append(&hex!("0100")),
        )
        .gas(100)
        .status(StatusCode::Success)
        .gas_used(9)
        .check();

    // Same sum, returned to observe the wrapped value.
    EvmTester::new()
        .revision(Revision::Frontier)
        .code(
            Bytecode::new()
                .pushv(1)
                .pushv(U256::MAX)
                .opcode(OpCode::ADD)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(0)
        .check();
}

#[test]
fn push0_fork_boundary() {
    let code = Bytecode::new().append(&hex!("5f00"));

    EvmTester::new()
        .revision(Revision::Frontier)
        .code(code.clone())
        .gas(1_000_000)
        .status(StatusCode::UndefinedInstruction)
        .gas_left(0)
        .check();

    EvmTester::new()
        .revision(Revision::Homestead)
        .code(code.clone())
        .gas(1_000_000)
        .status(StatusCode::UndefinedInstruction)
        .gas_left(0)
        .check();

    EvmTester::new()
        .revision(Revision::Shanghai)
        .code(code)
        .gas(1_000_000)
        .status(StatusCode::Success)
        .gas_used(2)
        .inspect_output(|output| assert!(output.is_empty()))
        .check();
}

#[test]
fn div_by_zero_is_zero() {
    for revision in Revision::iter() {
        EvmTester::new()
            .revision(revision)
            .code(Bytecode::new().append(&hex!("6005600004 00")))
            .gas(100)
            .status(StatusCode::Success)
            .gas_used(11)
            .check();
    }

    EvmTester::new()
        .code(
            Bytecode::new()
                .pushv(0)
                .pushv(5)
                .opcode(OpCode::DIV)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(0)
        .check();
}

#[test]
fn memory_expansion_is_quadratic() {
    // MSTORE at word 0, then at word 31: the second write expands memory
    // from 32 to 1024 bytes for cost(1024) - cost(32) = 95.
    EvmTester::new()
        .code(
            Bytecode::new()
                .mstore_value(0, 0)
                .mstore_value(32 * 31, 0),
        )
        .status(StatusCode::Success)
        .gas_used(3 + 3 + (3 + 3) + 3 + 3 + (3 + 95))
        .check();
}

#[test]
fn sstore_schedules_refund() {
    EvmTester::new()
        .apply_world_fn(|world| {
            let recipient = ethereum_types::Address::zero();
            world.sstore(recipient, 0.into(), 7.into());
        })
        .code(Bytecode::new().append(&hex!("60006000 55 00")))
        .status(StatusCode::Success)
        .gas_used(3 + 3 + 5000)
        .inspect_world(|world| {
            assert_eq!(world.refund(), 15000);
            assert_eq!(
                world.sload(ethereum_types::Address::zero(), 0.into()),
                U256::zero()
            );
        })
        .check();
}

#[test]
fn sstore_set_costs_20000() {
    EvmTester::new()
        .code(Bytecode::new().sstore(0, 1))
        .status(StatusCode::Success)
        .gas_used(3 + 3 + 20000)
        .inspect_world(|world| {
            assert_eq!(world.refund(), 0);
            assert_eq!(
                world.sload(ethereum_types::Address::zero(), 0.into()),
                U256::one()
            );
        })
        .check();
}

#[test]
fn invalid_opcode_consumes_all_gas() {
    EvmTester::new()
        .code(Bytecode::new().opcode(OpCode::INVALID))
        .gas(12345)
        .status(StatusCode::InvalidInstruction)
        .gas_left(0)
        .check();

    // 0x0C is unassigned in every revision.
    EvmTester::new()
        .code(Bytecode::new().append(&[0x0C]))
        .gas(12345)
        .status(StatusCode::UndefinedInstruction)
        .gas_left(0)
        .check();
}

#[test]
fn stack_underflow_and_overflow() {
    EvmTester::new()
        .code(Bytecode::new().opcode(OpCode::ADD))
        .status(StatusCode::StackUnderflow)
        .gas_left(0)
        .check();

    EvmTester::new()
        .code(Bytecode::new().pushv(1).repeat(1025).opcode(OpCode::STOP))
        .status(StatusCode::StackOverflow)
        .gas_left(0)
        .check();

    // Exactly 1024 pushes still fit.
    EvmTester::new()
        .code(Bytecode::new().pushv(1).repeat(1024).opcode(OpCode::STOP))
        .status(StatusCode::Success)
        .check();
}

#[test]
fn jump_validity() {
    // JUMP into PUSH immediate data faults: the 0x5b at offset 4 is the
    // immediate of the PUSH1 before it.
    EvmTester::new()
        .code(
            Bytecode::new()
                .jump(4)
                .append(&hex!("605b 00")),
        )
        .status(StatusCode::BadJumpDestination)
        .gas_left(0)
        .check();

    // JUMP to a real JUMPDEST succeeds.
    EvmTester::new()
        .code(
            Bytecode::new()
                .jump(3)
                .opcode(OpCode::INVALID)
                .opcode(OpCode::JUMPDEST)
                .opcode(OpCode::STOP),
        )
        .status(StatusCode::Success)
        .check();

    // JUMPI with a zero condition falls through.
    EvmTester::new()
        .code(
            Bytecode::new()
                .jumpi(Bytecode::new().pushv(100), Bytecode::new().pushv(0))
                .opcode(OpCode::STOP),
        )
        .status(StatusCode::Success)
        .check();

    // Out-of-range target faults.
    EvmTester::new()
        .code(Bytecode::new().jump(1000))
        .status(StatusCode::BadJumpDestination)
        .gas_left(0)
        .check();
}

#[test]
fn memory_roundtrip() {
    // Write a marker byte over a stored word and read the result back.
    EvmTester::new()
        .code(
            Bytecode::new()
                .mstore_value(0, U256::MAX)
                .mstore8_value(7, 0xAB)
                .pushv(0)
                .opcode(OpCode::MLOAD)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .inspect_output(|output| {
            let mut expected = [0xFFu8; 32];
            expected[7] = 0xAB;
            assert_eq!(output, expected);
        })
        .check();

    // Reading an untouched range yields zeroes.
    EvmTester::new()
        .code(Bytecode::new().pushv(64).opcode(OpCode::MLOAD).ret_top())
        .status(StatusCode::Success)
        .output_value(0)
        .check();
}

#[test]
fn exp_gas_depends_on_revision() {
    // 2^3: one significant exponent byte.
    let code = Bytecode::new()
        .pushv(3)
        .pushv(2)
        .opcode(OpCode::EXP)
        .opcode(OpCode::STOP);

    EvmTester::new()
        .revision(Revision::Frontier)
        .code(code.clone())
        .status(StatusCode::Success)
        .gas_used(3 + 3 + 10 + 10)
        .check();

    EvmTester::new()
        .revision(Revision::Homestead)
        .code(code.clone())
        .status(StatusCode::Success)
        .gas_used(3 + 3 + 10 + 50)
        .check();

    EvmTester::new()
        .code(
            Bytecode::new()
                .pushv(3)
                .pushv(2)
                .opcode(OpCode::EXP)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(8)
        .check();
}

#[test]
fn signextend_and_sar() {
    // SIGNEXTEND byte 0 of 0xFF is -1; SAR keeps the sign.
    EvmTester::new()
        .code(
            Bytecode::new()
                .pushv(0xFF)
                .pushv(0)
                .opcode(OpCode::SIGNEXTEND)
                .pushv(4)
                .opcode(OpCode::SAR)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(U256::MAX)
        .check();
}

#[test]
fn calldata_access() {
    EvmTester::new()
        .input(Bytes::from(hex!("a1a2a3").to_vec()))
        .code(
            Bytecode::new()
                .pushv(0)
                .opcode(OpCode::CALLDATALOAD)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .inspect_output(|output| {
            assert_eq!(&output[..3], &hex!("a1a2a3"));
            assert!(output[3..].iter().all(|&b| b == 0));
        })
        .check();

    EvmTester::new()
        .input(Bytes::from(hex!("a1a2a3").to_vec()))
        .code(
            Bytecode::new()
                .opcode(OpCode::CALLDATASIZE)
                .ret_top(),
        )
        .status(StatusCode::Success)
        .output_value(3)
        .check();
}

#[test]
fn revert_returns_data_and_keeps_gas() {
    let output = EvmTester::new()
        .code(
            Bytecode::new()
                .mstore_value(0, 0xEE)
                .pushv(32)
                .pushv(0)
                .opcode(OpCode::REVERT),
        )
        .gas(10_000)
        .status(StatusCode::Revert)
        .output_value(0xEE)
        .check_and_get_result();

    assert!(output.gas_left > 0);
}

#[test]
fn log_emission_and_static_discipline() {
    EvmTester::new()
        .code(
            Bytecode::new()
                .pushv(0xAB)
                .pushv(0)
                .pushv(0)
                .opcode(OpCode::LOG1),
        )
        .status(StatusCode::Success)
        .inspect_world(|world| {
            assert_eq!(world.logs().len(), 1);
            assert_eq!(world.logs()[0].topics.len(), 1);
        })
        .check();

    EvmTester::new()
        .set_static(true)
        .code(Bytecode::new().pushv(0).pushv(0).opcode(OpCode::LOG0))
        .status(StatusCode::StaticModeViolation)
        .gas_left(0)
        .check();

    EvmTester::new()
        .set_static(true)
        .code(Bytecode::new().sstore(0, 1))
        .status(StatusCode::StaticModeViolation)
        .gas_left(0)
        .check();
}
