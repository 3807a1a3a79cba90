use crate::opcode::OpCode;
use ethereum_types::U256;

/// Program assembler shared by the candidate generator, the EIP vector
/// emitter and the test suite.
///
/// Combinators append instructions and hand the builder back, so programs
/// read in execution order. Pushed values always use the shortest PUSHn
/// that fits; PUSH0 is never emitted implicitly, since it does not exist
/// in every revision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bytecode {
    bytes: Vec<u8>,
}

impl Bytecode {
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append raw bytes verbatim.
    pub fn append(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Append another program.
    pub fn append_bc(mut self, other: impl Into<Self>) -> Self {
        self.bytes.append(&mut other.into().bytes);
        self
    }

    /// Replace the program with `n` copies of itself.
    pub fn repeat(mut self, n: usize) -> Self {
        self.bytes = self.bytes.repeat(n);
        self
    }

    pub fn opcode(mut self, op: OpCode) -> Self {
        self.bytes.push(op.to_u8());
        self
    }

    /// PUSHn with the given immediate. An empty slice degrades to
    /// `PUSH1 0x00`.
    pub fn pushb(mut self, immediate: &[u8]) -> Self {
        if immediate.is_empty() {
            return self.pushb(&[0]);
        }
        debug_assert!(immediate.len() <= 32);

        self.bytes
            .push(OpCode::PUSH1.to_u8() + (immediate.len() - 1) as u8);
        self.bytes.extend_from_slice(immediate);
        self
    }

    /// PUSH `value`, sized to its significant bytes.
    pub fn pushv(self, value: impl Into<U256>) -> Self {
        let value = value.into();
        let significant = ((value.bits() + 7) / 8).max(1);

        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.pushb(&word[32 - significant..])
    }

    /// MSTORE the stack top at `offset`.
    pub fn mstore(self, offset: impl Into<U256>) -> Self {
        self.pushv(offset).opcode(OpCode::MSTORE)
    }

    pub fn mstore_value(self, offset: impl Into<U256>, value: impl Into<U256>) -> Self {
        self.pushv(value).mstore(offset)
    }

    pub fn mstore8_value(self, offset: impl Into<U256>, value: impl Into<U256>) -> Self {
        self.pushv(value).pushv(offset).opcode(OpCode::MSTORE8)
    }

    pub fn ret(self, offset: impl Into<U256>, size: impl Into<U256>) -> Self {
        self.pushv(size).pushv(offset).opcode(OpCode::RETURN)
    }

    /// Return the word at the top of the stack.
    pub fn ret_top(self) -> Self {
        self.mstore(0).ret(0, 0x20)
    }

    pub fn jump(self, target: impl Into<U256>) -> Self {
        self.pushv(target).opcode(OpCode::JUMP)
    }

    /// Emit `condition`, then `target`, then JUMPI.
    pub fn jumpi(self, target: Bytecode, condition: Bytecode) -> Self {
        self.append_bc(condition)
            .append_bc(target)
            .opcode(OpCode::JUMPI)
    }

    pub fn sstore(self, key: impl Into<U256>, value: impl Into<U256>) -> Self {
        self.pushv(value).pushv(key).opcode(OpCode::SSTORE)
    }

    pub fn sload(self, key: impl Into<U256>) -> Self {
        self.pushv(key).opcode(OpCode::SLOAD)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<const N: usize> From<[u8; N]> for Bytecode {
    fn from(bytes: [u8; N]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

/// Operand bundle for the CALL family. Emits the operand pushes in the
/// reverse of the order the instruction pops them, so the call site reads
/// like the instruction's signature.
pub struct CallInstruction {
    op: OpCode,
    gas: U256,
    address: U256,
    value: U256,
    /// `(offset, size)` of the argument region.
    input: (U256, U256),
    /// `(offset, size)` of the return-copy region.
    output: (U256, U256),
}

impl CallInstruction {
    fn new(op: OpCode, address: impl Into<U256>) -> Self {
        Self {
            op,
            gas: U256::zero(),
            address: address.into(),
            value: U256::zero(),
            input: (U256::zero(), U256::zero()),
            output: (U256::zero(), U256::zero()),
        }
    }

    pub fn call(address: impl Into<U256>) -> Self {
        Self::new(OpCode::CALL, address)
    }

    pub fn callcode(address: impl Into<U256>) -> Self {
        Self::new(OpCode::CALLCODE, address)
    }

    pub fn delegatecall(address: impl Into<U256>) -> Self {
        Self::new(OpCode::DELEGATECALL, address)
    }

    pub fn staticcall(address: impl Into<U256>) -> Self {
        Self::new(OpCode::STATICCALL, address)
    }

    pub fn gas(mut self, gas: impl Into<U256>) -> Self {
        self.gas = gas.into();
        self
    }

    /// Transferred value; only CALL and CALLCODE carry one on the stack.
    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = value.into();
        self
    }

    pub fn input(mut self, offset: impl Into<U256>, size: impl Into<U256>) -> Self {
        self.input = (offset.into(), size.into());
        self
    }

    pub fn output(mut self, offset: impl Into<U256>, size: impl Into<U256>) -> Self {
        self.output = (offset.into(), size.into());
        self
    }
}

impl From<CallInstruction> for Bytecode {
    fn from(call: CallInstruction) -> Self {
        let takes_value = matches!(call.op, OpCode::CALL | OpCode::CALLCODE);

        let mut b = Bytecode::new()
            .pushv(call.output.1)
            .pushv(call.output.0)
            .pushv(call.input.1)
            .pushv(call.input.0);
        if takes_value {
            b = b.pushv(call.value);
        }
        b.pushv(call.address).pushv(call.gas).opcode(call.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushv_uses_shortest_push() {
        assert_eq!(Bytecode::new().pushv(0).build(), vec![0x60, 0x00]);
        assert_eq!(Bytecode::new().pushv(0xAB).build(), vec![0x60, 0xAB]);
        assert_eq!(
            Bytecode::new().pushv(0x0102).build(),
            vec![0x61, 0x01, 0x02]
        );
        assert_eq!(Bytecode::new().pushv(U256::MAX).build().len(), 33);
        assert_eq!(Bytecode::new().pushv(U256::MAX).build()[0], 0x7F);
    }

    #[test]
    fn repeat_concatenates() {
        assert_eq!(
            Bytecode::new().opcode(OpCode::POP).repeat(3).build(),
            vec![0x50, 0x50, 0x50]
        );
        assert!(Bytecode::new().opcode(OpCode::POP).repeat(0).is_empty());
    }

    #[test]
    fn call_instruction_operand_order() {
        let call: Bytecode = CallInstruction::call(0xAA)
            .gas(5)
            .value(7)
            .input(1, 2)
            .output(3, 4)
            .into();
        assert_eq!(
            call.build(),
            vec![0x60, 4, 0x60, 3, 0x60, 2, 0x60, 1, 0x60, 7, 0x60, 0xAA, 0x60, 5, 0xF1]
        );

        // No value slot for STATICCALL.
        let staticcall: Bytecode = CallInstruction::staticcall(0xAA).gas(5).into();
        let bytes = staticcall.build();
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes.last(), Some(&0xFA));
    }
}
