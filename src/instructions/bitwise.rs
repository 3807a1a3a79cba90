use super::i256::{I256, Sign};
use crate::state::Stack;
use ethereum_types::U256;

#[inline]
pub(crate) fn byte(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();

    let ret = if a >= U256::from(32) {
        U256::zero()
    } else {
        // U256::byte indexes from the little end.
        U256::from(b.byte(31 - a.as_usize()))
    };

    stack.push(ret)
}

#[inline]
pub(crate) fn shl(stack: &mut Stack) {
    let shift = stack.pop();
    let value = stack.pop();

    let ret = if value.is_zero() || shift >= U256::from(256) {
        U256::zero()
    } else {
        value << shift.as_usize()
    };

    stack.push(ret)
}

#[inline]
pub(crate) fn shr(stack: &mut Stack) {
    let shift = stack.pop();
    let value = stack.pop();

    let ret = if value.is_zero() || shift >= U256::from(256) {
        U256::zero()
    } else {
        value >> shift.as_usize()
    };

    stack.push(ret)
}

#[inline]
pub(crate) fn sar(stack: &mut Stack) {
    let shift = stack.pop();
    let value = I256::from(stack.pop());

    let ret = if value == I256::zero() || shift >= U256::from(256) {
        match value.0 {
            // value is 0 or >=1, pushing 0
            Sign::Plus | Sign::NoSign => U256::zero(),
            // value is <0, pushing -1
            Sign::Minus => I256(Sign::Minus, U256::one()).into(),
        }
    } else {
        let shift = shift.as_usize();

        match value.0 {
            Sign::Plus | Sign::NoSign => value.1 >> shift,
            Sign::Minus => {
                let shifted = ((value.1.overflowing_sub(U256::one()).0) >> shift)
                    .overflowing_add(U256::one())
                    .0;
                I256(Sign::Minus, shifted).into()
            }
        }
    };

    stack.push(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run2(f: fn(&mut Stack), a: U256, b: U256) -> U256 {
        let mut stack = Stack::default();
        stack.push(b);
        stack.push(a);
        f(&mut stack);
        stack.pop()
    }

    #[test]
    fn byte_indexing() {
        let x = U256::from_big_endian(&{
            let mut b = [0u8; 32];
            b[0] = 0xAA;
            b[31] = 0xBB;
            b
        });
        assert_eq!(run2(byte, 0.into(), x), 0xAA.into());
        assert_eq!(run2(byte, 31.into(), x), 0xBB.into());
        assert_eq!(run2(byte, 32.into(), x), U256::zero());
    }

    #[test]
    fn oversized_shifts() {
        assert_eq!(run2(shl, 256.into(), 1.into()), U256::zero());
        assert_eq!(run2(shr, 256.into(), U256::MAX), U256::zero());
        // SAR of a negative value saturates to -1.
        assert_eq!(run2(sar, 256.into(), U256::MAX), U256::MAX);
        assert_eq!(run2(sar, 300.into(), 1.into()), U256::zero());
    }

    #[test]
    fn sar_rounds_toward_negative_infinity() {
        let minus = |v: u64| U256::zero().overflowing_sub(v.into()).0;
        assert_eq!(run2(sar, 1.into(), minus(5)), minus(3));
        assert_eq!(run2(sar, 1.into(), 5.into()), 2.into());
    }
}
