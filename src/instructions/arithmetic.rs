use super::i256::I256;
use crate::{state::*, StatusCode};
use core::convert::TryInto;
use ethereum_types::{U256, U512};

pub(crate) fn add(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();
    stack.push(a.overflowing_add(b).0);
}

pub(crate) fn mul(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();
    stack.push(a.overflowing_mul(b).0);
}

pub(crate) fn sub(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();
    stack.push(a.overflowing_sub(b).0);
}

pub(crate) fn div(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();
    stack.push(if b.is_zero() { U256::zero() } else { a / b });
}

pub(crate) fn sdiv(stack: &mut Stack) {
    let a = I256::from(stack.pop());
    let b = I256::from(stack.pop());
    let v = a / b;
    stack.push(v.into());
}

pub(crate) fn modulo(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();
    let v = if b.is_zero() { U256::zero() } else { a % b };
    stack.push(v);
}

pub(crate) fn smod(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();

    let v = if b.is_zero() {
        U256::zero()
    } else {
        let v = I256::from(a) % I256::from(b);
        v.into()
    };

    stack.push(v);
}

pub(crate) fn addmod(stack: &mut Stack) {
    let a = U512::from(stack.pop());
    let b = U512::from(stack.pop());
    let c = U512::from(stack.pop());

    let v = if c.is_zero() {
        U256::zero()
    } else {
        let v = (a + b) % c;
        v.try_into().expect("modulus fits 256 bits")
    };

    stack.push(v);
}

pub(crate) fn mulmod(stack: &mut Stack) {
    let a = U512::from(stack.pop());
    let b = U512::from(stack.pop());
    let c = U512::from(stack.pop());

    let v = if c.is_zero() {
        U256::zero()
    } else {
        let v = (a * b) % c;
        v.try_into().expect("modulus fits 256 bits")
    };

    stack.push(v);
}

fn log2floor(value: U256) -> u64 {
    assert!(value != U256::zero());
    let mut l: u64 = 256;
    for i in 0..4 {
        let i = 3 - i;
        if value.0[i] == 0u64 {
            l -= 64;
        } else {
            l -= value.0[i].leading_zeros() as u64;
            if l == 0 {
                return l;
            } else {
                return l - 1;
            }
        }
    }
    l
}

pub(crate) fn exp(state: &mut ExecutionState) -> Result<(), StatusCode> {
    let mut base = state.stack.pop();
    let mut power = state.stack.pop();

    if !power.is_zero() {
        let byte_cost = state.evm_revision.rules().exp_byte_cost;
        let additional_gas = byte_cost * (log2floor(power) / 8 + 1) as i64;

        state.gas_left -= additional_gas;

        if state.gas_left < 0 {
            return Err(StatusCode::OutOfGas);
        }
    }

    let mut v = U256::one();

    while !power.is_zero() {
        if !(power & U256::one()).is_zero() {
            v = v.overflowing_mul(base).0;
        }
        power >>= 1;
        base = base.overflowing_mul(base).0;
    }

    state.stack.push(v);

    Ok(())
}

pub(crate) fn signextend(stack: &mut Stack) {
    let a = stack.pop();
    let b = stack.pop();

    let v = if a >= U256::from(31) {
        // The sign byte already is the top byte.
        b
    } else {
        let t = 8 * a.as_usize() + 7;
        let mask = (U256::one() << (t + 1)) - U256::one();
        if b & (U256::one() << t) != U256::zero() {
            b | !mask
        } else {
            b & mask
        }
    };

    stack.push(v);
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
    fn wrapping_add() {
        assert_eq!(run2(add, U256::MAX, 1.into()), U256::zero());
        assert_eq!(run2(add, U256::MAX, U256::MAX), U256::MAX - 1);
    }

    #[test]
    fn division_by_zero_is_zero() {
        assert_eq!(run2(div, 5.into(), U256::zero()), U256::zero());
        assert_eq!(run2(modulo, 5.into(), U256::zero()), U256::zero());
        assert_eq!(run2(sdiv, 5.into(), U256::zero()), U256::zero());
        assert_eq!(run2(smod, 5.into(), U256::zero()), U256::zero());
    }

    #[test]
    fn sdiv_smod_roundtrip() {
        // sdiv(a, b) * b + smod(a, b) == a, sign of remainder follows the
        // dividend.
        let minus = |v: u64| U256::zero().overflowing_sub(v.into()).0;
        for (a, b) in [
            (U256::from(17), U256::from(5)),
            (minus(17), U256::from(5)),
            (U256::from(17), minus(5)),
            (minus(17), minus(5)),
        ] {
            let q = run2(sdiv, a, b);
            let r = run2(smod, a, b);
            assert_eq!(
                q.overflowing_mul(b).0.overflowing_add(r).0,
                a,
                "a={a} b={b}"
            );
        }
    }

    #[test]
    fn signextend_cases() {
        assert_eq!(
            run2(signextend, 0.into(), 0xFF.into()),
            U256::MAX
        );
        assert_eq!(run2(signextend, 0.into(), 0x7F.into()), 0x7F.into());
        let wide = U256::from(0x1234).overflowing_mul(U256::from(1u64 << 32)).0;
        assert_eq!(run2(signextend, 31.into(), wide), wide);
        assert_eq!(run2(signextend, 100.into(), wide), wide);
    }

    #[test]
    fn addmod_mulmod_wide_intermediate() {
        let mut stack = Stack::default();
        // (MAX + MAX) % 7: the sum must not wrap before the reduction.
        stack.push(7.into());
        stack.push(U256::MAX);
        stack.push(U256::MAX);
        addmod(&mut stack);
        let expect = ((U512::from(U256::MAX) + U512::from(U256::MAX)) % U512::from(7)).as_u64();
        assert_eq!(stack.pop(), expect.into());
    }
}
