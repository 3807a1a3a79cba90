use core::cmp::Ordering;
use core::ops::{Div, Rem};
use ethereum_types::U256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
    NoSign,
}

/// Two's-complement view of a 256-bit word, as sign and magnitude.
///
/// Division by zero yields zero, and MIN / -1 wraps back to MIN, matching
/// EVM SDIV/SMOD semantics. The sign of a remainder follows the dividend.
#[derive(Clone, Copy, Debug, Eq)]
pub struct I256(pub Sign, pub U256);

const SIGN_BIT: U256 = U256([0, 0, 0, 0x8000_0000_0000_0000]);

impl I256 {
    pub fn new(sign: Sign, magnitude: U256) -> Self {
        if magnitude.is_zero() {
            Self(Sign::NoSign, magnitude)
        } else {
            Self(sign, magnitude)
        }
    }

    pub fn zero() -> Self {
        Self(Sign::NoSign, U256::zero())
    }

    fn is_negative(self) -> bool {
        self.0 == Sign::Minus
    }
}

impl From<U256> for I256 {
    fn from(value: U256) -> Self {
        if value.is_zero() {
            Self::zero()
        } else if value & SIGN_BIT == U256::zero() {
            Self(Sign::Plus, value)
        } else {
            Self(Sign::Minus, (!value).overflowing_add(U256::one()).0)
        }
    }
}

impl From<I256> for U256 {
    fn from(value: I256) -> Self {
        match value.0 {
            Sign::Plus | Sign::NoSign => value.1,
            Sign::Minus => (!value.1).overflowing_add(U256::one()).0,
        }
    }
}

impl PartialEq for I256 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for I256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for I256 {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_negative(), other.is_negative()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.1.cmp(&other.1),
            (true, true) => self.1.cmp(&other.1).reverse(),
        }
    }
}

impl Div for I256 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        if rhs.1.is_zero() {
            return Self::zero();
        }

        let magnitude = self.1 / rhs.1;
        let sign = if self.is_negative() != rhs.is_negative() {
            Sign::Minus
        } else {
            Sign::Plus
        };

        Self::new(sign, magnitude)
    }
}

impl Rem for I256 {
    type Output = Self;

    fn rem(self, rhs: Self) -> Self {
        if rhs.1.is_zero() {
            return Self::zero();
        }

        Self::new(self.0, self.1 % rhs.1)
    }
}
