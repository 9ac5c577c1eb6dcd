//! Decimal helpers - total functions, never divide by zero

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{One, Zero};

/// Token amounts, prices and ratios. Never a float.
pub type Amount = BigDecimal;

/// Zero amount
pub fn zero() -> Amount {
    Amount::zero()
}

/// Largest allowance an ERC-20 approval can carry (2^256 - 1)
pub fn max_uint256() -> Amount {
    let max = (BigInt::one() << 256usize) - BigInt::one();
    Amount::new(max, 0)
}

/// Absent inputs count as zero
pub fn or_zero(amount: Option<&Amount>) -> Amount {
    amount.cloned().unwrap_or_else(zero)
}

/// True when the amount is present and not zero
pub fn is_nonzero(amount: Option<&Amount>) -> bool {
    amount.map_or(false, |a| !a.is_zero())
}

/// True when the amount is absent or zero
pub fn is_zero_or_none(amount: Option<&Amount>) -> bool {
    !is_nonzero(amount)
}

/// `Some(a) > b`, false when absent
pub fn gt_opt(amount: Option<&Amount>, bound: &Amount) -> bool {
    amount.map_or(false, |a| a > bound)
}

/// Subtract with saturation at 0
pub fn sub_floor(a: &Amount, b: &Amount) -> Amount {
    if b >= a {
        zero()
    } else {
        a - b
    }
}

/// Divide (returns 0 if divisor is 0)
pub fn div_or_zero(a: &Amount, b: &Amount) -> Amount {
    if b.is_zero() {
        zero()
    } else {
        a / b
    }
}

/// Minimum of two amounts
pub fn min_amount(a: &Amount, b: &Amount) -> Amount {
    if a <= b {
        a.clone()
    } else {
        b.clone()
    }
}
