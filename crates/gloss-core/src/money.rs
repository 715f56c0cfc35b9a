//! # Money Module
//!
//! Integer-cent money used for prices, costs, tax and commission.
//!
//! ## Rounding Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Percentages are basis points (1 bps = 0.01%)                           │
//! │                                                                         │
//! │    portion = (cents × bps + 5000) / 10000      (half rounds up)         │
//! │                                                                         │
//! │  Even splits never lose cents:                                          │
//! │    1000 ÷ 3 → [334, 333, 333]   (remainder goes to the first shares)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```rust
//! use gloss_core::money::Money;
//!
//! let price = Money::from_cents(50_000);
//! assert_eq!(price.portion_bps(1_000).cents(), 5_000); // 10%
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// A monetary value in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax on this amount.
    ///
    /// ## Example
    /// ```rust
    /// use gloss_core::money::Money;
    /// use gloss_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_cents(1000);
    /// let tax = subtotal.calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83); // 82.5 rounds up
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.portion_bps(rate.bps())
    }

    /// Returns `bps / 10000` of this amount, rounded half up.
    ///
    /// Uses i128 internally so large totals cannot overflow.
    pub fn portion_bps(&self, bps: u32) -> Money {
        let cents = (self.0 as i128 * bps as i128 + 5000).div_euclid(10000);
        Money(cents as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Splits the amount into `parts` shares that add back up exactly.
    ///
    /// ## Example
    /// ```rust
    /// use gloss_core::money::Money;
    ///
    /// let shares = Money::from_cents(1000).split_even(3);
    /// let cents: Vec<i64> = shares.iter().map(|m| m.cents()).collect();
    /// assert_eq!(cents, vec![334, 333, 333]);
    /// ```
    pub fn split_even(&self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }

        let n = parts as i64;
        let base = self.0.div_euclid(n);
        let remainder = self.0.rem_euclid(n) as usize;

        (0..parts)
            .map(|i| {
                if i < remainder {
                    Money(base + 1)
                } else {
                    Money(base)
                }
            })
            .collect()
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display. Operator-facing formatting lives in the shell.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
