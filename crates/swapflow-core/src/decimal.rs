//! Precision-safe decimal types for token amounts and prices.
//!
//! Uses `rust_decimal` for exact decimal arithmetic; floating point never
//! touches an amount that ends up in call data.

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Largest decimals value whose scale factor still fits a `Decimal` mantissa.
const MAX_DECIMALS: u8 = 28;

/// Wei per native unit (1e18).
const WEI_DECIMALS: u32 = 18;

/// Token amount in display units (e.g. `1.5` ETH, not wei).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Value of this amount at the given unit price. `None` on overflow.
    #[inline]
    pub fn value_at(&self, price: Price) -> Option<Decimal> {
        self.0.checked_mul(price.0)
    }

    #[inline]
    pub fn checked_mul(&self, rhs: Decimal) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    /// `None` on division by zero or overflow.
    #[inline]
    pub fn checked_div(&self, rhs: Decimal) -> Option<Self> {
        self.0.checked_div(rhs).map(Self)
    }

    /// Convert to on-chain base units, truncating sub-unit dust.
    ///
    /// Returns `None` for negative amounts or when the scaled value does
    /// not fit the decimal mantissa.
    pub fn to_base_units(&self, decimals: u8) -> Option<U256> {
        if self.0.is_sign_negative() || decimals > MAX_DECIMALS {
            return None;
        }
        let scale = Decimal::from_i128_with_scale(10i128.pow(u32::from(decimals)), 0);
        let scaled = self.0.checked_mul(scale)?.trunc();
        scaled.to_u128().map(U256::from)
    }

    /// Build an amount from on-chain base units.
    pub fn from_base_units(units: U256, decimals: u8) -> Option<Self> {
        if decimals > MAX_DECIMALS {
            return None;
        }
        let raw: u128 = units.try_into().ok()?;
        let raw = i128::try_from(raw).ok()?;
        Decimal::try_from_i128_with_scale(raw, u32::from(decimals))
            .ok()
            .map(|d| Self(d.normalize()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Unit price in USD.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Percentage difference from another price.
    #[inline]
    pub fn pct_from(&self, other: Price) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        self.0
            .checked_sub(other.0)?
            .checked_div(other.0)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

/// Convert a wei quantity to native units (ETH, MATIC, ...).
pub fn wei_to_native(wei: u128) -> Option<Decimal> {
    let raw = i128::try_from(wei).ok()?;
    Decimal::try_from_i128_with_scale(raw, WEI_DECIMALS).ok()
}
