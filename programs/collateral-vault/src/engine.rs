use solana_program::program_error::ProgramError;

use crate::{
    error::VaultError,
    state::{Position, Registry},
};

/// Fixed point base for all USD values and health factors (18 decimals)
pub const PRECISION: u128 = 1_000_000_000_000_000_000;
/// Price feeds publish USD prices with 8 decimals
pub const FEED_PRECISION: u128 = 100_000_000;
/// Rescales an 8-decimal feed price to the 1e18 base
pub const ADDITIONAL_FEED_PRECISION: u128 = 10_000_000_000;
/// Share of nominal collateral value that counts toward solvency (percent)
pub const LIQUIDATION_THRESHOLD: u128 = 50;
pub const LIQUIDATION_PRECISION: u128 = 100;
/// Extra collateral seized by a liquidator, as a percent of the covered amount
pub const LIQUIDATION_BONUS: u128 = 10;
/// Minimum health factor for an account with outstanding debt
pub const MIN_HEALTH_FACTOR: u128 = PRECISION;

/// Pure solvency and price-conversion math
pub struct SolvencyEngine;

impl SolvencyEngine {
    /// Feed price rescaled to the 1e18 base
    pub fn scaled_price(feed_price: u64) -> Result<u128, ProgramError> {
        (feed_price as u128)
            .checked_mul(ADDITIONAL_FEED_PRECISION)
            .ok_or_else(|| VaultError::ArithmeticOverflow.into())
    }

    /// USD value (1e18 fixed point) of `amount` base units of a collateral
    pub fn usd_value(feed_price: u64, amount: u64, decimals: u8) -> Result<u128, ProgramError> {
        let price = Self::scaled_price(feed_price)?;
        mul_div(price, amount as u128, base_unit(decimals)?)
            .ok_or_else(|| VaultError::ArithmeticOverflow.into())
    }

    /// Designed inverse of `usd_value`, exact up to integer truncation
    pub fn token_amount_from_usd(
        feed_price: u64,
        usd_amount: u128,
        decimals: u8,
    ) -> Result<u64, ProgramError> {
        let price = Self::scaled_price(feed_price)?;
        let amount =
            mul_div(usd_amount, base_unit(decimals)?, price).ok_or(VaultError::ArithmeticOverflow)?;
        u64::try_from(amount).map_err(|_| VaultError::ArithmeticOverflow.into())
    }

    /// Debt units normalized to the 1e18 USD scale (one whole unit is one dollar)
    pub fn debt_value_usd(minted_debt: u64, debt_decimals: u8) -> Result<u128, ProgramError> {
        mul_div(minted_debt as u128, PRECISION, base_unit(debt_decimals)?)
            .ok_or_else(|| VaultError::ArithmeticOverflow.into())
    }

    /// Health factor from aggregate collateral value and normalized debt.
    /// Zero debt is infinite headroom on every code path.
    pub fn health_factor(
        collateral_value_usd: u128,
        debt_value_usd: u128,
    ) -> Result<u128, ProgramError> {
        if debt_value_usd == 0 {
            return Ok(u128::MAX);
        }
        let adjusted = mul_div(
            collateral_value_usd,
            LIQUIDATION_THRESHOLD,
            LIQUIDATION_PRECISION,
        )
        .ok_or(VaultError::ArithmeticOverflow)?;
        // A factor past u128::MAX is indistinguishable from infinite headroom
        Ok(mul_div(adjusted, PRECISION, debt_value_usd).unwrap_or(u128::MAX))
    }

    /// Aggregate USD value of every registered collateral held by `position`.
    /// `prices` must be in registry order.
    pub fn total_collateral_value(
        registry: &Registry,
        position: &Position,
        prices: &[u64],
    ) -> Result<u128, ProgramError> {
        if prices.len() != registry.collaterals.len() {
            return Err(VaultError::OracleMismatch.into());
        }
        let mut total: u128 = 0;
        for (config, price) in registry.collaterals.iter().zip(prices) {
            let amount = position.collateral_of(&config.mint);
            if amount == 0 {
                continue;
            }
            let value = Self::usd_value(*price, amount, config.decimals)?;
            total = total
                .checked_add(value)
                .ok_or(VaultError::ArithmeticOverflow)?;
        }
        Ok(total)
    }

    /// Health factor of `position` under the given prices
    pub fn health_factor_of(
        registry: &Registry,
        position: &Position,
        prices: &[u64],
    ) -> Result<u128, ProgramError> {
        let collateral_value = Self::total_collateral_value(registry, position, prices)?;
        let debt_value = Self::debt_value_usd(position.minted_debt, registry.debt_decimals)?;
        Self::health_factor(collateral_value, debt_value)
    }

    /// Account summary: (minted debt, total collateral value in USD)
    pub fn account_info(
        registry: &Registry,
        position: &Position,
        prices: &[u64],
    ) -> Result<(u64, u128), ProgramError> {
        let collateral_value = Self::total_collateral_value(registry, position, prices)?;
        Ok((position.minted_debt, collateral_value))
    }

    /// Collateral seized when covering `debt_value_usd` at the given price:
    /// returns (oracle-converted base amount, base plus the liquidation bonus)
    pub fn seizure_for_debt(
        feed_price: u64,
        decimals: u8,
        debt_value_usd: u128,
    ) -> Result<(u64, u64), ProgramError> {
        let base = Self::token_amount_from_usd(feed_price, debt_value_usd, decimals)?;
        let bonus = (base as u128)
            .checked_mul(LIQUIDATION_BONUS)
            .ok_or(VaultError::ArithmeticOverflow)?
            / LIQUIDATION_PRECISION;
        let total = base
            .checked_add(bonus as u64)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok((base, total))
    }
}

/// 10^decimals, the base-unit scale of a mint
fn base_unit(decimals: u8) -> Result<u128, ProgramError> {
    10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| VaultError::ArithmeticOverflow.into())
}

const U64_MASK: u128 = (1u128 << 64) - 1;

/// Full 128x128 product as (high, low) halves
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let a_hi = a >> 64;
    let a_lo = a & U64_MASK;
    let b_hi = b >> 64;
    let b_lo = b & U64_MASK;

    let lo_lo = a_lo * b_lo;
    let hi_lo = a_hi * b_lo;
    let lo_hi = a_lo * b_hi;
    let hi_hi = a_hi * b_hi;

    let mid = (lo_lo >> 64) + (hi_lo & U64_MASK) + (lo_hi & U64_MASK);
    let low = (mid << 64) | (lo_lo & U64_MASK);
    let high = hi_hi + (hi_lo >> 64) + (lo_hi >> 64) + (mid >> 64);
    (high, low)
}

/// a * b / divisor with a 256-bit intermediate. None on a zero divisor or a
/// quotient that does not fit in 128 bits.
fn mul_div(a: u128, b: u128, divisor: u128) -> Option<u128> {
    if divisor == 0 {
        return None;
    }
    let (high, low) = mul_wide(a, b);
    if high == 0 {
        return Some(low / divisor);
    }
    if high >= divisor {
        return None;
    }
    // Shift-subtract long division over the low half; the running remainder
    // stays below the divisor, so the 129-bit doubling fits via the carry bit
    let mut remainder = high;
    let mut quotient: u128 = 0;
    for shift in (0..128).rev() {
        let carry = remainder >> 127;
        remainder = (remainder << 1) | ((low >> shift) & 1);
        if carry == 1 || remainder >= divisor {
            remainder = remainder.wrapping_sub(divisor);
            quotient |= 1 << shift;
        }
    }
    Some(quotient)
}
