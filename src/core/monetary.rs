/// Ledger monetary system
///
/// Amounts are fixed-point decimals with eight fractional digits, stored as
/// integer base units so replaying a chain never accumulates float error.
///
/// ## Units
/// - **Base unit**: 0.00000001 coin, the smallest representable amount
/// - **Coin**: 100,000,000 base units
/// - **Block reward**: `base_reward` halved every `halving_interval` blocks,
///   flooring toward zero; once it drops below one base unit it is zero
///
/// Number of base units in one coin
pub const UNITS_PER_COIN: u64 = 100_000_000;

/// Fractional digits in every rendered amount
pub const AMOUNT_DECIMALS: usize = 8;

/// An amount in base units
pub type Amount = u64;

use crate::error::{LedgerError, Result};

/// Render an amount with exactly eight fractional digits, e.g. `5.50000000`.
///
/// This is the encoding signed inside transaction payloads, so it must not
/// depend on locale or trim trailing zeros.
pub fn format_amount(units: Amount) -> String {
    format!(
        "{}.{:0width$}",
        units / UNITS_PER_COIN,
        units % UNITS_PER_COIN,
        width = AMOUNT_DECIMALS
    )
}

/// Render a signed balance the same way as [`format_amount`]
pub fn format_balance(units: i128) -> String {
    let magnitude = units.unsigned_abs();
    let per_coin = UNITS_PER_COIN as u128;
    let sign = if units < 0 { "-" } else { "" };
    format!(
        "{sign}{}.{:0width$}",
        magnitude / per_coin,
        magnitude % per_coin,
        width = AMOUNT_DECIMALS
    )
}

/// Parse a non-negative decimal with at most eight fractional digits.
pub fn parse_amount(text: &str) -> Result<Amount> {
    let text = text.trim();
    let invalid = || LedgerError::InvalidAmount(text.to_string());

    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > AMOUNT_DECIMALS {
        return Err(invalid());
    }

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| invalid())?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<width$}", width = AMOUNT_DECIMALS);
        padded.parse::<u64>().map_err(|_| invalid())?
    };

    whole_units
        .checked_mul(UNITS_PER_COIN)
        .and_then(|units| units.checked_add(fraction_units))
        .ok_or_else(invalid)
}

/// Coinbase reward for the block at `index`.
///
/// `base_reward / 2^floor(index / halving_interval)`, floored to whole base
/// units. Genesis (index 0) issues nothing.
pub fn block_reward(base_reward: Amount, halving_interval: u64, index: u64) -> Amount {
    if index < 1 || halving_interval == 0 {
        return 0;
    }
    let halvings = index / halving_interval;
    if halvings >= u64::BITS as u64 {
        return 0;
    }
    base_reward >> halvings
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Amount = 5 * UNITS_PER_COIN;

    #[test]
    fn test_format_always_has_eight_decimals() {
        assert_eq!(format_amount(5 * UNITS_PER_COIN), "5.00000000");
        assert_eq!(format_amount(50_000_000), "0.50000000");
        assert_eq!(format_amount(1), "0.00000001");
        assert_eq!(format_amount(0), "0.00000000");
    }

    #[test]
    fn test_format_negative_balance() {
        assert_eq!(format_balance(-150_000_000), "-1.50000000");
        assert_eq!(format_balance(400_000_000), "4.00000000");
    }

    #[test]
    fn test_parse_amounts() {
        assert_eq!(parse_amount("5").unwrap(), 500_000_000);
        assert_eq!(parse_amount("0.5").unwrap(), 50_000_000);
        assert_eq!(parse_amount(".25").unwrap(), 25_000_000);
        assert_eq!(parse_amount("1.23456789").unwrap(), 123_456_789);
        assert_eq!(parse_amount("7.").unwrap(), 700_000_000);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", ".", "-1", "1.234567891", "1,5", "abc", "1e3", "99999999999999999999"] {
            assert!(
                matches!(parse_amount(bad), Err(LedgerError::InvalidAmount(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_reward_halving_schedule() {
        assert_eq!(block_reward(BASE, 10, 0), 0);
        assert_eq!(block_reward(BASE, 10, 1), BASE);
        assert_eq!(block_reward(BASE, 10, 9), BASE);
        assert_eq!(block_reward(BASE, 10, 10), BASE / 2);
        assert_eq!(block_reward(BASE, 10, 25), BASE / 4);
    }

    #[test]
    fn test_reward_floors_to_zero() {
        // 5 coins = 500_000_000 units survives 28 halvings, not 29
        assert_eq!(block_reward(BASE, 1, 28), 1);
        assert_eq!(block_reward(BASE, 1, 29), 0);
        assert_eq!(block_reward(BASE, 1, 10_000), 0);
    }
}
