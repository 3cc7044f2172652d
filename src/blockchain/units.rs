// src/blockchain/units.rs
//
// Argument grammar and decimal <-> raw integer conversion. Amounts never pass
// through floating point.

use std::str::FromStr;

use ethers_core::types::{Address, H256, U256};

use crate::blockchain::error::{ChainError, ChainResult};

/// Decimals of the native unit (MON).
pub const NATIVE_DECIMALS: u8 = 18;
pub const NATIVE_SYMBOL: &str = "MON";

/// Gwei has 9 decimals relative to wei.
pub const GWEI_DECIMALS: u8 = 9;

/// 10^77 is the largest power of ten that fits in a U256.
pub const MAX_DECIMALS: u8 = 77;

/// Parses a `0x`-prefixed, 40 hex digit address. Checksum casing is not enforced.
pub fn parse_address(input: &str) -> ChainResult<Address> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ChainError::invalid(format!("address '{}' must start with 0x", input)))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChainError::invalid(format!(
            "address '{}' must have exactly 40 hex digits after 0x",
            input
        )));
    }
    Address::from_str(digits).map_err(|e| ChainError::invalid(format!("address '{}': {}", input, e)))
}

/// Parses a `0x`-prefixed 32-byte transaction hash.
pub fn parse_tx_hash(input: &str) -> ChainResult<H256> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::invalid(format!("hash '{}' must start with 0x", input)))?;
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChainError::invalid(format!(
            "hash '{}' must have exactly 64 hex digits after 0x",
            input
        )));
    }
    H256::from_str(digits).map_err(|e| ChainError::invalid(format!("hash '{}': {}", input, e)))
}

/// `digits ( "." digits )?`
pub fn is_unsigned_decimal(input: &str) -> bool {
    let mut parts = input.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(whole) && frac.map_or(true, all_digits)
}

fn pow10(decimals: u8) -> ChainResult<U256> {
    if decimals > MAX_DECIMALS {
        return Err(ChainError::invalid(format!(
            "{} decimals is more than the supported maximum of {}",
            decimals, MAX_DECIMALS
        )));
    }
    Ok(U256::exp10(decimals as usize))
}

/// Converts a decimal string such as `"1.5"` into smallest units. More fractional
/// digits than `decimals` is an error rather than a silent rounding.
pub fn to_raw_units(amount: &str, decimals: u8) -> ChainResult<U256> {
    let amount = amount.trim();
    if !is_unsigned_decimal(amount) {
        return Err(ChainError::invalid(format!(
            "amount '{}' is not an unsigned decimal number",
            amount
        )));
    }
    let scale = pow10(decimals)?;
    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f.trim_end_matches('0')),
        None => (amount, ""),
    };
    if frac.len() > decimals as usize {
        return Err(ChainError::invalid(format!(
            "amount '{}' has more than {} decimal places",
            amount, decimals
        )));
    }

    let overflow = || ChainError::invalid(format!("amount '{}' is too large", amount));
    let whole = U256::from_dec_str(whole).map_err(|_| overflow())?;
    let frac_raw = if frac.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        U256::from_dec_str(&padded).map_err(|_| overflow())?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_raw))
        .ok_or_else(overflow)
}

/// Formats smallest units as a human decimal string with trailing zeros removed.
pub fn from_raw_units(raw: U256, decimals: u8) -> ChainResult<String> {
    let scale = pow10(decimals)?;
    let whole = raw / scale;
    let frac = raw % scale;
    if frac.is_zero() {
        return Ok(whole.to_string());
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    Ok(format!("{}.{}", whole, frac.trim_end_matches('0')))
}

/// Formatting for values already known to use supported decimals.
pub fn format_units_lossy(raw: U256, decimals: u8) -> String {
    from_raw_units(raw, decimals).unwrap_or_else(|_| raw.to_string())
}

/// Native amounts in MON.
pub fn format_mon(raw: U256) -> String {
    format_units_lossy(raw, NATIVE_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_grammar() {
        assert!(parse_address("0x374502FEDD31396e62388743645cD888C474fB2c").is_ok());
        assert!(parse_address("0x374502fedd31396e62388743645cd888c474fb2c").is_ok());
        assert!(parse_address("374502FEDD31396e62388743645cD888C474fB2c").is_err());
        assert!(parse_address("0x374502FEDD31396e62388743645cD888C474fB2").is_err());
        assert!(parse_address("0x374502FEDD31396e62388743645cD888C474fBzz").is_err());
    }

    #[test]
    fn addresses_compare_case_insensitively() {
        let a = parse_address("0x374502FEDD31396e62388743645cD888C474fB2c").unwrap();
        let b = parse_address("0x374502fedd31396e62388743645cd888c474fb2c").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn decimal_grammar() {
        for ok in ["0", "1", "1.5", "0.000001", "123456789.0"] {
            assert!(is_unsigned_decimal(ok), "{}", ok);
        }
        for bad in ["", ".5", "1.", "-1", "1e18", "1.2.3", " 1", "0x10", "1,5"] {
            assert!(!is_unsigned_decimal(bad), "{}", bad);
        }
    }

    #[test]
    fn converts_to_raw_units() {
        assert_eq!(to_raw_units("1", 18).unwrap(), U256::exp10(18));
        assert_eq!(to_raw_units("1.5", 18).unwrap(), U256::from(15u64) * U256::exp10(17));
        assert_eq!(to_raw_units("0.02", 18).unwrap(), U256::from(2u64) * U256::exp10(16));
        assert_eq!(to_raw_units("42", 0).unwrap(), U256::from(42u64));
        assert_eq!(to_raw_units("1.10", 1).unwrap(), U256::from(11u64));
        assert_eq!(to_raw_units("2.500000", 6).unwrap(), U256::from(2_500_000u64));
    }

    #[test]
    fn rejects_excess_precision_and_garbage() {
        assert!(matches!(to_raw_units("0.1234567", 6), Err(ChainError::InvalidArgument(_))));
        assert!(matches!(to_raw_units("1.5", 0), Err(ChainError::InvalidArgument(_))));
        assert!(matches!(to_raw_units("abc", 18), Err(ChainError::InvalidArgument(_))));
        assert!(matches!(to_raw_units("1", 78), Err(ChainError::InvalidArgument(_))));
    }

    #[test]
    fn formats_raw_units() {
        assert_eq!(from_raw_units(U256::zero(), 18).unwrap(), "0");
        assert_eq!(from_raw_units(U256::exp10(18), 18).unwrap(), "1");
        assert_eq!(from_raw_units(U256::from(2u64) * U256::exp10(16), 18).unwrap(), "0.02");
        assert_eq!(from_raw_units(U256::from(1u64), 18).unwrap(), "0.000000000000000001");
        assert_eq!(from_raw_units(U256::from(1_234_500u64), 6).unwrap(), "1.2345");
        assert_eq!(from_raw_units(U256::from(7u64), 0).unwrap(), "7");
    }

    #[test]
    fn conversion_round_trip_is_stable() {
        let cases = [
            ("0", 18u8),
            ("1", 18),
            ("0.01", 18),
            ("1.5", 18),
            ("123456789.123456789123456789", 18),
            ("0.000000000000000001", 18),
            ("1000000", 6),
            ("3.14", 2),
            ("7", 0),
            ("0.100", 3),
        ];
        for (amount, decimals) in cases {
            let raw = to_raw_units(amount, decimals).unwrap();
            let back = from_raw_units(raw, decimals).unwrap();
            assert_eq!(to_raw_units(&back, decimals).unwrap(), raw, "{} @ {}", amount, decimals);
        }
    }
}
