//! Amount formatting — MNT denomination conversion and display helpers.
//!
//! MNT uses 18 decimal places (wei). 1 MNT = 10^18 wei. These helpers feed
//! user-facing messages and the API layer's amount parsing; raw wei values
//! never reach end users.

use num_format::{Locale, ToFormattedString};

pub const WEI_PER_MNT: u128 = 1_000_000_000_000_000_000;

/// Convert wei to a full-precision MNT string.
/// Examples: 1_500_000_000_000_000_000 -> "1.500000000000000000"
#[must_use]
pub fn wei_to_mnt(wei: u128) -> String {
    let whole = wei / WEI_PER_MNT;
    let frac = wei % WEI_PER_MNT;
    format!("{whole}.{frac:018}")
}

/// Format a wei amount for display, with trailing zeros trimmed.
/// Examples: 1.5 MNT -> "1.5 MNT", exactly 2 MNT -> "2 MNT"
#[must_use]
pub fn format_mnt(wei: u128) -> String {
    let full = wei_to_mnt(wei);
    let trimmed = full.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} MNT")
}

/// Format a fiat amount with thousands grouping and two decimals.
/// Examples: (1234.5, "USD") -> "1,234.50 USD"
#[must_use]
pub fn format_fiat(amount: f64, currency: &str) -> String {
    let cents = (amount * 100.0).round();
    let negative = cents < 0.0;
    let cents = cents.abs() as u128;
    let whole = (cents / 100).to_formatted_string(&Locale::en);
    let frac = cents % 100;
    let sign = if negative { "-" } else { "" };
    format!("{sign}{whole}.{frac:02} {currency}")
}

/// Parse a human-readable MNT amount string into wei.
/// Accepts: "1.5" -> 1_500_000_000_000_000_000, "1" -> 10^18, "0.001" -> 10^15
#[must_use = "parsing result should be checked"]
pub fn parse_mnt_amount(input: &str) -> Result<u128, String> {
    let input = input.trim();

    if input.is_empty() {
        return Err("Amount cannot be empty".to_string());
    }

    if input.starts_with('-') {
        return Err("Amount must be positive".to_string());
    }

    // Bare integers are treated as whole MNT, not wei.
    if let Ok(mnt) = input.parse::<u128>() {
        return mnt
            .checked_mul(WEI_PER_MNT)
            .ok_or_else(|| "Amount too large".to_string());
    }

    let parts: Vec<&str> = input.split('.').collect();
    if parts.len() > 2 {
        return Err("Invalid amount format. Use MNT units like '1.5' or '0.001'.".to_string());
    }

    let whole: u128 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid whole part: '{}'", parts[0]))?;

    let frac_wei = if parts.len() == 2 {
        let frac_str = parts[1];
        if frac_str.is_empty() {
            // Trailing dot: "1." is treated as "1.0"
            0
        } else {
            if frac_str.len() > 18 {
                return Err("Too many decimal places (max 18).".to_string());
            }
            if !frac_str.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("Invalid fractional part: '{frac_str}'"));
            }
            let padded = format!("{frac_str:0<18}");
            padded
                .parse::<u128>()
                .map_err(|_| format!("Invalid fractional part: '{frac_str}'"))?
        }
    } else {
        0
    };

    whole
        .checked_mul(WEI_PER_MNT)
        .and_then(|w| w.checked_add(frac_wei))
        .ok_or_else(|| "Amount too large".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_to_mnt_full_precision() {
        assert_eq!(wei_to_mnt(0), "0.000000000000000000");
        assert_eq!(wei_to_mnt(1_500_000_000_000_000_000), "1.500000000000000000");
        assert_eq!(wei_to_mnt(1), "0.000000000000000001");
    }

    #[test]
    fn format_mnt_trims_zeros() {
        assert_eq!(format_mnt(1_500_000_000_000_000_000), "1.5 MNT");
        assert_eq!(format_mnt(2 * WEI_PER_MNT), "2 MNT");
        assert_eq!(format_mnt(0), "0 MNT");
    }

    #[test]
    fn parse_round_trips() {
        assert_eq!(parse_mnt_amount("1.5"), Ok(1_500_000_000_000_000_000));
        assert_eq!(parse_mnt_amount("1"), Ok(WEI_PER_MNT));
        assert_eq!(parse_mnt_amount("0.001"), Ok(1_000_000_000_000_000));
        assert_eq!(parse_mnt_amount("1."), Ok(WEI_PER_MNT));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_mnt_amount("").is_err());
        assert!(parse_mnt_amount("-1").is_err());
        assert!(parse_mnt_amount("1.2.3").is_err());
        assert!(parse_mnt_amount("abc").is_err());
        assert!(parse_mnt_amount("0.0000000000000000001").is_err());
    }

    #[test]
    fn fiat_formatting_groups_thousands() {
        assert_eq!(format_fiat(1234.5, "USD"), "1,234.50 USD");
        assert_eq!(format_fiat(0.456, "EUR"), "0.46 EUR");
    }
}
