//! Fiat conversion rate seam.
//!
//! Gas estimates are surfaced to users in their payout currency, so the
//! monitor needs a conversion rate for the native token. Real deployments
//! plug in a live oracle; this crate ships a fixed-table stub.

use std::collections::HashMap;

/// Source of `base → quote` conversion rates.
pub trait RateOracle: Send + Sync {
    /// Units of `quote` per one unit of `base`, or `None` when the pair is
    /// unknown.
    fn rate(&self, base: &str, quote: &str) -> Option<f64>;
}

/// In-memory rate table. Lookups are case-insensitive; identical currencies
/// always resolve to 1.0.
#[derive(Debug, Clone)]
pub struct FixedRateOracle {
    rates: HashMap<(String, String), f64>,
}

impl FixedRateOracle {
    pub fn new() -> Self {
        FixedRateOracle {
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, base: &str, quote: &str, rate: f64) -> Self {
        self.rates
            .insert((base.to_uppercase(), quote.to_uppercase()), rate);
        self
    }
}

impl Default for FixedRateOracle {
    /// Placeholder rates for the currencies the transfer product quotes in.
    fn default() -> Self {
        FixedRateOracle::new()
            .with_rate("MNT", "USD", 0.65)
            .with_rate("MNT", "EUR", 0.60)
            .with_rate("MNT", "GBP", 0.51)
            .with_rate("MNT", "NGN", 975.0)
            .with_rate("MNT", "KES", 84.0)
            .with_rate("USDC", "USD", 1.0)
    }
}

impl RateOracle for FixedRateOracle {
    fn rate(&self, base: &str, quote: &str) -> Option<f64> {
        let base = base.to_uppercase();
        let quote = quote.to_uppercase();
        if base == quote {
            return Some(1.0);
        }
        self.rates.get(&(base, quote)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let oracle = FixedRateOracle::new().with_rate("MNT", "USD", 0.5);
        assert_eq!(oracle.rate("mnt", "usd"), Some(0.5));
    }

    #[test]
    fn identity_pairs_are_one() {
        let oracle = FixedRateOracle::new();
        assert_eq!(oracle.rate("USD", "USD"), Some(1.0));
    }

    #[test]
    fn unknown_pairs_are_none() {
        let oracle = FixedRateOracle::default();
        assert_eq!(oracle.rate("MNT", "JPY"), None);
    }
}
