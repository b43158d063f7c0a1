//! Ledger-native amounts.
//!
//! Prices are configured as decimal SOL strings (`"0.001"`) but every
//! comparison happens in lamports, the ledger's integer unit. No floating
//! point is involved anywhere.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Fractional digits of one SOL.
const SOL_DECIMALS: usize = 9;

/// Currency unit shown to payers.
pub const CURRENCY_UNIT: &str = "SOL";

/// An amount in lamports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lamports(u64);

impl Lamports {
    /// Zero lamports.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw lamport count.
    #[must_use]
    pub const fn new(lamports: u64) -> Self {
        Self(lamports)
    }

    /// Raw lamport count.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns true for a zero amount.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse a decimal SOL string such as `"0.001"` or `"2"`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` for signs, non-digits, more than nine
    /// fractional digits, or values that overflow a `u64` lamport count.
    pub fn from_sol_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let malformed = || Error::MalformedInput(format!("invalid SOL amount: {input:?}"));

        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(malformed());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
            || frac.len() > SOL_DECIMALS
        {
            return Err(malformed());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| malformed())?
        };
        let frac: u64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<SOL_DECIMALS$}");
            padded.parse().map_err(|_| malformed())?
        };

        whole
            .checked_mul(LAMPORTS_PER_SOL)
            .and_then(|l| l.checked_add(frac))
            .map(Self)
            .ok_or_else(malformed)
    }
}

impl From<u64> for Lamports {
    fn from(lamports: u64) -> Self {
        Self(lamports)
    }
}

impl FromStr for Lamports {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_sol_str(s)
    }
}

impl fmt::Display for Lamports {
    /// Formats as a decimal SOL value without trailing zeros.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / LAMPORTS_PER_SOL;
        let frac = self.0 % LAMPORTS_PER_SOL;
        if frac == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{frac:0>SOL_DECIMALS$}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl Serialize for Lamports {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lamports {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_sol_str(&raw).map_err(serde::de::Error::custom)
    }
}
