//! Resource value objects
//!
//! Limits arrive as text such as `500m` (half a CPU) or `128Mi` (memory) and
//! are kept as exact milli-unit integers so conversions never lose precision.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Largest whole-unit value whose milli-unit form still fits in an `i64`
pub const MAX_MILLI_VALUE: i64 = i64::MAX / 1000;

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: [(&str, u32); 6] = [
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Resource quantity with milli-unit precision
///
/// # Example
/// ```
/// use vortex_core::Quantity;
///
/// let cpu: Quantity = "500m".parse().unwrap();
/// assert_eq!(cpu.milli_value(), 500);
/// assert_eq!(cpu.value(), 1);
///
/// let memory: Quantity = "128Mi".parse().unwrap();
/// assert_eq!(memory.value(), 134_217_728);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    milli: i128,
    text: String,
}

impl Quantity {
    /// Create from a milli-unit value (e.g. millicores)
    #[must_use]
    pub fn from_milli(milli: i64) -> Self {
        Self {
            milli: i128::from(milli),
            text: format!("{milli}m"),
        }
    }

    /// Create from a whole-unit value (e.g. bytes or cores)
    #[must_use]
    pub fn from_value(value: i64) -> Self {
        Self {
            milli: i128::from(value) * 1000,
            text: value.to_string(),
        }
    }

    /// Parse a quantity string
    ///
    /// # Errors
    /// Returns [`Error::InvalidQuantity`] for malformed text or values too
    /// large to represent
    pub fn parse(input: &str) -> Result<Self> {
        let text = input.trim();
        let invalid = |reason| Error::InvalidQuantity {
            input: input.to_string(),
            reason,
        };

        let split = text
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
            .unwrap_or(text.len());
        let (number, suffix) = text.split_at(split);

        let (negative, digits) = match number.as_bytes().first() {
            Some(b'-') => (true, &number[1..]),
            Some(b'+') => (false, &number[1..]),
            _ => (false, number),
        };

        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("missing number"));
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("malformed number"));
        }

        let numerator: i128 = format!("{whole}{fraction}")
            .parse()
            .map_err(|_| invalid("value too large"))?;
        let fraction_len = u32::try_from(fraction.len()).map_err(|_| invalid("value too large"))?;
        let denominator = 10_i128
            .checked_pow(fraction_len)
            .ok_or_else(|| invalid("value too large"))?;

        let multiplier = Self::milli_multiplier(suffix).ok_or_else(|| invalid("unknown suffix"))?;

        let scaled = numerator
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("value too large"))?;
        let signed = if negative { -scaled } else { scaled };
        let mut milli = signed.div_euclid(denominator);
        if signed.rem_euclid(denominator) != 0 {
            milli += 1;
        }

        Ok(Self {
            milli,
            text: text.to_string(),
        })
    }

    /// How many milli-units one unit of `suffix` is worth
    fn milli_multiplier(suffix: &str) -> Option<i128> {
        match suffix {
            "" => return Some(1000),
            "m" => return Some(1),
            _ => {}
        }

        if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
            return Some(1000 * (1_i128 << shift));
        }

        DECIMAL_SUFFIXES
            .iter()
            .find(|(s, _)| *s == suffix)
            .map(|(_, exp)| 10_i128.pow(exp + 3))
    }

    /// Value in milli-units
    #[must_use]
    pub const fn milli_value(&self) -> i128 {
        self.milli
    }

    /// Value in whole units, rounded up
    #[must_use]
    pub const fn value(&self) -> i128 {
        let whole = self.milli.div_euclid(1000);
        if self.milli.rem_euclid(1000) > 0 {
            whole + 1
        } else {
            whole
        }
    }

    /// Whether the quantity is below zero
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.milli < 0
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Quantity {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.text
    }
}

/// Per-application resource limits collected from the command line
///
/// Argument parsing fills one of these in through `&mut` setters; the
/// translator only ever reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU limit in cores (usually given in millicores, e.g. `500m`)
    pub cpu: Option<Quantity>,
    /// Memory limit in bytes
    pub memory: Option<Quantity>,
}

impl ResourceLimits {
    /// Create empty limits
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CPU limit
    pub fn set_cpu(&mut self, cpu: Quantity) -> &mut Self {
        self.cpu = Some(cpu);
        self
    }

    /// Set the memory limit
    pub fn set_memory(&mut self, memory: Quantity) -> &mut Self {
        self.memory = Some(memory);
        self
    }

    /// Whether no limit is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}
