//! Exact arithmetic over Kubernetes resource quantities.
//!
//! Quantities such as `500m`, `4Gi`, `1.5` or `2e3` are parsed into a signed
//! fixed-point value with nano-unit precision. Anything finer than a nano-unit
//! is rounded up, matching how the API server rounds quantities.

use core::error::Error;
use std::ops::Add;

use error_stack::bail;
use error_stack::Report;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Errors that can occur while parsing a quantity.
#[derive(Debug, derive_more::Display)]
pub enum QuantityError {
    #[display("Invalid quantity {value:?}: {reason}")]
    Invalid { value: String, reason: String },
    #[display("Quantity {value:?} is out of range")]
    OutOfRange { value: String },
}

impl Error for QuantityError {}

/// A parsed quantity expressed in nano-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParsedQuantity {
    nanos: i128,
}

impl ParsedQuantity {
    pub const ZERO: Self = Self { nanos: 0 };

    pub fn parse(quantity: &Quantity) -> Result<Self, Report<QuantityError>> {
        Self::parse_str(&quantity.0)
    }

    pub fn parse_str(value: &str) -> Result<Self, Report<QuantityError>> {
        let trimmed = value.trim();
        let invalid = |reason: &str| QuantityError::Invalid {
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let out_of_range = || QuantityError::OutOfRange {
            value: value.to_string(),
        };

        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            Some(_) => (false, trimmed),
            None => bail!(invalid("empty quantity")),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (integer, fraction) = match number.split_once('.') {
            Some((integer, fraction)) => (integer, fraction),
            None => (number, ""),
        };
        if fraction.contains('.') {
            bail!(invalid("more than one decimal point"));
        }
        if integer.is_empty() && fraction.is_empty() {
            bail!(invalid("missing digits"));
        }

        let mut mantissa: i128 = 0;
        for digit in integer.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(|| Report::new(out_of_range()))?;
        }
        let fraction_digits =
            i32::try_from(fraction.len()).map_err(|_| Report::new(out_of_range()))?;

        let (base, exponent) = parse_suffix(suffix).ok_or_else(|| {
            Report::new(invalid("unknown suffix")).attach_printable(format!("suffix: {suffix:?}"))
        })?;

        let nanos = match base {
            Base::Decimal => exponent
                .checked_add(9)
                .and_then(|exp| exp.checked_sub(fraction_digits))
                .and_then(|exp| scale_pow10(mantissa, exp)),
            Base::Binary => {
                let shifted = u32::try_from(exponent)
                    .ok()
                    .and_then(|exp| 2i128.checked_pow(exp))
                    .and_then(|factor| mantissa.checked_mul(factor));
                shifted.and_then(|m| scale_pow10(m, 9i32.checked_sub(fraction_digits)?))
            }
        }
        .ok_or_else(|| Report::new(out_of_range()))?;

        Ok(Self {
            nanos: if negative { -nanos } else { nanos },
        })
    }

    /// Value rounded up to whole units, so sub-unit amounts count as one unit.
    pub fn ceil_units(&self) -> i128 {
        div_ceil(self.nanos, NANOS_PER_UNIT)
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    /// Canonical quantity string: whole units when exact, otherwise the
    /// coarsest of `m`, `u` or `n` that represents the value without loss.
    pub fn to_quantity(&self) -> Quantity {
        let value = if self.nanos % NANOS_PER_UNIT == 0 {
            format!("{}", self.nanos / NANOS_PER_UNIT)
        } else if self.nanos % 1_000_000 == 0 {
            format!("{}m", self.nanos / 1_000_000)
        } else if self.nanos % 1_000 == 0 {
            format!("{}u", self.nanos / 1_000)
        } else {
            format!("{}n", self.nanos)
        };
        Quantity(value)
    }
}

impl Add for ParsedQuantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            nanos: self.nanos.saturating_add(rhs.nanos),
        }
    }
}

enum Base {
    Decimal,
    Binary,
}

fn parse_suffix(suffix: &str) -> Option<(Base, i32)> {
    let parsed = match suffix {
        "" => (Base::Decimal, 0),
        "n" => (Base::Decimal, -9),
        "u" => (Base::Decimal, -6),
        "m" => (Base::Decimal, -3),
        "k" => (Base::Decimal, 3),
        "M" => (Base::Decimal, 6),
        "G" => (Base::Decimal, 9),
        "T" => (Base::Decimal, 12),
        "P" => (Base::Decimal, 15),
        "E" => (Base::Decimal, 18),
        "Ki" => (Base::Binary, 10),
        "Mi" => (Base::Binary, 20),
        "Gi" => (Base::Binary, 30),
        "Ti" => (Base::Binary, 40),
        "Pi" => (Base::Binary, 50),
        "Ei" => (Base::Binary, 60),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            (Base::Decimal, exponent.parse::<i32>().ok()?)
        }
    };
    Some(parsed)
}

/// Multiplies by `10^exp`, rounding up when `exp` is negative.
fn scale_pow10(value: i128, exp: i32) -> Option<i128> {
    if exp >= 0 {
        let factor = 10i128.checked_pow(u32::try_from(exp).ok()?)?;
        value.checked_mul(factor)
    } else {
        match 10i128.checked_pow(exp.unsigned_abs()) {
            Some(divisor) => Some(div_ceil(value, divisor)),
            // The divisor exceeds any representable mantissa.
            None => Some(i128::from(value > 0)),
        }
    }
}

fn div_ceil(value: i128, divisor: i128) -> i128 {
    let quotient = value / divisor;
    if value % divisor != 0 && (value > 0) == (divisor > 0) {
        quotient + 1
    } else {
        quotient
    }
}
