use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-point decimal with 8 decimal places, stored as a scaled integer.
///
/// Eight places cover the smallest unit of every supported currency
/// (satoshi for BTC); fiat amounts simply carry trailing zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount '{0}'")]
    Invalid(String),
    #[error("amount '{0}' has more than {max} decimal places", max = Amount::DECIMALS)]
    TooPrecise(String),
    #[error("amount '{0}' is out of range")]
    Overflow(String),
}

impl Amount {
    const DECIMALS: u32 = 8;
    const SCALE: i64 = 100_000_000;

    pub const ZERO: Amount = Amount(0);

    /// Convert a float, rounding to the nearest representable unit.
    /// Returns `None` for NaN, infinities and values out of range.
    pub fn from_float(value: f64) -> Option<Self> {
        let scaled = (value * Self::SCALE as f64).round();
        if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Amount(scaled as i64))
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    /// Whole units, e.g. `Amount::from_units(10)` is `10.00`. Saturates at
    /// the representable range; parse input that may be that large instead.
    pub fn from_units(units: i64) -> Self {
        Amount(units.saturating_mul(Self::SCALE))
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }
        let invalid = || AmountParseError::Invalid(s.to_string());
        let overflow = || AmountParseError::Overflow(s.to_string());

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > Self::DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(s.to_string()));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let frac_scaled: i64 = if frac.is_empty() {
            0
        } else {
            // right-pad to 8 digits: "5" -> 50000000
            let padding = 10_i64.pow(Self::DECIMALS - frac.len() as u32);
            frac.parse::<i64>().map_err(|_| invalid())? * padding
        };

        let value = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac_scaled))
            .ok_or_else(overflow)?;

        Ok(Amount(if negative { -value } else { value }))
    }
}

impl fmt::Display for Amount {
    /// At least two fractional digits, trailing zeros beyond that trimmed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = format!("{:08}", abs % Self::SCALE as u64);
        let trimmed = frac.trim_end_matches('0');
        let frac = if trimmed.len() < 2 { &frac[..2] } else { trimmed };
        write!(f, "{sign}{whole}.{frac}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Integer(i64),
            Float(f64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
            Repr::Integer(units) => units
                .checked_mul(Self::SCALE)
                .map(Amount)
                .ok_or_else(|| serde::de::Error::custom(format!("amount {units} is out of range"))),
            Repr::Float(value) => Amount::from_float(value)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid amount {value}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_whole_and_fractional() {
        assert_eq!("10".parse::<Amount>().unwrap(), Amount::from_units(10));
        assert_eq!("10.00".parse::<Amount>().unwrap(), Amount::from_units(10));
        assert_eq!("1.5".parse::<Amount>().unwrap(), Amount::from_scaled(150_000_000));
        assert_eq!("0.00000001".parse::<Amount>().unwrap(), Amount::from_scaled(1));
        assert_eq!(".25".parse::<Amount>().unwrap(), Amount::from_scaled(25_000_000));
    }

    #[test]
    fn parse_negative() {
        assert_eq!("-50.25".parse::<Amount>().unwrap(), Amount::from_scaled(-5_025_000_000));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("".parse::<Amount>(), Err(AmountParseError::Empty));
        assert!(matches!("abc".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("NaN".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("inf".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("1e5".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!(".".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
        assert!(matches!("1.2.3".parse::<Amount>(), Err(AmountParseError::Invalid(_))));
    }

    #[test]
    fn parse_rejects_excess_precision() {
        assert!(matches!(
            "0.000000001".parse::<Amount>(),
            Err(AmountParseError::TooPrecise(_))
        ));
    }

    #[test]
    fn parse_rejects_overflow() {
        assert!(matches!(
            "999999999999999999".parse::<Amount>(),
            Err(AmountParseError::Overflow(_))
        ));
    }

    #[test]
    fn from_float_rounds_and_rejects_non_finite() {
        assert_eq!(Amount::from_float(10.0), Some(Amount::from_units(10)));
        assert_eq!(Amount::from_float(0.123456789), Some(Amount::from_scaled(12_345_679)));
        assert_eq!(Amount::from_float(f64::NAN), None);
        assert_eq!(Amount::from_float(f64::INFINITY), None);
    }

    #[test]
    fn display_keeps_two_decimals_minimum() {
        assert_eq!(Amount::from_units(10).to_string(), "10.00");
        assert_eq!(Amount::from_scaled(150_000_000).to_string(), "1.50");
        assert_eq!(Amount::from_scaled(1).to_string(), "0.00000001");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
        assert_eq!(Amount::from_scaled(-5_025_000_000).to_string(), "-50.25");
    }

    #[test]
    fn serde_as_string_and_accepts_numbers() {
        let json = serde_json::to_string(&Amount::from_units(10)).unwrap();
        assert_eq!(json, "\"10.00\"");

        let parsed: Amount = serde_json::from_str("\"12.34\"").unwrap();
        assert_eq!(parsed, Amount::from_scaled(1_234_000_000));
        let parsed: Amount = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, Amount::from_units(7));
        let parsed: Amount = serde_json::from_str("0.5").unwrap();
        assert_eq!(parsed, Amount::from_scaled(50_000_000));
    }

    #[test]
    fn is_positive() {
        assert!(Amount::from_scaled(1).is_positive());
        assert!(!Amount::ZERO.is_positive());
        assert!(!Amount::from_scaled(-1).is_positive());
    }

    #[test]
    fn from_units_saturates() {
        assert_eq!(Amount::from_units(i64::MAX), Amount::from_scaled(i64::MAX));
        assert_eq!(Amount::from_units(i64::MIN), Amount::from_scaled(i64::MIN));
        assert_eq!(Amount::from_units(92_233_720_369).to_string(), "92233720368.54775807");
    }

    #[test]
    fn ordering() {
        assert!(Amount::from_scaled(-1) < Amount::ZERO);
        assert!(Amount::from_units(100) > "99.99999999".parse().unwrap());
    }
}
