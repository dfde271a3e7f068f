//! ISO-8583 style Message Type Indicator.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A four digit, ASCII numeric Message Type Indicator such as `0210`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mti([u8; 4]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid MTI '{0}': expected 4 ASCII digits")]
pub struct InvalidMti(pub String);

impl Mti {
    /// Authorization response (pre-auth, balance inquiry).
    pub const AUTHORIZATION_RESPONSE: Mti = Mti(*b"0110");
    /// Financial transaction response (sale).
    pub const FINANCIAL_RESPONSE: Mti = Mti(*b"0210");
    /// Financial advice response (refund, pre-auth completion).
    pub const FINANCIAL_ADVICE_RESPONSE: Mti = Mti(*b"0230");
    /// Reversal response (void).
    pub const REVERSAL_RESPONSE: Mti = Mti(*b"0410");
    /// Administrative advice, used for results that ended in a system error.
    pub const SYSTEM_ERROR: Mti = Mti(*b"0620");

    pub fn as_str(&self) -> &str {
        // only ASCII digits are ever stored
        std::str::from_utf8(&self.0).unwrap_or("0000")
    }
}

impl FromStr for Mti {
    type Err = InvalidMti;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| InvalidMti(s.to_string()))?;
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(InvalidMti(s.to_string()));
        }
        Ok(Mti(bytes))
    }
}

impl fmt::Display for Mti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Mti {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Mti {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_digits() {
        let mti: Mti = "0210".parse().unwrap();
        assert_eq!(mti, Mti::FINANCIAL_RESPONSE);
        assert_eq!(mti.to_string(), "0210");
    }

    #[test]
    fn rejects_wrong_length_or_non_digits() {
        assert!("".parse::<Mti>().is_err());
        assert!("021".parse::<Mti>().is_err());
        assert!("02100".parse::<Mti>().is_err());
        assert!("02a0".parse::<Mti>().is_err());
        assert!(" 210".parse::<Mti>().is_err());
        // multi-byte chars must not sneak through the length check
        assert!("٠٢١٠".parse::<Mti>().is_err());
    }

    #[test]
    fn serde_uses_plain_string() {
        assert_eq!(serde_json::to_string(&Mti::REVERSAL_RESPONSE).unwrap(), "\"0410\"");
        let mti: Mti = serde_json::from_str("\"0110\"").unwrap();
        assert_eq!(mti, Mti::AUTHORIZATION_RESPONSE);
        assert!(serde_json::from_str::<Mti>("210").is_err());
    }
}
