use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;

/// Market classification of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Shanghai / Shenzhen listed shares (6-digit codes).
    AShare,
    /// Hong Kong listed shares (5-digit codes).
    HongKong,
    /// US listed shares (alphabetic tickers).
    Us,
    Other,
}

impl Market {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AShare => "a_share",
            Self::HongKong => "hong_kong",
            Self::Us => "us",
            Self::Other => "other",
        }
    }

    /// Maps a stored market label, either the snake_case name or a display
    /// label such as `A股`, `深市`, `港股` or `美股`.
    pub(crate) fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "a_share" | "A股" | "沪市" | "深市" => Some(Self::AShare),
            "hong_kong" | "港股" => Some(Self::HongKong),
            "us" | "美股" => Some(Self::Us),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "SZ" | "SH" | "SS" => Some(Self::AShare),
            "HK" => Some(Self::HongKong),
            "US" => Some(Self::Us),
            _ => None,
        }
    }

    fn from_code(code: &str) -> Self {
        let all_digits = code.chars().all(|ch| ch.is_ascii_digit());
        match code.len() {
            6 if all_digits => Self::AShare,
            5 if all_digits => Self::HongKong,
            _ if code.chars().all(|ch| ch.is_ascii_alphabetic()) => Self::Us,
            _ => Self::Other,
        }
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical instrument code with the market suffix stripped.
///
/// `000001.SZ`, `000001.sz` and `000001` all canonicalise to `000001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse, upper-case and strip the market suffix.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        Self::parse_with_market(input).map(|(symbol, _)| symbol)
    }

    /// Parse a raw code and classify its market from the suffix, or from the
    /// shape of the code when no suffix is present.
    pub fn parse_with_market(input: &str) -> Result<(Self, Market), ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let (code, suffix) = match normalized.split_once('.') {
            Some((code, suffix)) => (code, Some(suffix)),
            None => (normalized.as_str(), None),
        };

        if code.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let len = code.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in code.chars().enumerate() {
            if !(ch.is_ascii_alphanumeric() || ch == '-') {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        let market = suffix
            .and_then(Market::from_suffix)
            .unwrap_or_else(|| Market::from_code(code));

        Ok((Self(code.to_owned()), market))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
