use std::num::ParseIntError;

use crate::error::Result;
use crate::sections::AddressTranslator;
use crate::walker::Bound;

/// What the operator asked to extract, before any address is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub start: u64,
    pub end: Option<u64>,
    pub count: Option<u64>,
    pub format: String,
}

impl ExtractionRequest {
    /// Checks the end/count pair without touching the image.
    pub fn bound(&self) -> Result<Bound> {
        Bound::from_options(self.end, self.count)
    }

    /// Turns `start` and `end` into physical offsets. Values at or above the
    /// image base are translated, lower values are used as-is.
    pub fn resolve(&self, translator: &AddressTranslator<'_>) -> Result<(u64, Bound)> {
        let bound = match self.bound()? {
            Bound::End(end) => Bound::End(translator.resolve(end)?),
            count => count,
        };
        let start = translator.resolve(self.start)?;
        Ok((start, bound))
    }
}

/// Parses a hexadecimal address, with or without a `0x` prefix.
pub fn parse_hex(text: &str) -> std::result::Result<u64, ParseIntError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16)
}

/// Parses a count: hexadecimal when `0x`-prefixed, decimal otherwise.
pub fn parse_count(text: &str) -> std::result::Result<u64, ParseIntError> {
    if text.starts_with("0x") || text.starts_with("0X") {
        parse_hex(text)
    } else {
        text.parse()
    }
}
