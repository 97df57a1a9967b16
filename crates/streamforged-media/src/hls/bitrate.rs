//! Parsing of repeated `bitRate=<kbps>[@<w>x<h>]` request parameters.

use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use streamforged_common::Dimension;

static BIT_RATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(@(\d+)x(\d+))?$").expect("bitRate regex is valid")
});

/// One requested rendition: a bitrate with an optional frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRateSpec {
    pub kbps: u32,
    pub dimension: Option<Dimension>,
}

impl BitRateSpec {
    pub fn new(kbps: u32) -> Self {
        Self {
            kbps,
            dimension: None,
        }
    }

    pub fn with_dimension(mut self, width: u32, height: u32) -> Self {
        self.dimension = Some(Dimension::new(width, height));
        self
    }

    /// Advertised bandwidth in bits per second.
    pub fn bandwidth(&self) -> u64 {
        u64::from(self.kbps) * 1000
    }
}

impl FromStr for BitRateSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidBitRate(s.to_string());
        let caps = BIT_RATE_RE.captures(s.trim()).ok_or_else(invalid)?;

        let number = |i: usize| -> Result<Option<u32>> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u32>().map_err(|_| invalid()))
                .transpose()
        };

        let kbps = number(1)?.ok_or_else(invalid)?;
        let dimension = match (number(3)?, number(4)?) {
            (Some(w), Some(h)) => Some(Dimension::new(w, h)),
            _ => None,
        };

        Ok(Self { kbps, dimension })
    }
}

impl fmt::Display for BitRateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dimension {
            Some(d) => write!(f, "{}@{}", self.kbps, d),
            None => write!(f, "{}", self.kbps),
        }
    }
}

/// Parse every entry; any malformed entry fails the whole request.
pub fn parse_bit_rates<S: AsRef<str>>(values: &[S]) -> Result<Vec<BitRateSpec>> {
    values.iter().map(|v| v.as_ref().parse()).collect()
}
