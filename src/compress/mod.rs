//! Multi-pass text compression for chat messages.
//!
//! Rewrites message text to cut outbound token volume while keeping its
//! meaning and the message structure intact. Only textual content is touched:
//! a message's `content` string, or each `{"type": "text"}` part. Every other
//! part and field passes through unchanged.
//!
//! # Passes
//!
//! | Pass        | Level | Effect                                              |
//! |-------------|-------|-----------------------------------------------------|
//! | whitespace  | >= 1  | Collapse blank-line runs, trailing and double spaces |
//! | code_blocks | >= 2  | Strip comments and blank lines inside ``` fences    |
//! | dedup       | >= 2  | Replace repeated 3-line windows with a marker       |
//! | abbreviate  | >= 3  | Shorten verbose stock phrases                       |
//!
//! Level 0 is strict passthrough.
//!
//! # Usage
//!
//! ```rust,ignore
//! use aip::compress::{CompressionLevel, TextCompressor};
//!
//! let compressor = TextCompressor::new(CompressionLevel::Aggressive);
//! let out = compressor.compress_text("In order to fix this, due to the fact that it is broken.");
//! assert_eq!(out, "To fix this, Because it is broken.");
//! ```

mod engine;
mod passes;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use engine::{Savings, TextCompressor};
pub use passes::{
    default_passes, AbbreviationPass, CodeBlockPass, DedupPass, TextPass, WhitespacePass,
};

/// Compression aggressiveness
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum CompressionLevel {
    /// No rewriting at all
    Off = 0,
    /// Whitespace normalization only
    Light = 1,
    /// Whitespace, code blocks and duplicate elision
    #[default]
    Balanced = 2,
    /// Everything, plus phrase abbreviation
    Aggressive = 3,
}

impl CompressionLevel {
    /// Whether this level leaves text untouched
    pub fn is_off(self) -> bool {
        self == CompressionLevel::Off
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionLevel::Off),
            1 => Ok(CompressionLevel::Light),
            2 => Ok(CompressionLevel::Balanced),
            3 => Ok(CompressionLevel::Aggressive),
            other => Err(format!("compression level must be 0-3, got {other}")),
        }
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> Self {
        level as u8
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(CompressionLevel::Off),
            "light" => Ok(CompressionLevel::Light),
            "balanced" => Ok(CompressionLevel::Balanced),
            "aggressive" => Ok(CompressionLevel::Aggressive),
            other => other
                .parse::<u8>()
                .map_err(|_| format!("unknown compression level: {other}"))
                .and_then(CompressionLevel::try_from),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionLevel::Off => "off",
            CompressionLevel::Light => "light",
            CompressionLevel::Balanced => "balanced",
            CompressionLevel::Aggressive => "aggressive",
        };
        write!(f, "{} ({})", u8::from(*self), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(CompressionLevel::Off < CompressionLevel::Light);
        assert!(CompressionLevel::Balanced >= CompressionLevel::Light);
        assert!(CompressionLevel::Aggressive > CompressionLevel::Balanced);
        assert!(CompressionLevel::Off.is_off());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("0".parse::<CompressionLevel>(), Ok(CompressionLevel::Off));
        assert_eq!("3".parse::<CompressionLevel>(), Ok(CompressionLevel::Aggressive));
        assert_eq!("Light".parse::<CompressionLevel>(), Ok(CompressionLevel::Light));
        assert!("4".parse::<CompressionLevel>().is_err());
        assert!("max".parse::<CompressionLevel>().is_err());
    }

    #[test]
    fn test_level_serde_as_integer() {
        let json = serde_json::to_string(&CompressionLevel::Balanced).unwrap();
        assert_eq!(json, "2");
        let level: CompressionLevel = serde_json::from_str("1").unwrap();
        assert_eq!(level, CompressionLevel::Light);
        assert!(serde_json::from_str::<CompressionLevel>("9").is_err());
    }
}
