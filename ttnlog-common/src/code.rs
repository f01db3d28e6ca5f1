//! Shipment code (TTN) normalization
//!
//! A raw scan - from a barcode decoder or manual text entry - is reduced
//! to its digits and accepted only when the digit count falls inside the
//! configured length window. Everything else about a code (check digits,
//! carrier prefixes) is opaque to this service.

use crate::{Error, Result};

/// Accepted digit-count window for a normalized code.
///
/// The window is configuration, not a constant: the carrier policy has
/// moved between 8-18 and 10-18 digits over time. Current default is 10-18.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPolicy {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            min_len: 10,
            max_len: 18,
        }
    }
}

/// Normalize a raw scan into a canonical code.
///
/// Strips every non-digit character, then checks the remaining length
/// against `policy`. Returns `Error::InvalidCode` when the result is
/// empty or outside the window; callers processing a batch skip such
/// scans silently and report aggregate counts only.
pub fn normalize_code(raw: &str, policy: &LengthPolicy) -> Result<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() || digits.len() < policy.min_len || digits.len() > policy.max_len {
        return Err(Error::InvalidCode(raw.to_string()));
    }

    Ok(digits)
}
