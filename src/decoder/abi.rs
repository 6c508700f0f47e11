//! Minimal ABI helpers for ERC-20 metadata calls and Transfer values.

use std::str::FromStr;

use alloy_primitives::{hex, U256};
use rust_decimal::Decimal;

/// `decimals()`
pub const DECIMALS_SELECTOR: &str = "0x313ce567";
/// `symbol()`
pub const SYMBOL_SELECTOR: &str = "0x95d89b41";
/// `name()`
pub const NAME_SELECTOR: &str = "0x06fdde03";

/// Significant digits a `Decimal` mantissa can always hold.
const DECIMAL_DIGITS: usize = 28;

/// Reads the first 32-byte word as an unsigned integer.
pub fn decode_uint256(data: &str) -> Option<U256> {
    let cleaned = data.strip_prefix("0x").unwrap_or(data);
    let word = cleaned.get(..64)?;
    U256::from_str_radix(word, 16).ok()
}

/// Decodes a `string` return value, falling back to the legacy `bytes32`
/// encoding some older tokens (MKR, SAI) use for `symbol()` and `name()`.
pub fn decode_string(data: &str) -> Option<String> {
    let bytes = hex::decode(data.strip_prefix("0x").unwrap_or(data)).ok()?;

    let raw = match bytes.len() {
        0 => return None,
        32 => bytes,
        len if len >= 64 => {
            let offset = read_word_as_usize(&bytes, 0)?;
            let length = read_word_as_usize(&bytes, offset)?;
            let start = offset.checked_add(32)?;
            bytes.get(start..start.checked_add(length)?)?.to_vec()
        }
        _ => return None,
    };

    let text = String::from_utf8_lossy(&raw);
    let text = text.trim_matches(char::from(0)).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn read_word_as_usize(bytes: &[u8], at: usize) -> Option<usize> {
    let word = bytes.get(at..at.checked_add(32)?)?;
    if word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(tail)).ok()
}

/// Converts a raw integer token amount into token units.
///
/// Fractional digits beyond what a `Decimal` can hold are truncated. Returns
/// `None` when the integer part alone does not fit.
pub fn scale_amount(raw: U256, decimals: u8) -> Option<Decimal> {
    let digits = raw.to_string();
    let decimals = usize::from(decimals);

    let (int_part, frac_part) = if digits.len() > decimals {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        (int_part.to_string(), frac_part.to_string())
    } else {
        ("0".to_string(), format!("{digits:0>decimals$}"))
    };

    let int_significant = int_part.trim_start_matches('0').len();
    if int_significant > DECIMAL_DIGITS {
        return None;
    }

    let keep = frac_part
        .len()
        .min(DECIMAL_DIGITS - int_significant)
        .min(DECIMAL_DIGITS);
    let frac_part = frac_part[..keep].trim_end_matches('0');

    let rendered = if frac_part.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac_part}")
    };
    Decimal::from_str(&rendered).ok().map(|d| d.normalize())
}

#[cfg(test)]
pub(crate) mod encode {
    //! Encoders used to build canned `eth_call` responses in tests.

    pub fn uint256(value: u128) -> String {
        format!("0x{value:064x}")
    }

    pub fn string(value: &str) -> String {
        let bytes = value.as_bytes();
        let padded_len = bytes.len().div_ceil(32) * 32;
        let mut data = format!("{:064x}{:064x}", 32, bytes.len());
        let mut body: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        while body.len() < padded_len * 2 {
            body.push('0');
        }
        data.push_str(&body);
        format!("0x{data}")
    }

    pub fn bytes32(value: &str) -> String {
        let mut body: String = value.as_bytes().iter().map(|b| format!("{b:02x}")).collect();
        while body.len() < 64 {
            body.push('0');
        }
        format!("0x{body}")
    }
}
