use crate::errors::{IndexerError, Result};

pub fn convert_hex_string_to_i64(hex_string: &str) -> Result<i64> {
    i64::from_str_radix(hex_string.trim_start_matches("0x"), 16)
        .map_err(|e| IndexerError::rpc_data("quantity", format!("'{hex_string}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_hex_string_to_i64() {
        assert_eq!(convert_hex_string_to_i64("0x1a2b3c").unwrap(), 1_715_004);
        assert_eq!(convert_hex_string_to_i64("1a2b3c").unwrap(), 1_715_004);
        assert_eq!(convert_hex_string_to_i64("0x0").unwrap(), 0);
    }

    #[test]
    fn test_convert_hex_string_to_i64_invalid() {
        assert!(convert_hex_string_to_i64("0xGHIJ").is_err());
        assert!(convert_hex_string_to_i64("").is_err());
        assert!(convert_hex_string_to_i64("0x").is_err());
    }
}
