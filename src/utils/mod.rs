//! 工具模块

pub mod ringbuf;

use std::num::ParseIntError;

/// 解析十进制或 `0x` 前缀的十六进制整数，允许负号和 `_` 分隔
pub fn parse_offset(s: &str) -> Result<i64, ParseIntError> {
    let cleaned = s.trim().replace('_', "");
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16)?,
        None => digits.parse::<i64>()?,
    };
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decimal_and_hex() {
        assert_eq!(parse_offset("42").unwrap(), 42);
        assert_eq!(parse_offset("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_offset("0X0FFF_FFFF").unwrap(), 0x0fff_ffff);
        assert_eq!(parse_offset("-1").unwrap(), -1);
        assert_eq!(parse_offset("-0x10").unwrap(), -16);
        assert!(parse_offset("llram").is_err());
    }
}
