//! Bit operations over string values.
//!
//! Bit offsets are MSB-first within each byte: offset 0 is the high bit of
//! byte 0, the same layout Redis clients expect from `SETBIT`/`GETBIT`.

/// Highest bit offset accepted by `SETBIT` (strings are capped at 512MB).
pub const MAX_BIT_OFFSET: u64 = u32::MAX as u64;

#[inline]
fn locate(offset: u64) -> (usize, u8) {
    let byte = (offset / 8) as usize;
    let mask = 0x80u8 >> (offset % 8);
    (byte, mask)
}

/// Reads the bit at `offset`. Bits beyond the end read as 0.
pub fn get_bit(bytes: &[u8], offset: u64) -> u8 {
    let (byte, mask) = locate(offset);
    match bytes.get(byte) {
        Some(b) if b & mask != 0 => 1,
        _ => 0,
    }
}

/// Writes the bit at `offset`, growing `bytes` with zeros as needed.
///
/// # Returns
///
/// The previous value of the bit.
pub fn set_bit(bytes: &mut Vec<u8>, offset: u64, on: bool) -> u8 {
    let (byte, mask) = locate(offset);
    if bytes.len() <= byte {
        bytes.resize(byte + 1, 0);
    }

    let old = u8::from(bytes[byte] & mask != 0);
    if on {
        bytes[byte] |= mask;
    } else {
        bytes[byte] &= !mask;
    }
    old
}

/// Counts set bits between byte offsets `start` and `end`, inclusive.
///
/// Negative offsets count from the end; the range is clamped to the value.
pub fn count_ones(bytes: &[u8], start: i64, end: i64) -> u64 {
    let len = bytes.len() as i64;
    if len == 0 {
        return 0;
    }

    let start = if start < 0 { (start + len).max(0) } else { start };
    let end = if end < 0 { (end + len).max(0) } else { end.min(len - 1) };
    if start > end || start >= len {
        return 0;
    }

    bytes[start as usize..=end as usize]
        .iter()
        .map(|b| u64::from(b.count_ones()))
        .sum()
}

/// Operator for `BITOP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

impl BitOp {
    /// Parses an operator name, case-insensitively.
    pub fn parse(name: &[u8]) -> Option<Self> {
        match name.to_ascii_uppercase().as_slice() {
            b"AND" => Some(BitOp::And),
            b"OR" => Some(BitOp::Or),
            b"XOR" => Some(BitOp::Xor),
            b"NOT" => Some(BitOp::Not),
            _ => None,
        }
    }
}

/// Combines operands byte by byte.
///
/// Shorter operands are zero-padded to the longest one and an absent operand
/// behaves as an empty string. `Not` uses only the first operand.
pub fn bit_op(op: BitOp, operands: &[Option<&[u8]>]) -> Vec<u8> {
    let operand = |i: usize| operands.get(i).copied().flatten().unwrap_or(&[]);

    if op == BitOp::Not {
        return operand(0).iter().map(|b| !b).collect();
    }

    let width = operands.iter().flatten().map(|o| o.len()).max().unwrap_or(0);
    let byte_at = |o: &[u8], j: usize| o.get(j).copied().unwrap_or(0);

    (0..width)
        .map(|j| {
            let mut bytes = (0..operands.len()).map(|i| byte_at(operand(i), j));
            let first = bytes.next().unwrap_or(0);
            bytes.fold(first, |acc, b| match op {
                BitOp::And => acc & b,
                BitOp::Or => acc | b,
                BitOp::Xor => acc ^ b,
                BitOp::Not => acc,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_bits_msb_first() {
        let mut bytes = Vec::new();
        assert_eq!(set_bit(&mut bytes, 1, true), 0);
        assert_eq!(bytes, vec![0b0100_0000]);

        assert_eq!(set_bit(&mut bytes, 1, true), 1);
        assert_eq!(get_bit(&bytes, 1), 1);
        assert_eq!(get_bit(&bytes, 0), 0);
        assert_eq!(get_bit(&bytes, 1000), 0);

        assert_eq!(set_bit(&mut bytes, 17, true), 0);
        assert_eq!(bytes.len(), 3);

        assert_eq!(set_bit(&mut bytes, 1, false), 1);
        assert_eq!(bytes[0], 0);
    }

    #[test]
    fn test_count_ones_byte_ranges() {
        // "foobar"
        let bytes = b"foobar";
        assert_eq!(count_ones(bytes, 0, -1), 26);
        assert_eq!(count_ones(bytes, 0, 0), 4);
        assert_eq!(count_ones(bytes, 1, 1), 6);
        assert_eq!(count_ones(bytes, -2, -1), 7);
        assert_eq!(count_ones(bytes, 5, 100), 4);
        assert_eq!(count_ones(bytes, 4, 2), 0);
        assert_eq!(count_ones(b"", 0, -1), 0);
    }

    #[test]
    fn test_bit_op_pads_shorter_operands() {
        let a: &[u8] = &[0b1111_0000, 0xff];
        let b: &[u8] = &[0b1010_1010];

        assert_eq!(bit_op(BitOp::And, &[Some(a), Some(b)]), vec![0b1010_0000, 0x00]);
        assert_eq!(bit_op(BitOp::Or, &[Some(a), Some(b)]), vec![0b1111_1010, 0xff]);
        assert_eq!(bit_op(BitOp::Xor, &[Some(a), Some(b)]), vec![0b0101_1010, 0xff]);
        assert_eq!(bit_op(BitOp::And, &[Some(a), None]), vec![0, 0]);
        assert_eq!(bit_op(BitOp::Not, &[Some(b)]), vec![0b0101_0101]);
        assert!(bit_op(BitOp::Or, &[None, None]).is_empty());
    }

    #[test]
    fn test_parse_operator() {
        assert_eq!(BitOp::parse(b"and"), Some(BitOp::And));
        assert_eq!(BitOp::parse(b"Xor"), Some(BitOp::Xor));
        assert_eq!(BitOp::parse(b"nand"), None);
    }
}
