/// Formats bytes the way packet dumps are printed: `0xF0, 0x79, 0xF7`.
pub fn format_as_hex(slice: &[u8]) -> String {
    slice
        .iter()
        .map(|byte| format!("0x{:02X}", byte))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Splits `value` in its 7-bit (LSB, MSB) pair.
pub fn to_7bit_pair(value: u32) -> [u8; 2] {
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

/// Combines a 7-bit (LSB, MSB) pair.
pub fn from_7bit_pair(lsb: u8, msb: u8) -> u16 {
    (lsb as u16 & 0x7F) | ((msb as u16 & 0x7F) << 7)
}

/// Decodes text sent as 14-bit (LSB, MSB) pairs, one character per pair.
///
/// A trailing unpaired byte is ignored, as are pairs that are not a valid character.
pub fn decode_7bit_string(bytes: &[u8]) -> String {
    bytes
        .chunks_exact(2)
        .map(|pair| from_7bit_pair(pair[0], pair[1]) as u32)
        .filter_map(char::from_u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_as_hex() {
        assert_eq!(format_as_hex(&[0xF0, 0x79, 0xF7]), "0xF0, 0x79, 0xF7");
        assert_eq!(format_as_hex(&[]), "");
    }

    #[test]
    fn test_7bit_pairs() {
        assert_eq!(to_7bit_pair(100), [0x64, 0x00]);
        assert_eq!(to_7bit_pair(1024), [0x00, 0x08]);
        assert_eq!(to_7bit_pair(0x3FFF), [0x7F, 0x7F]);
        // Bits above the 14th are not part of the pair.
        assert_eq!(to_7bit_pair(0x4001), [0x01, 0x00]);
        assert_eq!(from_7bit_pair(0x2A, 0x01), 170);
        assert_eq!(from_7bit_pair(0x7F, 0x7F), 0x3FFF);
    }

    #[test]
    fn test_decode_7bit_string() {
        assert_eq!(decode_7bit_string(&[0x48, 0x00, 0x69, 0x00]), "Hi");
        assert_eq!(decode_7bit_string(&[0x48, 0x00, 0x69]), "H");
        // 0xE9 spans both bytes of the pair.
        assert_eq!(decode_7bit_string(&[0x69, 0x01]), "\u{e9}");
        assert_eq!(decode_7bit_string(&[]), "");
    }
}
