//! Sensor frame decoder
//!
//! A frame is a sequence of 16-bit big-endian ADC counts written as hex.
//! Each count maps to volts as `count * 3.3 / 4096`, rounded to two decimals
//! (half away from zero). The first four counts are a header and the last
//! one a trailer; only the samples between them are returned.

use thiserror::Error;

/// ADC reference voltage
pub const ADC_REFERENCE_VOLTS: f64 = 3.3;

/// ADC full-scale count (12-bit converter)
pub const ADC_FULL_SCALE: f64 = 4096.0;

/// Hex characters per sample
pub const HEX_CHARS_PER_SAMPLE: usize = 4;

/// Header samples stripped from the front of each frame
pub const HEADER_SAMPLES: usize = 4;

/// Trailer samples stripped from the end of each frame
pub const TRAILER_SAMPLES: usize = 1;

/// Frame decode errors. The offending message is discarded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("odd-length hex payload ({0} chars)")]
    OddLength(usize),

    #[error("invalid hex character {ch:?} at offset {offset}")]
    InvalidHex { ch: char, offset: usize },
}

/// Decode a hex frame into calibrated samples.
///
/// Any trailing group shorter than four characters is ignored. A frame with
/// fewer than six whole groups yields an empty vector.
pub fn decode(hex: &str) -> Result<Vec<f64>, DecodeError> {
    let raw = parse_counts(hex)?;

    if raw.len() < HEADER_SAMPLES + TRAILER_SAMPLES + 1 {
        return Ok(Vec::new());
    }

    Ok(raw[HEADER_SAMPLES..raw.len() - TRAILER_SAMPLES]
        .iter()
        .map(|&count| count_to_volts(count))
        .collect())
}

/// Lowercase hex encoding of a raw transport payload.
pub fn encode_payload(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Parse a hex payload back into bytes (captured frames, `raw_data` rows).
pub fn decode_payload(hex: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    if let Some((offset, ch)) = hex.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHex { ch, offset });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| (hex_value(pair[0]) << 4) | hex_value(pair[1]))
        .collect())
}

/// Convert one ADC count to volts, rounded to two decimals.
pub fn count_to_volts(count: u16) -> f64 {
    let volts = f64::from(count) * ADC_REFERENCE_VOLTS / ADC_FULL_SCALE;
    (volts * 100.0).round() / 100.0
}

fn parse_counts(hex: &str) -> Result<Vec<u16>, DecodeError> {
    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }

    // Validate everything, including a short trailing group that is dropped.
    if let Some((offset, ch)) = hex.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHex { ch, offset });
    }

    Ok(bytes
        .chunks_exact(HEX_CHARS_PER_SAMPLE)
        .map(|group| {
            group
                .iter()
                .fold(0u16, |acc, &c| (acc << 4) | u16::from(hex_value(c)))
        })
        .collect())
}

fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_frame_keeps_middle_five() {
        let frame = "0000".repeat(10);
        let samples = decode(&frame).unwrap();
        assert_eq!(samples, vec![0.0; 5]);
    }

    #[test]
    fn test_strips_header_and_trailer() {
        // header 4 x 0x0fff, body 0x0800 0x0100, trailer 0xffff
        let frame = format!("{}08000100ffff", "0fff".repeat(4));
        let samples = decode(&frame).unwrap();
        assert_eq!(samples, vec![1.65, 0.21]);
    }

    #[test]
    fn test_short_frames_are_empty_not_errors() {
        // 5 whole groups: 20 chars
        assert!(decode(&"0123".repeat(5)).unwrap().is_empty());
        assert!(decode("").unwrap().is_empty());
        // 6 groups: exactly one sample survives
        assert_eq!(decode(&"0000".repeat(6)).unwrap().len(), 1);
    }

    #[test]
    fn test_drop_counts_hold_for_longer_frames() {
        for groups in 6..40 {
            let frame = "0abc".repeat(groups);
            assert_eq!(decode(&frame).unwrap().len(), groups - 5);
        }
    }

    #[test]
    fn test_trailing_short_group_ignored() {
        let frame = format!("{}ab", "0000".repeat(7));
        assert_eq!(decode(&frame).unwrap().len(), 2);
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        // 0x0fff -> 3.2991943... -> 3.30
        assert_eq!(count_to_volts(0x0fff), 3.3);
        // 1241 -> 0.99982 -> 1.00
        assert_eq!(count_to_volts(1241), 1.0);
        // Max count is still finite and non-negative
        assert_eq!(count_to_volts(u16::MAX), 52.8);
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let lower = decode(&"0abc".repeat(8)).unwrap();
        let upper = decode(&"0ABC".repeat(8)).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        assert_eq!(decode("000"), Err(DecodeError::OddLength(3)));
        assert_eq!(
            decode("00000g00"),
            Err(DecodeError::InvalidHex { ch: 'g', offset: 5 })
        );
    }

    #[test]
    fn test_encode_payload_matches_decoder_input() {
        let bytes = [0x00, 0x0f, 0xab, 0xff];
        assert_eq!(encode_payload(&bytes), "000fabff");
        assert_eq!(encode_payload(&[]), "");
    }

    #[test]
    fn test_decode_payload_reverses_encoding() {
        let bytes = vec![0x00, 0x0f, 0xab, 0xff];
        assert_eq!(decode_payload(&encode_payload(&bytes)).unwrap(), bytes);
        assert_eq!(decode_payload("0A0b").unwrap(), vec![0x0a, 0x0b]);
        assert_eq!(decode_payload("abc"), Err(DecodeError::OddLength(3)));
    }
}
