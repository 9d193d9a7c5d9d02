//! Raw bulk-read responses to booleans.

use crate::config::RegisterType;
use crate::error::DecodeError;
use crate::transport::RawBlock;

/// Decode a raw response into exactly `count` booleans.
///
/// Bit responses are padded to a byte boundary on the wire, so extra bits are
/// dropped. A register is `true` when it is non-zero.
pub fn decode(kind: RegisterType, raw: &RawBlock, count: usize) -> Result<Vec<bool>, DecodeError> {
    if raw.len() < count {
        return Err(DecodeError::ShortRead {
            expected: count,
            actual: raw.len(),
        });
    }

    match (kind.is_bit(), raw) {
        (true, RawBlock::Bits(bits)) => Ok(bits[..count].to_vec()),
        (false, RawBlock::Words(words)) => Ok(words[..count].iter().map(|w| *w != 0).collect()),
        _ => Err(DecodeError::KindMismatch {
            kind,
            shape: raw.shape(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_coils() {
        let raw = RawBlock::Bits(vec![true, false, true, true]);
        let values = decode(RegisterType::Coil, &raw, 4).unwrap();
        assert_eq!(values, vec![true, false, true, true]);
    }

    #[test]
    fn test_decode_truncates_padding_bits() {
        let mut bits = vec![false; 8];
        bits[1] = true;
        bits[7] = true;
        let values = decode(RegisterType::Discrete, &RawBlock::Bits(bits), 3).unwrap();
        assert_eq!(values, vec![false, true, false]);
    }

    #[test]
    fn test_decode_registers_nonzero() {
        let raw = RawBlock::Words(vec![0, 5, 0xFFFF, 0]);
        let values = decode(RegisterType::Holding, &raw, 4).unwrap();
        assert_eq!(values, vec![false, true, true, false]);

        let values = decode(RegisterType::Input, &raw, 2).unwrap();
        assert_eq!(values, vec![false, true]);
    }

    #[test]
    fn test_decode_short_read() {
        let raw = RawBlock::Words(vec![1, 2]);
        let err = decode(RegisterType::Holding, &raw, 3).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ShortRead {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_decode_kind_mismatch() {
        let raw = RawBlock::Words(vec![1, 0]);
        let err = decode(RegisterType::Coil, &raw, 2).unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { shape: "word", .. }));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let raw = RawBlock::Words(vec![3, 0, 7]);
        assert_eq!(
            decode(RegisterType::Input, &raw, 3),
            decode(RegisterType::Input, &raw, 3)
        );
    }
}
