use super::{CodecError, invalid_encoding};

pub type WireResult<'a, T> = Result<(T, &'a [u8]), CodecError>;

/// Length-checked decoding of a value from the front of a byte slice,
/// returning the value and the unconsumed remainder.
pub trait WireDecode
where
    Self: Sized,
{
    fn decode(bytes: &[u8]) -> WireResult<Self>;
}

impl<const N: usize> WireDecode for [u8; N] {
    fn decode(bytes: &[u8]) -> WireResult<Self> {
        let (head, rest) = bytes
            .split_at_checked(N)
            .ok_or_else(|| insufficient(N, bytes))?;

        let array = <[u8; N]>::try_from(head).map_err(|_| insufficient(N, bytes))?;

        Ok((array, rest))
    }
}

impl WireDecode for u8 {
    fn decode(bytes: &[u8]) -> WireResult<Self> {
        bytes
            .split_first()
            .map(|(b, rest)| (*b, rest))
            .ok_or_else(|| insufficient(1, bytes))
    }
}

macro_rules! impl_le_decode {
    ($t:ty) => {
        impl WireDecode for $t {
            fn decode(bytes: &[u8]) -> WireResult<$t> {
                let (raw, rest) = <[u8; size_of::<$t>()]>::decode(bytes)?;

                Ok((<$t>::from_le_bytes(raw), rest))
            }
        }
    };
}

impl_le_decode!(u16);
impl_le_decode!(u32);
impl_le_decode!(u64);

/// Variable length integer used for counts and script lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSize(pub u64);

impl WireDecode for CompactSize {
    fn decode(bytes: &[u8]) -> WireResult<Self> {
        let (prefix, rest) = u8::decode(bytes)?;

        match prefix {
            0xfd => u16::decode(rest).map(|(v, rest)| (CompactSize(v.into()), rest)),
            0xfe => u32::decode(rest).map(|(v, rest)| (CompactSize(v.into()), rest)),
            0xff => u64::decode(rest).map(|(v, rest)| (CompactSize(v), rest)),
            n => Ok((CompactSize(n.into()), rest)),
        }
    }
}

pub fn take(bytes: &[u8], len: usize) -> WireResult<'_, &[u8]> {
    bytes
        .split_at_checked(len)
        .ok_or_else(|| insufficient(len, bytes))
}

/// A CompactSize length followed by that many bytes
pub fn length_prefixed(bytes: &[u8]) -> WireResult<'_, &[u8]> {
    let (CompactSize(len), rest) = CompactSize::decode(bytes)?;

    let len = usize::try_from(len)
        .map_err(|_| invalid_encoding(format!("length {len} does not fit in memory")))?;

    take(rest, len)
}

/// Caps a declared item count by what the remaining bytes could possibly
/// hold, so a hostile count cannot drive a huge allocation.
pub fn bounded_capacity(declared: u64, remaining: usize, min_item_len: usize) -> usize {
    let possible = remaining / min_item_len.max(1);

    usize::try_from(declared).map_or(possible, |d| d.min(possible))
}

fn insufficient(needed: usize, bytes: &[u8]) -> CodecError {
    invalid_encoding(format!(
        "need {needed} bytes, only {} remaining",
        bytes.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_integers() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xaa];

        let (value, rest) = u32::decode(&bytes).unwrap();

        assert_eq!(value, 0x04030201);
        assert_eq!(rest, &[0xaa]);
    }

    #[test]
    fn decodes_every_compact_size_width() {
        assert_eq!(CompactSize::decode(&[0xfc]).unwrap().0, CompactSize(0xfc));
        assert_eq!(
            CompactSize::decode(&[0xfd, 0x34, 0x12]).unwrap().0,
            CompactSize(0x1234)
        );
        assert_eq!(
            CompactSize::decode(&[0xfe, 0x78, 0x56, 0x34, 0x12]).unwrap().0,
            CompactSize(0x12345678)
        );
        assert_eq!(
            CompactSize::decode(&[0xff, 1, 0, 0, 0, 0, 0, 0, 0]).unwrap().0,
            CompactSize(1)
        );
    }

    #[test]
    fn truncated_input_is_an_encoding_error() {
        assert!(matches!(
            CompactSize::decode(&[0xfd, 0x01]),
            Err(CodecError::InvalidEncoding(_))
        ));
        assert!(matches!(
            length_prefixed(&[0x05, 1, 2]),
            Err(CodecError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn capacity_is_bounded_by_remaining_bytes() {
        assert_eq!(bounded_capacity(u64::MAX, 90, 9), 10);
        assert_eq!(bounded_capacity(3, 90, 9), 3);
    }
}
