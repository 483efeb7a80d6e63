use serde::Serialize;

use super::{
    CodecError, invalid_encoding,
    reader::{CompactSize, WireDecode, length_prefixed},
};

/// First byte of an output's script segment when it carries a token prefix
pub const PREFIX_TOKEN: u8 = 0xef;

const HAS_COMMITMENT_LENGTH: u8 = 0x40;
const HAS_NFT: u8 = 0x20;
const HAS_AMOUNT: u8 = 0x10;
const CAPABILITY_MASK: u8 = 0x0f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    None,
    Mutable,
    Minting,
}

/// Token data attached to an output ahead of its locking script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPrefix {
    pub category: [u8; 32],
    pub bitfield: u8,
    pub commitment: Option<Vec<u8>>,
    pub amount: Option<u64>,
}

impl TokenPrefix {
    /// Category id in the same byte order the node displays txids
    pub fn category_hex(&self) -> String {
        let mut reversed = self.category;
        reversed.reverse();
        hex::encode(reversed)
    }

    pub fn has_nft(&self) -> bool {
        self.bitfield & HAS_NFT != 0
    }

    pub fn capability(&self) -> Option<Capability> {
        if !self.has_nft() {
            return None;
        }

        match self.bitfield & CAPABILITY_MASK {
            0 => Some(Capability::None),
            1 => Some(Capability::Mutable),
            2 => Some(Capability::Minting),
            _ => None,
        }
    }
}

/// Split an output's length-prefixed segment into its optional token prefix
/// and the locking script that follows it.
pub fn split_segment(segment: &[u8]) -> Result<(Option<TokenPrefix>, &[u8]), CodecError> {
    let Some((&PREFIX_TOKEN, rest)) = segment.split_first() else {
        return Ok((None, segment));
    };

    let (category, rest) = <[u8; 32]>::decode(rest)
        .map_err(|e| invalid_encoding(format!("token category truncated: {e}")))?;

    let (bitfield, mut rest) = u8::decode(rest)
        .map_err(|e| invalid_encoding(format!("token bitfield missing: {e}")))?;

    let commitment = if bitfield & HAS_COMMITMENT_LENGTH != 0 {
        let (commitment, remaining) = length_prefixed(rest)?;
        rest = remaining;
        Some(commitment.to_vec())
    } else {
        None
    };

    let amount = if bitfield & HAS_AMOUNT != 0 {
        let (CompactSize(amount), remaining) = CompactSize::decode(rest)?;
        rest = remaining;
        Some(amount)
    } else {
        None
    };

    let prefix = TokenPrefix {
        category,
        bitfield,
        commitment,
        amount,
    };

    Ok((Some(prefix), rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_segment_has_no_prefix() {
        let script = [0x76, 0xa9, 0x14];

        let (prefix, rest) = split_segment(&script).unwrap();

        assert!(prefix.is_none());
        assert_eq!(rest, &script);
    }

    #[test]
    fn splits_nft_with_commitment_and_amount() {
        let mut segment = vec![PREFIX_TOKEN];
        segment.extend_from_slice(&[0x11; 32]);
        segment.push(HAS_COMMITMENT_LENGTH | HAS_NFT | HAS_AMOUNT | 0x02);
        segment.extend_from_slice(&[0x02, 0xbe, 0xef]);
        segment.extend_from_slice(&[0xfd, 0xe8, 0x03]);
        segment.extend_from_slice(&[0x51]);

        let (prefix, script) = split_segment(&segment).unwrap();
        let prefix = prefix.unwrap();

        assert_eq!(prefix.commitment, Some(vec![0xbe, 0xef]));
        assert_eq!(prefix.amount, Some(1000));
        assert_eq!(prefix.capability(), Some(Capability::Minting));
        assert_eq!(script, &[0x51]);
    }

    #[test]
    fn truncated_category_is_rejected() {
        let segment = [PREFIX_TOKEN, 0x01, 0x02];

        assert!(matches!(
            split_segment(&segment),
            Err(CodecError::InvalidEncoding(_))
        ));
    }
}
