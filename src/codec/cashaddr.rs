use std::{fmt, str::FromStr};

use super::CodecError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATORS: [u64; 5] = [
    0x98f2bc8e61,
    0x79b76d99e2,
    0xf33e5fb3c4,
    0xae2eabe2a8,
    0x1e4f43e470,
];
const CHECKSUM_LEN: usize = 8;
const HASH_SIZES: [usize; 8] = [20, 24, 28, 32, 40, 48, 56, 64];

/// Prefixes tried, in order, when an address is given without one
pub const KNOWN_PREFIXES: [&str; 3] = ["bitcoincash", "bchtest", "bchreg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    P2pkh,
    P2sh,
    TokenP2pkh,
    TokenP2sh,
    Unknown(u8),
}

impl AddressKind {
    fn from_type_bits(bits: u8) -> Self {
        match bits {
            0 => AddressKind::P2pkh,
            1 => AddressKind::P2sh,
            2 => AddressKind::TokenP2pkh,
            3 => AddressKind::TokenP2sh,
            other => AddressKind::Unknown(other),
        }
    }

    fn type_bits(self) -> u8 {
        match self {
            AddressKind::P2pkh => 0,
            AddressKind::P2sh => 1,
            AddressKind::TokenP2pkh => 2,
            AddressKind::TokenP2sh => 3,
            AddressKind::Unknown(bits) => bits,
        }
    }

    /// Same kind with the token-awareness flag dropped
    pub fn base(self) -> Self {
        match self {
            AddressKind::TokenP2pkh => AddressKind::P2pkh,
            AddressKind::TokenP2sh => AddressKind::P2sh,
            other => other,
        }
    }

    pub fn is_token_aware(self) -> bool {
        matches!(self, AddressKind::TokenP2pkh | AddressKind::TokenP2sh)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashAddress {
    pub prefix: String,
    pub kind: AddressKind,
    pub payload: Vec<u8>,
}

impl CashAddress {
    /// Decode with or without a network prefix. Prefixless input is tried
    /// against each of the known prefixes.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let text = text.trim();

        if text.contains(':') {
            return decode_with_prefix(text);
        }

        KNOWN_PREFIXES
            .iter()
            .find_map(|prefix| decode_with_prefix(&format!("{prefix}:{text}")).ok())
            .ok_or_else(|| invalid(format!("{text} does not match any known network prefix")))
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        let size_bits = HASH_SIZES
            .iter()
            .position(|&size| size == self.payload.len())
            .ok_or_else(|| invalid(format!("unsupported payload length {}", self.payload.len())))?;

        let mut versioned = Vec::with_capacity(self.payload.len() + 1);
        versioned.push((self.kind.type_bits() << 3) | size_bits as u8);
        versioned.extend_from_slice(&self.payload);

        let data = convert_bits(&versioned, 8, 5, true)
            .ok_or_else(|| invalid("payload could not be regrouped"))?;

        let checksum = polymod(
            prefix_values(&self.prefix)
                .chain(data.iter().copied())
                .chain([0u8; CHECKSUM_LEN]),
        );

        let mut encoded = String::with_capacity(self.prefix.len() + 1 + data.len() + CHECKSUM_LEN);
        encoded.push_str(&self.prefix);
        encoded.push(':');

        let checksum_values =
            (0..CHECKSUM_LEN).map(|i| ((checksum >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f) as u8);

        for value in data.iter().copied().chain(checksum_values) {
            encoded.push(CHARSET[value as usize] as char);
        }

        Ok(encoded)
    }
}

impl FromStr for CashAddress {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CashAddress::decode(s)
    }
}

impl fmt::Display for CashAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(encoded) => f.write_str(&encoded),
            Err(_) => write!(f, "{}:<{:?}>", self.prefix, self.kind),
        }
    }
}

fn decode_with_prefix(text: &str) -> Result<CashAddress, CodecError> {
    let has_lower = text.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = text.chars().any(|c| c.is_ascii_uppercase());

    if has_lower && has_upper {
        return Err(invalid("mixed case"));
    }

    let lowered = text.to_ascii_lowercase();

    let (prefix, data) = lowered
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing prefix separator"))?;

    if prefix.is_empty() || data.len() <= CHECKSUM_LEN {
        return Err(invalid("too short"));
    }

    let values = data
        .bytes()
        .map(|b| CHARSET.iter().position(|&c| c == b).map(|p| p as u8))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| invalid("character outside the base32 alphabet"))?;

    if polymod(prefix_values(prefix).chain(values.iter().copied())) != 0 {
        return Err(invalid("checksum mismatch"));
    }

    let bytes = convert_bits(&values[..values.len() - CHECKSUM_LEN], 5, 8, false)
        .ok_or_else(|| invalid("non-zero padding"))?;

    let (&version, hash) = bytes
        .split_first()
        .ok_or_else(|| invalid("missing version byte"))?;

    if version & 0x80 != 0 {
        return Err(invalid("reserved version bit set"));
    }

    let expected = HASH_SIZES[(version & 0x07) as usize];

    if hash.len() != expected {
        return Err(invalid(format!(
            "payload is {} bytes, version declares {expected}",
            hash.len()
        )));
    }

    Ok(CashAddress {
        prefix: prefix.to_string(),
        kind: AddressKind::from_type_bits((version >> 3) & 0x0f),
        payload: hash.to_vec(),
    })
}

fn prefix_values(prefix: &str) -> impl Iterator<Item = u8> + '_ {
    prefix.bytes().map(|b| b & 0x1f).chain([0u8])
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u64 {
    let mut c: u64 = 1;

    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(d);

        for (i, generator) in GENERATORS.iter().enumerate() {
            if c0 & (1 << i) != 0 {
                c ^= generator;
            }
        }
    }

    c ^ 1
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_value: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        let value = u32::from(value);

        if value >> from != 0 {
            return None;
        }

        acc = ((acc << from) | value) & max_acc;
        bits += from;

        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return None;
    }

    Some(out)
}

fn invalid<S: Into<String>>(msg: S) -> CodecError {
    CodecError::InvalidAddress(msg.into())
}
