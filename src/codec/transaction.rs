use bitcoin::{
    Amount, OutPoint, ScriptBuf, Txid,
    hashes::{Hash, sha256d},
};

use super::{
    CodecError, invalid_encoding,
    reader::{CompactSize, WireDecode, bounded_capacity, length_prefixed},
    token::{TokenPrefix, split_segment},
};

// prev txid + vout + empty script + sequence
const MIN_INPUT_LEN: usize = 32 + 4 + 1 + 4;
// value + empty script
const MIN_OUTPUT_LEN: usize = 8 + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInput {
    pub prev_txid: Txid,
    pub prev_vout: u32,
}

impl DecodedInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.prev_txid, self.prev_vout)
    }

    pub fn is_coinbase(&self) -> bool {
        self.prev_txid == Txid::all_zeros() && self.prev_vout == u32::MAX
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOutput {
    pub value: Amount,
    pub locking_script: ScriptBuf,
    pub token: Option<TokenPrefix>,
}

impl DecodedOutput {
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub txid: Txid,
    pub version: u32,
    pub inputs: Vec<DecodedInput>,
    pub outputs: Vec<DecodedOutput>,
    pub lock_time: u32,
    pub size: usize,
}

impl DecodedTransaction {
    /// Sum of the output values; a total past the amount range is an
    /// encoding error
    pub fn total_output(&self) -> Result<Amount, CodecError> {
        self.outputs.iter().try_fold(Amount::ZERO, |acc, o| {
            acc.checked_add(o.value)
                .ok_or_else(|| invalid_encoding("output values overflow"))
        })
    }

    pub fn has_tokens(&self) -> bool {
        self.outputs.iter().any(DecodedOutput::has_token)
    }
}

/// Txid of a legacy-serialized transaction: double-SHA256 of the bytes,
/// displayed byte-reversed.
pub fn compute_txid(bytes: &[u8]) -> Txid {
    Txid::from_raw_hash(sha256d::Hash::hash(bytes))
}

/// Decode a transaction in the legacy (non-witness) serialization, splitting
/// token prefixes off output scripts. Trailing bytes are rejected.
pub fn decode_transaction(bytes: &[u8]) -> Result<DecodedTransaction, CodecError> {
    let (version, rest) = u32::decode(bytes)?;

    if let [0x00, flag, ..] = rest {
        if *flag != 0x00 {
            return Err(CodecError::UnsupportedFormat(
                "segregated witness serialization".into(),
            ));
        }
    }

    let (CompactSize(input_count), mut rest) = CompactSize::decode(rest)?;
    let mut inputs = Vec::with_capacity(bounded_capacity(input_count, rest.len(), MIN_INPUT_LEN));

    for _ in 0..input_count {
        let (prev_hash, r) = <[u8; 32]>::decode(rest)?;
        let (prev_vout, r) = u32::decode(r)?;
        let (_script_sig, r) = length_prefixed(r)?;
        let (_sequence, r) = u32::decode(r)?;
        rest = r;

        inputs.push(DecodedInput {
            prev_txid: Txid::from_byte_array(prev_hash),
            prev_vout,
        });
    }

    let (CompactSize(output_count), r) = CompactSize::decode(rest)?;
    rest = r;
    let mut outputs =
        Vec::with_capacity(bounded_capacity(output_count, rest.len(), MIN_OUTPUT_LEN));

    for _ in 0..output_count {
        let (sats, r) = u64::decode(rest)?;
        let (segment, r) = length_prefixed(r)?;
        rest = r;

        let (token, script) = split_segment(segment)?;

        outputs.push(DecodedOutput {
            value: Amount::from_sat(sats),
            locking_script: ScriptBuf::from_bytes(script.to_vec()),
            token,
        });
    }

    let (lock_time, rest) = u32::decode(rest)?;

    if !rest.is_empty() {
        return Err(invalid_encoding(format!(
            "{} trailing bytes after lock time",
            rest.len()
        )));
    }

    Ok(DecodedTransaction {
        txid: compute_txid(bytes),
        version,
        inputs,
        outputs,
        lock_time,
        size: bytes.len(),
    })
}
