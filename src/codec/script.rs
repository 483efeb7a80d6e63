use bitcoin::{
    PubkeyHash, Script, ScriptBuf, ScriptHash,
    hashes::{Hash, sha256},
    opcodes::all::{OP_EQUAL, OP_HASH256, OP_PUSHBYTES_32},
};

use super::{
    CodecError,
    cashaddr::{AddressKind, CashAddress},
};

/// The locking script an address pays to
pub fn locking_script(address: &CashAddress) -> Result<ScriptBuf, CodecError> {
    let payload = address.payload.as_slice();

    match (address.kind.base(), payload.len()) {
        (AddressKind::P2pkh, 20) => {
            let hash = <[u8; 20]>::try_from(payload).map_err(|_| unsupported(address))?;
            Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)))
        }
        (AddressKind::P2sh, 20) => {
            let hash = <[u8; 20]>::try_from(payload).map_err(|_| unsupported(address))?;
            Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)))
        }
        (AddressKind::P2sh, 32) => {
            let mut script = Vec::with_capacity(35);
            script.push(OP_HASH256.to_u8());
            script.push(OP_PUSHBYTES_32.to_u8());
            script.extend_from_slice(payload);
            script.push(OP_EQUAL.to_u8());
            Ok(ScriptBuf::from_bytes(script))
        }
        _ => Err(unsupported(address)),
    }
}

/// Electrum-style script hash: SHA-256 of the script, byte-reversed, hex
pub fn scripthash(script: &Script) -> String {
    let mut digest = sha256::Hash::hash(script.as_bytes()).to_byte_array();
    digest.reverse();
    hex::encode(digest)
}

fn unsupported(address: &CashAddress) -> CodecError {
    CodecError::UnsupportedAddressType(format!(
        "{:?} with a {}-byte payload",
        address.kind,
        address.payload.len()
    ))
}
