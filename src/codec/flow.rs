use std::{collections::HashMap, fmt};

use bitcoin::{Amount, OutPoint, Script, SignedAmount};

use super::{
    CodecError, invalid_encoding,
    transaction::{DecodedOutput, DecodedTransaction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Sent => f.write_str("sent"),
            Direction::Received => f.write_str("received"),
        }
    }
}

/// What a single transaction moved into and out of one locking script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFlow {
    pub received: Amount,
    pub sent: Amount,
    /// `received - sent`
    pub net: SignedAmount,
    pub touches_tokens: bool,
}

impl AddressFlow {
    /// `prevouts` holds the spent outputs of `tx` that are known; inputs
    /// whose prevout is missing count as not belonging to the script.
    /// Values that don't fit an amount are an encoding error.
    pub fn compute(
        tx: &DecodedTransaction,
        script: &Script,
        prevouts: &HashMap<OutPoint, DecodedOutput>,
    ) -> Result<Self, CodecError> {
        let mut received = Amount::ZERO;
        let mut sent = Amount::ZERO;
        let mut touches_tokens = false;

        for output in tx
            .outputs
            .iter()
            .filter(|o| o.locking_script.as_script() == script)
        {
            received = checked_sum(received, output.value)?;
            touches_tokens |= output.has_token();
        }

        let spent = tx
            .inputs
            .iter()
            .filter(|i| !i.is_coinbase())
            .filter_map(|i| prevouts.get(&i.outpoint()))
            .filter(|prev| prev.locking_script.as_script() == script);

        for prev in spent {
            sent = checked_sum(sent, prev.value)?;
            touches_tokens |= prev.has_token();
        }

        let net = signed(received)?
            .checked_sub(signed(sent)?)
            .ok_or_else(|| invalid_encoding("net value out of range"))?;

        Ok(AddressFlow {
            received,
            sent,
            net,
            touches_tokens,
        })
    }

    pub fn direction(&self) -> Direction {
        if self.net.is_negative() {
            Direction::Sent
        } else {
            Direction::Received
        }
    }
}

fn checked_sum(total: Amount, value: Amount) -> Result<Amount, CodecError> {
    total
        .checked_add(value)
        .ok_or_else(|| invalid_encoding("value total overflows"))
}

fn signed(amount: Amount) -> Result<SignedAmount, CodecError> {
    amount
        .to_signed()
        .map_err(|_| invalid_encoding(format!("{amount} out of signed range")))
}
