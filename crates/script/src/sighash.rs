//! Signature hashing for transparent inputs.
//!
//! Every signature commits to the value of the output being spent; a
//! signature made over the wrong amount never verifies.

use emberd_consensus::Hash256;
use emberd_primitives::encoding::{Encodable, Encoder};
use emberd_primitives::hash::sha256d;
use emberd_primitives::transaction::Transaction;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SighashType(pub u32);

impl SighashType {
    pub fn base_type(self) -> u32 {
        self.0 & 0x1f
    }

    pub fn has_anyone_can_pay(self) -> bool {
        (self.0 & SIGHASH_ANYONECANPAY) != 0
    }
}

#[derive(Debug)]
pub enum SighashError {
    InputIndexOutOfRange,
}

impl std::fmt::Display for SighashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SighashError::InputIndexOutOfRange => write!(f, "input index out of range"),
        }
    }
}

impl std::error::Error for SighashError {}

pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: i64,
    sighash_type: SighashType,
) -> Result<Hash256, SighashError> {
    let txin = tx
        .vin
        .get(input_index)
        .ok_or(SighashError::InputIndexOutOfRange)?;

    let base_type = sighash_type.base_type();
    let anyone_can_pay = sighash_type.has_anyone_can_pay();

    let hash_prevouts = if anyone_can_pay {
        [0u8; 32]
    } else {
        let mut encoder = Encoder::new();
        for input in &tx.vin {
            input.prevout.consensus_encode(&mut encoder);
        }
        sha256d(&encoder.into_inner())
    };

    let hash_sequence = if anyone_can_pay || base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE
    {
        [0u8; 32]
    } else {
        let mut encoder = Encoder::new();
        for input in &tx.vin {
            encoder.write_u32_le(input.sequence);
        }
        sha256d(&encoder.into_inner())
    };

    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        let mut encoder = Encoder::new();
        for txout in &tx.vpout {
            txout.consensus_encode(&mut encoder);
        }
        sha256d(&encoder.into_inner())
    } else if base_type == SIGHASH_SINGLE && input_index < tx.vpout.len() {
        let mut encoder = Encoder::new();
        tx.vpout[input_index].consensus_encode(&mut encoder);
        sha256d(&encoder.into_inner())
    } else {
        [0u8; 32]
    };

    let mut encoder = Encoder::new();
    encoder.write_i32_le(tx.version);
    encoder.write_hash_le(&hash_prevouts);
    encoder.write_hash_le(&hash_sequence);
    txin.prevout.consensus_encode(&mut encoder);
    encoder.write_var_bytes(script_code);
    encoder.write_i64_le(amount);
    encoder.write_u32_le(txin.sequence);
    encoder.write_hash_le(&hash_outputs);
    encoder.write_u32_le(tx.lock_time);
    encoder.write_u32_le(sighash_type.0);

    Ok(sha256d(&encoder.into_inner()))
}
