//! Transaction types and serialization.
//!
//! Outputs are typed: a transaction carries a `vpout` vector where each entry
//! is a standard value/script pair, an unspendable data payload, or a
//! value-hidden blind output. A coinstake transaction marks itself
//! structurally: its first input references a real outpoint (the kernel), its
//! first output is a data output, and its second is a standard output.

use emberd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

pub const EMBER_TX_VERSION: i32 = 2;

const OUTPUT_TAG_STANDARD: u8 = 1;
const OUTPUT_TAG_DATA: u8 = 2;
const OUTPUT_TAG_BLIND: u8 = 3;

pub const BLIND_COMMITMENT_SIZE: usize = 33;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputType {
    Standard,
    Data,
    Blind,
}

impl OutputType {
    pub const fn tag(self) -> u8 {
        match self {
            OutputType::Standard => OUTPUT_TAG_STANDARD,
            OutputType::Data => OUTPUT_TAG_DATA,
            OutputType::Blind => OUTPUT_TAG_BLIND,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            OUTPUT_TAG_STANDARD => Some(OutputType::Standard),
            OUTPUT_TAG_DATA => Some(OutputType::Data),
            OUTPUT_TAG_BLIND => Some(OutputType::Blind),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

/// Unspendable payload output. Coinstakes use one as their first output to
/// carry the block height and fee commitment.
#[derive(Clone, Debug, PartialEq)]
pub struct DataOut {
    pub data: Vec<u8>,
}

/// Value-hidden output: a Pedersen commitment in place of an explicit amount.
/// Never kernel-eligible.
#[derive(Clone, Debug, PartialEq)]
pub struct BlindOut {
    pub commitment: [u8; BLIND_COMMITMENT_SIZE],
    pub script_pubkey: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TxOutVariant {
    Standard(TxOut),
    Data(DataOut),
    Blind(BlindOut),
}

impl TxOutVariant {
    pub fn out_type(&self) -> OutputType {
        match self {
            TxOutVariant::Standard(_) => OutputType::Standard,
            TxOutVariant::Data(_) => OutputType::Data,
            TxOutVariant::Blind(_) => OutputType::Blind,
        }
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, TxOutVariant::Standard(_))
    }

    pub fn value(&self) -> Option<i64> {
        match self {
            TxOutVariant::Standard(out) => Some(out.value),
            _ => None,
        }
    }

    pub fn script_pubkey(&self) -> Option<&[u8]> {
        match self {
            TxOutVariant::Standard(out) => Some(&out.script_pubkey),
            TxOutVariant::Blind(out) => Some(&out.script_pubkey),
            TxOutVariant::Data(_) => None,
        }
    }
}

impl Encodable for TxOutVariant {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(self.out_type().tag());
        match self {
            TxOutVariant::Standard(out) => out.consensus_encode(encoder),
            TxOutVariant::Data(out) => encoder.write_var_bytes(&out.data),
            TxOutVariant::Blind(out) => {
                encoder.write_bytes(&out.commitment);
                encoder.write_var_bytes(&out.script_pubkey);
            }
        }
    }
}

impl Decodable for TxOutVariant {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let tag = decoder.read_u8()?;
        match OutputType::from_tag(tag) {
            Some(OutputType::Standard) => {
                Ok(TxOutVariant::Standard(TxOut::consensus_decode(decoder)?))
            }
            Some(OutputType::Data) => Ok(TxOutVariant::Data(DataOut {
                data: decoder.read_var_bytes()?,
            })),
            Some(OutputType::Blind) => Ok(TxOutVariant::Blind(BlindOut {
                commitment: decoder.read_fixed::<BLIND_COMMITMENT_SIZE>()?,
                script_pubkey: decoder.read_var_bytes()?,
            })),
            None => Err(DecodeError::InvalidData("unknown output type tag")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vpout: Vec<TxOutVariant>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn txid(&self) -> Hash256 {
        sha256d(&crate::encoding::encode(self))
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// A coinstake spends a real kernel outpoint through input 0, leads with a
    /// data output, and pays stake through standard outputs starting at
    /// `vpout[1]`.
    pub fn is_coinstake(&self) -> bool {
        if self.vin.is_empty() || self.vpout.len() < 2 {
            return false;
        }
        if self.vin[0].prevout.is_null() {
            return false;
        }
        self.vpout[0].out_type() == OutputType::Data && self.vpout[1].is_standard()
    }

    /// Sum of explicit output values. Blind outputs contribute nothing.
    pub fn value_out(&self) -> i64 {
        self.vpout
            .iter()
            .filter_map(TxOutVariant::value)
            .fold(0i64, i64::saturating_add)
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_le(self.version);
        encoder.write_varint(self.vin.len() as u64);
        for txin in &self.vin {
            txin.consensus_encode(encoder);
        }
        encoder.write_varint(self.vpout.len() as u64);
        for txout in &self.vpout {
            txout.consensus_encode(encoder);
        }
        encoder.write_u32_le(self.lock_time);
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let vin_count = decoder.read_varint()?;
        let vin_count = usize::try_from(vin_count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut vin = Vec::with_capacity(vin_count);
        for _ in 0..vin_count {
            vin.push(TxIn::consensus_decode(decoder)?);
        }
        let vpout_count = decoder.read_varint()?;
        let vpout_count = usize::try_from(vpout_count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut vpout = Vec::with_capacity(vpout_count);
        for _ in 0..vpout_count {
            vpout.push(TxOutVariant::consensus_decode(decoder)?);
        }
        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            version,
            vin,
            vpout,
            lock_time,
        })
    }
}
