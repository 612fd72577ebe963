//! Block header and block types.

use emberd_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::transaction::Transaction;

pub const CURRENT_VERSION: i32 = 1;

#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub witness_merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_i32_le(self.version);
        encoder.write_hash_le(&self.prev_block);
        encoder.write_hash_le(&self.merkle_root);
        encoder.write_hash_le(&self.witness_merkle_root);
        encoder.write_u32_le(self.time);
        encoder.write_u32_le(self.bits);
        encoder.write_u32_le(self.nonce);
        encoder.into_inner()
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = Self::consensus_decode_from(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(header)
    }

    pub fn consensus_decode_from(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.read_i32_le()?,
            prev_block: decoder.read_hash_le()?,
            merkle_root: decoder.read_hash_le()?,
            witness_merkle_root: decoder.read_hash_le()?,
            time: decoder.read_u32_le()?,
            bits: decoder.read_u32_le()?,
            nonce: decoder.read_u32_le()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Staker's signature over the header hash. Excluded from the block hash.
    pub block_sig: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions
            .first()
            .is_some_and(Transaction::is_coinstake)
    }

    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_bytes(&self.header.consensus_encode());
        encoder.write_varint(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.consensus_encode(&mut encoder);
        }
        encoder.write_var_bytes(&self.block_sig);
        encoder.into_inner()
    }

    pub fn consensus_decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let header = BlockHeader::consensus_decode_from(&mut decoder)?;
        let count = decoder.read_varint()?;
        let count = usize::try_from(count).map_err(|_| DecodeError::SizeTooLarge)?;
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(crate::encoding::Decodable::consensus_decode(&mut decoder)?);
        }
        let block_sig = decoder.read_var_bytes()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self {
            header,
            transactions,
            block_sig,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outpoint::OutPoint;
    use crate::transaction::{DataOut, TxIn, TxOut, TxOutVariant, EMBER_TX_VERSION};

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: CURRENT_VERSION,
            prev_block: [0x22; 32],
            merkle_root: [0x33; 32],
            witness_merkle_root: [0x44; 32],
            time: 1_600_000_000,
            bits: 0x1e0fffff,
            nonce: 0,
        }
    }

    #[test]
    fn header_hash_ignores_block_signature() {
        let header = sample_header();
        let coinstake = Transaction {
            version: EMBER_TX_VERSION,
            vin: vec![TxIn {
                prevout: OutPoint {
                    hash: [0x11; 32],
                    index: 0,
                },
                script_sig: Vec::new(),
                sequence: u32::MAX,
            }],
            vpout: vec![
                TxOutVariant::Data(DataOut { data: vec![0x01] }),
                TxOutVariant::Standard(TxOut {
                    value: 50,
                    script_pubkey: vec![0x51],
                }),
            ],
            lock_time: 0,
        };

        let mut block = Block {
            header,
            transactions: vec![coinstake],
            block_sig: Vec::new(),
        };
        let unsigned_hash = block.hash();
        block.block_sig = vec![0xde, 0xad];
        assert_eq!(block.hash(), unsigned_hash);
        assert!(block.is_proof_of_stake());
    }

    #[test]
    fn block_roundtrip() {
        let block = Block {
            header: sample_header(),
            transactions: Vec::new(),
            block_sig: vec![0x30, 0x44],
        };
        let bytes = block.consensus_encode();
        let decoded = Block::consensus_decode(&bytes).expect("decode");
        assert_eq!(decoded, block);
        assert!(!decoded.is_proof_of_stake());
    }
}
