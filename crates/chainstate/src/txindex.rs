//! Transaction index backed by the storage trait.
//!
//! Maps a txid to its containing block hash, position, and serialized bytes,
//! letting informational paths resolve a transaction without touching block
//! bodies.

use emberd_consensus::Hash256;
use emberd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

const TX_RECORD_MIN_LEN: usize = 36;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxRecord {
    pub block_hash: Hash256,
    pub tx_index: u32,
    pub tx_bytes: Vec<u8>,
}

impl TxRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TX_RECORD_MIN_LEN + self.tx_bytes.len());
        out.extend_from_slice(&self.block_hash);
        out.extend_from_slice(&self.tx_index.to_le_bytes());
        out.extend_from_slice(&self.tx_bytes);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < TX_RECORD_MIN_LEN {
            return None;
        }
        let mut block_hash = [0u8; 32];
        block_hash.copy_from_slice(&bytes[0..32]);
        let tx_index = u32::from_le_bytes(bytes[32..36].try_into().ok()?);
        Some(Self {
            block_hash,
            tx_index,
            tx_bytes: bytes[36..].to_vec(),
        })
    }
}

pub struct TxIndex<S> {
    store: S,
}

impl<S> TxIndex<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> TxIndex<S> {
    pub fn insert(&self, batch: &mut WriteBatch, txid: &Hash256, record: &TxRecord) {
        batch.put(Column::TxIndex, txid, record.encode());
    }

    pub fn delete(&self, batch: &mut WriteBatch, txid: &Hash256) {
        batch.delete(Column::TxIndex, txid);
    }

    pub fn get(&self, txid: &Hash256) -> Result<Option<TxRecord>, StoreError> {
        let bytes = match self.store.get(Column::TxIndex, txid)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        TxRecord::decode(&bytes)
            .ok_or_else(|| StoreError::Backend("invalid tx index entry".to_string()))
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() {
        let record = TxRecord {
            block_hash: [0x21; 32],
            tx_index: 3,
            tx_bytes: vec![0x02, 0x00, 0x00, 0x00],
        };
        let decoded = TxRecord::decode(&record.encode()).expect("decode");
        assert_eq!(decoded, record);

        assert!(TxRecord::decode(&[0u8; 35]).is_none());
    }
}
