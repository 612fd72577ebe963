//! Spent-coin cache backed by the storage trait.
//!
//! When a coin is spent it moves from the UTXO set into this cache together
//! with the height it was spent at. Stake validation reads it back to accept
//! blocks whose kernel is spent in the local view but unspent on the fork the
//! block extends.

use emberd_primitives::encoding::{DecodeError, Decoder, Encoder};
use emberd_primitives::outpoint::OutPoint;
use emberd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::utxo::{outpoint_key_bytes, Coin};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpentCoin {
    pub coin: Coin,
    pub spent_height: u32,
}

impl SpentCoin {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.write_bytes(&self.coin.encode());
        encoder.write_u32_le(self.spent_height);
        encoder.into_inner()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(bytes);
        let coin = Coin::decode_from(&mut decoder)?;
        let spent_height = decoder.read_u32_le()?;
        if !decoder.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(Self { coin, spent_height })
    }
}

pub struct SpentCache<S> {
    store: S,
}

impl<S> SpentCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> SpentCache<S> {
    pub fn insert(&self, batch: &mut WriteBatch, outpoint: &OutPoint, spent: &SpentCoin) {
        let key = outpoint_key_bytes(outpoint);
        batch.put(Column::SpentCache, key.as_bytes(), spent.encode());
    }

    pub fn delete(&self, batch: &mut WriteBatch, outpoint: &OutPoint) {
        let key = outpoint_key_bytes(outpoint);
        batch.delete(Column::SpentCache, key.as_bytes());
    }

    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<SpentCoin>, StoreError> {
        let key = outpoint_key_bytes(outpoint);
        let bytes = match self.store.get(Column::SpentCache, key.as_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        SpentCoin::decode(&bytes)
            .map_err(|err| StoreError::Backend(err.to_string()))
            .map(Some)
    }
}
