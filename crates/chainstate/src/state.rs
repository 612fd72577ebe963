//! Chain state: the active chain plus KV-backed coin and transaction views.
//!
//! The chain array sits behind a reader-writer lock: kernel checks and other
//! lookups are readers, block connection is the single writer. Coin and index
//! lookups are bounded key-value reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use emberd_consensus::{ConsensusParams, Hash256};
use emberd_pos::estimator::{pos_kernels_per_second, StakeSample};
use emberd_pos::kernel::compute_stake_modifier_v2;
use emberd_primitives::block::Block;
use emberd_primitives::encoding::{self, DecodeError};
use emberd_primitives::outpoint::OutPoint;
use emberd_primitives::transaction::{OutputType, Transaction, TxOutVariant};
use emberd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::blockindex::{BlockIndex, BLOCK_PROOF_OF_STAKE};
use crate::chain::Chain;
use crate::spentcache::{SpentCache, SpentCoin};
use crate::txindex::{TxIndex, TxRecord};
use crate::utxo::{Coin, UtxoSet};

const META_BEST_BLOCK_KEY: &[u8] = b"best_block";

#[derive(Debug)]
pub enum ChainStateError {
    InvalidBlock(&'static str),
    Store(StoreError),
    Decode(DecodeError),
}

impl std::fmt::Display for ChainStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainStateError::InvalidBlock(message) => write!(f, "{message}"),
            ChainStateError::Store(err) => write!(f, "{err}"),
            ChainStateError::Decode(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ChainStateError {}

impl From<StoreError> for ChainStateError {
    fn from(err: StoreError) -> Self {
        ChainStateError::Store(err)
    }
}

impl From<DecodeError> for ChainStateError {
    fn from(err: DecodeError) -> Self {
        ChainStateError::Decode(err)
    }
}

pub struct ChainState<S> {
    store: Arc<S>,
    params: ConsensusParams,
    utxo: UtxoSet<Arc<S>>,
    spent_cache: SpentCache<Arc<S>>,
    tx_index: TxIndex<Arc<S>>,
    chain: RwLock<Chain>,
    verifying_db: AtomicBool,
}

impl<S: KeyValueStore> ChainState<S> {
    pub fn new(store: Arc<S>, params: ConsensusParams) -> Self {
        Self {
            utxo: UtxoSet::new(Arc::clone(&store)),
            spent_cache: SpentCache::new(Arc::clone(&store)),
            tx_index: TxIndex::new(Arc::clone(&store)),
            store,
            params,
            chain: RwLock::new(Chain::new()),
            verifying_db: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Set while re-validating the database; relaxes the reorg-depth bound on
    /// spent kernels.
    pub fn set_verifying_db(&self, verifying: bool) {
        self.verifying_db.store(verifying, Ordering::Relaxed);
    }

    pub fn is_verifying_db(&self) -> bool {
        self.verifying_db.load(Ordering::Relaxed)
    }

    pub fn tip(&self) -> Option<BlockIndex> {
        self.chain.read().expect("chain lock").tip().cloned()
    }

    pub fn block_at_height(&self, height: i32) -> Option<BlockIndex> {
        self.chain.read().expect("chain lock").get(height).cloned()
    }

    pub fn utxo_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, ChainStateError> {
        Ok(self.utxo.get(outpoint)?)
    }

    pub fn spent_coin(&self, outpoint: &OutPoint) -> Result<Option<SpentCoin>, ChainStateError> {
        Ok(self.spent_cache.get(outpoint)?)
    }

    pub fn block_index(&self, hash: &Hash256) -> Result<Option<BlockIndex>, ChainStateError> {
        let bytes = match self.store.get(Column::BlockIndex, hash)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        BlockIndex::decode(hash, &bytes)
            .ok_or(ChainStateError::InvalidBlock("invalid block index entry"))
            .map(Some)
    }

    /// Resolve a transaction and its containing block hash via the index.
    pub fn transaction(
        &self,
        txid: &Hash256,
    ) -> Result<Option<(Transaction, Hash256)>, ChainStateError> {
        let record = match self.tx_index.get(txid)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let tx: Transaction = encoding::decode(&record.tx_bytes)?;
        Ok(Some((tx, record.block_hash)))
    }

    /// Connect a block on top of the current tip: spend its inputs into the
    /// spent cache, create its coins, index its transactions, and advance the
    /// stake modifier chain.
    pub fn connect_block(&self, block: &Block) -> Result<BlockIndex, ChainStateError> {
        let mut chain = self.chain.write().expect("chain lock");
        let prev = chain.tip().cloned();

        let hash = block.hash();
        match &prev {
            Some(prev) => {
                if block.header.prev_block != prev.hash {
                    return Err(ChainStateError::InvalidBlock(
                        "block does not extend the tip",
                    ));
                }
            }
            None => {
                if block.header.prev_block != [0u8; 32] {
                    return Err(ChainStateError::InvalidBlock(
                        "genesis block must have a null previous hash",
                    ));
                }
            }
        }
        let height = prev.as_ref().map_or(0, |prev| prev.height + 1);

        if block.transactions.is_empty() {
            return Err(ChainStateError::InvalidBlock(
                "block must contain at least one transaction",
            ));
        }

        let mut batch = WriteBatch::new();
        for (tx_pos, tx) in block.transactions.iter().enumerate() {
            let txid = tx.txid();

            for txin in &tx.vin {
                if txin.prevout.is_null() {
                    continue;
                }
                let coin = self.utxo.get(&txin.prevout)?.ok_or(
                    ChainStateError::InvalidBlock("input is not in the utxo set"),
                )?;
                self.utxo.delete(&mut batch, &txin.prevout);
                self.spent_cache.insert(
                    &mut batch,
                    &txin.prevout,
                    &SpentCoin {
                        coin,
                        spent_height: height as u32,
                    },
                );
            }

            for (n, txout) in tx.vpout.iter().enumerate() {
                let coin = match txout {
                    TxOutVariant::Standard(out) => Coin {
                        value: out.value,
                        script_pubkey: out.script_pubkey.clone(),
                        height: height as u32,
                        is_coinbase: tx.is_coinbase(),
                        out_type: OutputType::Standard,
                    },
                    TxOutVariant::Blind(out) => Coin {
                        value: 0,
                        script_pubkey: out.script_pubkey.clone(),
                        height: height as u32,
                        is_coinbase: false,
                        out_type: OutputType::Blind,
                    },
                    TxOutVariant::Data(_) => continue,
                };
                let outpoint = OutPoint {
                    hash: txid,
                    index: n as u32,
                };
                self.utxo.put(&mut batch, &outpoint, &coin);
            }

            self.tx_index.insert(
                &mut batch,
                &txid,
                &TxRecord {
                    block_hash: hash,
                    tx_index: tx_pos as u32,
                    tx_bytes: encoding::encode(tx),
                },
            );
        }

        let is_pos = block.is_proof_of_stake();
        let kernel = if is_pos {
            block.transactions[0].vin[0].prevout.hash
        } else {
            hash
        };
        let stake_modifier =
            compute_stake_modifier_v2(prev.as_ref().map(|prev| &prev.stake_modifier), &kernel);

        let index = BlockIndex {
            hash,
            prev_hash: block.header.prev_block,
            height,
            time: block.header.time,
            bits: block.header.bits,
            stake_modifier,
            flags: if is_pos { BLOCK_PROOF_OF_STAKE } else { 0 },
        };
        batch.put(Column::BlockIndex, hash, index.encode());
        batch.put(Column::HeightIndex, height.to_le_bytes(), hash);
        batch.put(Column::Meta, META_BEST_BLOCK_KEY, hash);

        self.store.write_batch(&batch)?;
        if !chain.push(index.clone()) {
            return Err(ChainStateError::InvalidBlock("chain push rejected entry"));
        }
        Ok(index)
    }

    /// Disconnect the tip block, restoring the coins it spent and removing
    /// the coins it created.
    pub fn disconnect_tip(&self, block: &Block) -> Result<BlockIndex, ChainStateError> {
        let mut chain = self.chain.write().expect("chain lock");
        let tip = chain
            .tip()
            .cloned()
            .ok_or(ChainStateError::InvalidBlock("no tip to disconnect"))?;
        if block.hash() != tip.hash {
            return Err(ChainStateError::InvalidBlock("block is not the tip"));
        }

        let mut batch = WriteBatch::new();
        for tx in block.transactions.iter().rev() {
            let txid = tx.txid();

            for (n, txout) in tx.vpout.iter().enumerate() {
                if matches!(txout, TxOutVariant::Data(_)) {
                    continue;
                }
                let outpoint = OutPoint {
                    hash: txid,
                    index: n as u32,
                };
                self.utxo.delete(&mut batch, &outpoint);
            }

            for txin in &tx.vin {
                if txin.prevout.is_null() {
                    continue;
                }
                let spent = self.spent_cache.get(&txin.prevout)?.ok_or(
                    ChainStateError::InvalidBlock("spent cache entry missing on disconnect"),
                )?;
                self.utxo.put(&mut batch, &txin.prevout, &spent.coin);
                self.spent_cache.delete(&mut batch, &txin.prevout);
            }

            self.tx_index.delete(&mut batch, &txid);
        }

        batch.delete(Column::BlockIndex, tip.hash);
        batch.delete(Column::HeightIndex, tip.height.to_le_bytes());
        batch.put(Column::Meta, META_BEST_BLOCK_KEY, tip.prev_hash);

        self.store.write_batch(&batch)?;
        chain.pop();
        Ok(tip)
    }

    /// Network-wide stake kernels per second, estimated from the most recent
    /// proof-of-stake blocks on the active chain.
    pub fn pos_kernels_per_second(&self) -> f64 {
        let chain = self.chain.read().expect("chain lock");
        let Some(tip) = chain.tip() else {
            return 0.0;
        };
        let mask = self.params.stake_timestamp_mask(tip.height);

        let mut samples = Vec::new();
        let mut stakes = 0usize;
        for height in (0..=tip.height).rev() {
            let Some(index) = chain.get(height) else {
                break;
            };
            samples.push(StakeSample {
                time: index.time,
                bits: index.bits,
                proof_of_stake: index.is_proof_of_stake(),
            });
            if index.is_proof_of_stake() {
                stakes += 1;
                if stakes > 72 {
                    break;
                }
            }
        }
        pos_kernels_per_second(&samples, mask)
    }
}
