//! Proof-of-stake validation against chain state.
//!
//! The kernel (input 0) of a coinstake must meet the hash target scaled by
//! the kernel coin's value. The kernel coin is resolved against the live
//! UTXO set first and the spent-coin cache second: a block mined on a fork
//! may stake a coin our view already spent, and stays acceptable until the
//! spend is deeper than the reorg bound.

use emberd_consensus::constants::MAX_REORG_DEPTH;
use emberd_consensus::{ConsensusParams, Hash256};
use emberd_pos::kernel::{
    check_stake_kernel_hash, stake_kernel_hash, KernelError, KernelProof,
};
use emberd_primitives::outpoint::OutPoint;
use emberd_primitives::transaction::{OutputType, Transaction, TxOutVariant};
use emberd_script::interpreter::{verify_script, ScriptError, STANDARD_SCRIPT_VERIFY_FLAGS};
use emberd_script::standard::has_coinstake_op;
use emberd_storage::{KeyValueStore, StoreError};

use crate::blockindex::{BlockIndex, BLOCK_STAKE_KERNEL_SPENT};
use crate::state::{ChainState, ChainStateError};
use crate::utxo::Coin;

/// Scratch state for one block's validation; accumulates block index flags.
#[derive(Clone, Debug, Default)]
pub struct StakeValidationState {
    pub flags: u32,
}

impl StakeValidationState {
    pub fn kernel_spent(&self) -> bool {
        (self.flags & BLOCK_STAKE_KERNEL_SPENT) != 0
    }
}

#[derive(Debug)]
pub enum StakeError {
    MalformedTxn,
    PrevoutNotFound,
    PrevoutNotInChain,
    InvalidPrevout,
    InvalidStakeDepth,
    VerifyScriptFailed(ScriptError),
    MixedPrevoutScripts,
    BadOutputType,
    VerifyAmountScriptFailed,
    CheckKernelFailed,
    TimeViolation,
    BadCompactTarget,
    Store(StoreError),
}

impl StakeError {
    /// Misbehavior score the caller feeds into peer banning. 100 is
    /// definitely adversarial, 20 possibly missing data, 1 an ordinary
    /// losing ticket that must never sever peers.
    pub fn dos_score(&self) -> u32 {
        match self {
            StakeError::MalformedTxn
            | StakeError::InvalidPrevout
            | StakeError::InvalidStakeDepth
            | StakeError::VerifyScriptFailed(_)
            | StakeError::MixedPrevoutScripts
            | StakeError::BadOutputType
            | StakeError::VerifyAmountScriptFailed
            | StakeError::BadCompactTarget => 100,
            StakeError::PrevoutNotFound | StakeError::PrevoutNotInChain => 20,
            StakeError::CheckKernelFailed | StakeError::TimeViolation => 1,
            StakeError::Store(_) => 0,
        }
    }
}

impl std::fmt::Display for StakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StakeError::MalformedTxn => write!(f, "malformed-txn"),
            StakeError::PrevoutNotFound => write!(f, "prevout-not-found"),
            StakeError::PrevoutNotInChain => write!(f, "prevout-not-in-chain"),
            StakeError::InvalidPrevout => write!(f, "invalid-prevout"),
            StakeError::InvalidStakeDepth => write!(f, "invalid-stake-depth"),
            StakeError::VerifyScriptFailed(err) => {
                write!(f, "verify-cs-script-failed ({err})")
            }
            StakeError::MixedPrevoutScripts => write!(f, "mixed-prevout-scripts"),
            StakeError::BadOutputType => write!(f, "bad-output-type"),
            StakeError::VerifyAmountScriptFailed => write!(f, "verify-amount-script-failed"),
            StakeError::CheckKernelFailed => write!(f, "check-kernel-failed"),
            StakeError::TimeViolation => write!(f, "ntime-violation"),
            StakeError::BadCompactTarget => write!(f, "setcompact-failed"),
            StakeError::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for StakeError {}

impl From<ChainStateError> for StakeError {
    fn from(err: ChainStateError) -> Self {
        match err {
            ChainStateError::Store(err) => StakeError::Store(err),
            ChainStateError::InvalidBlock(_) | ChainStateError::Decode(_) => {
                StakeError::InvalidPrevout
            }
        }
    }
}

/// A kernel coin together with where it came from.
#[derive(Clone, Debug)]
pub struct ResolvedCoin {
    pub coin: Coin,
    /// The coin was read back from the spent-coin cache: it is spent in the
    /// active chain but may be unspent on the fork being validated.
    pub spent_in_chain: bool,
}

/// Resolve a kernel prevout against the UTXO set with spent-cache fallback.
/// A spent coin is only eligible while its spend is within the reorg bound,
/// unless the database itself is being re-verified.
pub fn resolve_kernel_coin<S: KeyValueStore>(
    chain_state: &ChainState<S>,
    prevout: &OutPoint,
    prev_height: i32,
    verifying_db: bool,
) -> Result<ResolvedCoin, StakeError> {
    if let Some(coin) = chain_state.utxo_coin(prevout)? {
        return Ok(ResolvedCoin {
            coin,
            spent_in_chain: false,
        });
    }

    let Some(spent) = chain_state.spent_coin(prevout)? else {
        emberd_log::log_error!("resolve_kernel_coin: prevout-not-found");
        return Err(StakeError::PrevoutNotFound);
    };
    if !verifying_db
        && prev_height > spent.spent_height as i32
        && prev_height - spent.spent_height as i32 > MAX_REORG_DEPTH as i32
    {
        emberd_log::log_error!(
            "resolve_kernel_coin: tried to stake kernel spent at height {}",
            spent.spent_height
        );
        return Err(StakeError::InvalidPrevout);
    }

    Ok(ResolvedCoin {
        coin: spent.coin,
        spent_in_chain: true,
    })
}

fn required_stake_depth(params: &ConsensusParams, prev_height: i32) -> i32 {
    std::cmp::min(
        params.stake_min_confirmations() as i32 - 1,
        prev_height / 2,
    )
}

/// Check kernel hash target and coinstake structure.
///
/// `pindex_prev` is the current tip the new block will connect to, `n_time`
/// the time of the new block. Returns the kernel proof for logging and the
/// persistence layer; `state` collects the kernel-spent flag.
pub fn check_proof_of_stake<S: KeyValueStore>(
    chain_state: &ChainState<S>,
    pindex_prev: &BlockIndex,
    tx: &Transaction,
    n_time: i64,
    n_bits: u32,
    state: &mut StakeValidationState,
) -> Result<KernelProof, StakeError> {
    if !tx.is_coinstake() || tx.vin.is_empty() {
        emberd_log::log_error!(
            "check_proof_of_stake: malformed-txn {}",
            hash_to_hex(&tx.txid())
        );
        return Err(StakeError::MalformedTxn);
    }

    // Kernel (input 0) must match the stake hash target per coin weight.
    let txin = &tx.vin[0];
    let resolved = resolve_kernel_coin(
        chain_state,
        &txin.prevout,
        pindex_prev.height,
        chain_state.is_verifying_db(),
    )?;
    if resolved.spent_in_chain {
        state.flags |= BLOCK_STAKE_KERNEL_SPENT;
    }
    let coin = resolved.coin;

    if coin.out_type != OutputType::Standard {
        emberd_log::log_error!("check_proof_of_stake: invalid-prevout");
        return Err(StakeError::InvalidPrevout);
    }

    let Some(pindex) = chain_state.block_at_height(coin.height as i32) else {
        emberd_log::log_error!("check_proof_of_stake: invalid-prevout");
        return Err(StakeError::InvalidPrevout);
    };

    let depth = pindex_prev.height - coin.height as i32;
    let required_depth = required_stake_depth(chain_state.params(), pindex_prev.height);
    if required_depth > depth {
        emberd_log::log_error!("check_proof_of_stake: tried to stake at depth {}", depth + 1);
        return Err(StakeError::InvalidStakeDepth);
    }

    let kernel_pubkey = coin.script_pubkey.clone();
    let amount = coin.value;
    let block_from_time = pindex.time;

    // Redundant with CheckInputs at connect time, but fails fast here.
    if let Err(err) = verify_script(
        &txin.script_sig,
        &kernel_pubkey,
        tx,
        0,
        amount,
        STANDARD_SCRIPT_VERIFY_FLAGS,
    ) {
        emberd_log::log_error!(
            "check_proof_of_stake: verify-script-failed, txn {}, reason {}",
            hash_to_hex(&tx.txid()),
            err
        );
        return Err(StakeError::VerifyScriptFailed(err));
    }

    let proof = match check_stake_kernel_hash(
        &pindex_prev.stake_modifier,
        n_bits,
        block_from_time,
        amount,
        &txin.prevout,
        n_time as u32,
    ) {
        Ok(proof) => proof,
        Err(KernelError::TimeViolation) => {
            emberd_log::log_error!("check_proof_of_stake: ntime-violation");
            return Err(StakeError::TimeViolation);
        }
        Err(KernelError::BadCompactTarget) => {
            return Err(StakeError::BadCompactTarget);
        }
        Err(KernelError::KernelNotMet(proof)) => {
            emberd_log::log_warn!(
                "check_proof_of_stake: check kernel failed on coinstake {}, proof {}",
                hash_to_hex(&tx.txid()),
                hash_to_hex(&proof.hash_proof)
            );
            return Err(StakeError::CheckKernelFailed);
        }
    };

    // When the kernel script is a delegated-staking script, every extra input
    // must share it and the outputs paid back to it must cover the inputs.
    // The reward split beyond that is user selectable and is not checked
    // here; coin owners who detect a misbehaving staking node can move their
    // coin to a new address.
    if has_coinstake_op(&kernel_pubkey) {
        let mut amount = amount;
        for (k, txin) in tx.vin.iter().enumerate().skip(1) {
            let coin = match chain_state.utxo_coin(&txin.prevout)? {
                Some(coin) => coin,
                None => match chain_state.spent_coin(&txin.prevout)? {
                    Some(spent) => {
                        emberd_log::log_debug!(
                            "check_proof_of_stake: input {} of coinstake {} is spent",
                            k,
                            hash_to_hex(&tx.txid())
                        );
                        spent.coin
                    }
                    None => {
                        emberd_log::log_error!("check_proof_of_stake: prevout-not-in-chain");
                        return Err(StakeError::PrevoutNotInChain);
                    }
                },
            };
            if coin.out_type != OutputType::Standard {
                emberd_log::log_error!("check_proof_of_stake: invalid-prevout {}", k);
                return Err(StakeError::InvalidPrevout);
            }
            if kernel_pubkey != coin.script_pubkey {
                emberd_log::log_error!("check_proof_of_stake: mixed-prevout-scripts {}", k);
                return Err(StakeError::MixedPrevoutScripts);
            }
            amount += coin.value;
        }

        let mut verified = 0i64;
        for txout in &tx.vpout {
            let out = match txout {
                TxOutVariant::Standard(out) => out,
                TxOutVariant::Data(_) => continue,
                TxOutVariant::Blind(_) => {
                    emberd_log::log_error!("check_proof_of_stake: bad-output-type");
                    return Err(StakeError::BadOutputType);
                }
            };
            if out.script_pubkey == kernel_pubkey {
                verified += out.value;
            }
        }

        if verified < amount {
            emberd_log::log_error!(
                "check_proof_of_stake: verify-amount-script-failed, txn {}",
                hash_to_hex(&tx.txid())
            );
            return Err(StakeError::VerifyAmountScriptFailed);
        }
    }

    Ok(proof)
}

/// Whether the coinstake timestamp lands on the stake time grid.
pub fn check_coinstake_timestamp<S: KeyValueStore>(
    chain_state: &ChainState<S>,
    height: i32,
    block_time: i64,
) -> bool {
    emberd_pos::kernel::check_coinstake_timestamp(chain_state.params(), height, block_time)
}

/// Staker-side probe: would `(prevout, n_time)` win at the current tip?
///
/// Used only while staking, never during validation: the coin must come from
/// the live UTXO set, there is no misbehavior scoring, and a miss is not
/// worth a warning. Returns the kernel coin's block time on success.
pub fn check_kernel<S: KeyValueStore>(
    chain_state: &ChainState<S>,
    pindex_prev: &BlockIndex,
    n_bits: u32,
    n_time: i64,
    prevout: &OutPoint,
) -> Result<Option<u32>, ChainStateError> {
    let Some(coin) = chain_state.utxo_coin(prevout)? else {
        return Ok(None);
    };
    if coin.out_type != OutputType::Standard {
        return Ok(None);
    }

    let Some(pindex) = chain_state.block_at_height(coin.height as i32) else {
        return Ok(None);
    };

    let depth = pindex_prev.height - coin.height as i32;
    if required_stake_depth(chain_state.params(), pindex_prev.height) > depth {
        return Ok(None);
    }

    let block_time = pindex.time;
    match check_stake_kernel_hash(
        &pindex_prev.stake_modifier,
        n_bits,
        block_time,
        coin.value,
        prevout,
        n_time as u32,
    ) {
        Ok(_) => Ok(Some(block_time)),
        Err(_) => Ok(None),
    }
}

/// Informational kernel summary for a coinstake in an indexed block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KernelInfo {
    pub hash: Hash256,
    pub value: i64,
    pub script_pubkey: Vec<u8>,
    pub block_hash: Hash256,
}

/// Recompute the kernel hash of `tx` as mined in the block at `pindex`.
/// Only the kernel block's header data is consulted.
pub fn get_kernel_info<S: KeyValueStore>(
    chain_state: &ChainState<S>,
    pindex: &BlockIndex,
    tx: &Transaction,
) -> Result<Option<KernelInfo>, ChainStateError> {
    let Some(prev_index) = chain_state.block_index(&pindex.prev_hash)? else {
        return Ok(None);
    };
    if tx.vin.is_empty() {
        return Ok(None);
    }
    let prevout = &tx.vin[0].prevout;

    let Some((tx_prev, kernel_block_hash)) = chain_state.transaction(&prevout.hash)? else {
        return Ok(None);
    };
    let Some(out_prev) = tx_prev.vpout.get(prevout.index as usize) else {
        return Ok(None);
    };
    let TxOutVariant::Standard(out_prev) = out_prev else {
        return Ok(None);
    };
    let Some(kernel_index) = chain_state.block_index(&kernel_block_hash)? else {
        return Ok(None);
    };

    let hash = stake_kernel_hash(
        &prev_index.stake_modifier,
        kernel_index.time,
        prevout,
        pindex.time,
    );

    Ok(Some(KernelInfo {
        hash,
        value: out_prev.value,
        script_pubkey: out_prev.script_pubkey.clone(),
        block_hash: kernel_block_hash,
    }))
}

fn hash_to_hex(hash: &Hash256) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
