//! Stake kernel hashing and the modifier chain.
//!
//! A coinstake wins the right to mint a block when the hash of
//! `(stake_modifier, kernel block time, kernel prevout, block time)` falls
//! below the compact target scaled by the kernel coin's value. The modifier
//! mixes every prior block into the preimage so a coin owner cannot search
//! future proofs at the moment their coin confirms.

use emberd_consensus::{ConsensusParams, Hash256};
use emberd_primitives::encoding::{Encodable, Encoder};
use emberd_primitives::hash::sha256d;
use emberd_primitives::outpoint::OutPoint;
use primitive_types::U256;

use crate::difficulty::{compact_to_u256, u256_to_hash};

/// Hash and weighted target of one kernel check, kept for logging and the
/// persistence layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KernelProof {
    pub hash_proof: Hash256,
    pub target: Hash256,
}

#[derive(Debug)]
pub enum KernelError {
    /// Candidate block time precedes the kernel coin's block time.
    TimeViolation,
    /// `bits` decoded to a negative, overflowing, or zero target.
    BadCompactTarget,
    /// The proof hash exceeds the weighted target: an ordinary losing ticket.
    KernelNotMet(KernelProof),
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::TimeViolation => write!(f, "ntime-violation"),
            KernelError::BadCompactTarget => write!(f, "setcompact-failed"),
            KernelError::KernelNotMet(_) => {
                write!(f, "kernel hash does not meet weighted target")
            }
        }
    }
}

impl std::error::Error for KernelError {}

/// The 76-byte kernel preimage, hashed with the chain hash. Field order and
/// little-endian layout are consensus critical.
pub fn stake_kernel_hash(
    stake_modifier: &Hash256,
    block_from_time: u32,
    prevout: &OutPoint,
    n_time: u32,
) -> Hash256 {
    let mut encoder = Encoder::new();
    encoder.write_hash_le(stake_modifier);
    encoder.write_u32_le(block_from_time);
    prevout.consensus_encode(&mut encoder);
    encoder.write_u32_le(n_time);
    sha256d(&encoder.into_inner())
}

/// Advance the stake modifier chain: `H(kernel || previous modifier)`.
/// With no predecessor the modifier is the zero word.
pub fn compute_stake_modifier_v2(
    prev_modifier: Option<&Hash256>,
    kernel: &Hash256,
) -> Hash256 {
    let Some(prev_modifier) = prev_modifier else {
        return [0u8; 32];
    };

    let mut encoder = Encoder::new();
    encoder.write_hash_le(kernel);
    encoder.write_hash_le(prev_modifier);
    sha256d(&encoder.into_inner())
}

/// Check one kernel against the weighted target.
///
/// The target is the decoded compact target multiplied by the coin value in a
/// 256-bit register that wraps on overflow, matching the historical
/// arithmetic other nodes on the network compute.
pub fn check_stake_kernel_hash(
    stake_modifier: &Hash256,
    n_bits: u32,
    block_from_time: u32,
    prev_out_amount: i64,
    prevout: &OutPoint,
    n_time: u32,
) -> Result<KernelProof, KernelError> {
    if n_time < block_from_time {
        return Err(KernelError::TimeViolation);
    }

    let bn_target = match compact_to_u256(n_bits) {
        Ok(target) => target,
        Err(err) => {
            emberd_log::log_error!("check_stake_kernel_hash: {err}");
            return Err(KernelError::BadCompactTarget);
        }
    };
    if bn_target.is_zero() {
        emberd_log::log_error!("check_stake_kernel_hash: target is zero");
        return Err(KernelError::BadCompactTarget);
    }

    let bn_weight = U256::from(prev_out_amount as u64);
    let (weighted_target, _) = bn_target.overflowing_mul(bn_weight);

    let hash_proof = stake_kernel_hash(stake_modifier, block_from_time, prevout, n_time);
    let proof = KernelProof {
        hash_proof,
        target: u256_to_hash(weighted_target),
    };

    emberd_log::log_debug!(
        "check_stake_kernel_hash: modifier={} kernel_time={} prevout={}:{} time={} proof={}",
        hash_to_hex(stake_modifier),
        block_from_time,
        hash_to_hex(&prevout.hash),
        prevout.index,
        n_time,
        hash_to_hex(&proof.hash_proof)
    );

    if U256::from_little_endian(&hash_proof) > weighted_target {
        return Err(KernelError::KernelNotMet(proof));
    }

    Ok(proof)
}

/// Block timestamps must land on the coarse stake time grid.
pub fn check_coinstake_timestamp(params: &ConsensusParams, height: i32, block_time: i64) -> bool {
    (block_time & params.stake_timestamp_mask(height) as i64) == 0
}

fn hash_to_hex(hash: &Hash256) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}
