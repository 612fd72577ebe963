//! Block index metadata stored in the database.

use emberd_consensus::Hash256;

/// Block was staked rather than mined.
pub const BLOCK_PROOF_OF_STAKE: u32 = 1 << 0;
/// The stake kernel of this block is spent in the active chain; the coin was
/// resolved from the spent-coin cache.
pub const BLOCK_STAKE_KERNEL_SPENT: u32 = 1 << 1;

const BLOCK_INDEX_ENTRY_LEN: usize = 80;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockIndex {
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub height: i32,
    pub time: u32,
    pub bits: u32,
    pub stake_modifier: Hash256,
    pub flags: u32,
}

impl BlockIndex {
    pub fn is_proof_of_stake(&self) -> bool {
        (self.flags & BLOCK_PROOF_OF_STAKE) != 0
    }

    /// Database value; the block hash is the key.
    pub fn encode(&self) -> [u8; BLOCK_INDEX_ENTRY_LEN] {
        let mut out = [0u8; BLOCK_INDEX_ENTRY_LEN];
        out[0..32].copy_from_slice(&self.prev_hash);
        out[32..36].copy_from_slice(&self.height.to_le_bytes());
        out[36..40].copy_from_slice(&self.time.to_le_bytes());
        out[40..44].copy_from_slice(&self.bits.to_le_bytes());
        out[44..76].copy_from_slice(&self.stake_modifier);
        out[76..80].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    pub fn decode(hash: &Hash256, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != BLOCK_INDEX_ENTRY_LEN {
            return None;
        }
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&bytes[0..32]);
        let height = i32::from_le_bytes(bytes[32..36].try_into().ok()?);
        let time = u32::from_le_bytes(bytes[36..40].try_into().ok()?);
        let bits = u32::from_le_bytes(bytes[40..44].try_into().ok()?);
        let mut stake_modifier = [0u8; 32];
        stake_modifier.copy_from_slice(&bytes[44..76]);
        let flags = u32::from_le_bytes(bytes[76..80].try_into().ok()?);
        Some(Self {
            hash: *hash,
            prev_hash,
            height,
            time,
            bits,
            stake_modifier,
            flags,
        })
    }
}
