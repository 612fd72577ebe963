//! Consensus-wide constants shared across validation.

/// The minimum allowed block version (network rule).
pub const MIN_BLOCK_VERSION: i32 = 1;
/// Maximum depth the node will reorganize. A kernel whose coin was spent more
/// than this many blocks below the tip can no longer be rehydrated from the
/// spent-coin cache.
pub const MAX_REORG_DEPTH: u32 = 100;
/// Coinbase transaction outputs can only be spent after this number of new blocks.
pub const COINBASE_MATURITY: i32 = 100;
/// The maximum allowed size for a serialized block, in bytes (network rule).
pub const MAX_BLOCK_SIZE: u32 = 2_000_000;
/// The maximum allowed size for a serialized transaction, in bytes (network rule).
pub const MAX_TX_SIZE: u32 = 100_000;
/// Maximum script size (consensus).
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Block timestamps must satisfy `time & mask == 0`; the base grid is 16 seconds.
pub const STAKE_TIMESTAMP_MASK_BASE: u32 = 0x0f;
/// Widened 32-second grid once the Cinder upgrade activates.
pub const STAKE_TIMESTAMP_MASK_CINDER: u32 = 0x1f;

/// Current network protocol version for P2P messages.
pub const PROTOCOL_VERSION: i32 = 90_003;
