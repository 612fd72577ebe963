//! Consensus parameter definitions.

use crate::constants::{STAKE_TIMESTAMP_MASK_BASE, STAKE_TIMESTAMP_MASK_CINDER};
use crate::upgrades::{
    network_upgrade_active, Hash256, NetworkUpgrade, UpgradeIndex, MAX_NETWORK_UPGRADES,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub hash_genesis_block: Hash256,
    pub genesis_time: u32,
    pub stake_target_spacing: i64,
    pub stake_min_confirmations: u32,
    pub pos_limit: Hash256,
    pub minimum_chain_work: Hash256,
    pub upgrades: [NetworkUpgrade; MAX_NETWORK_UPGRADES],
    pub checkpoints: Vec<Checkpoint>,
}

impl ConsensusParams {
    /// Bitmask applied to coinstake block timestamps. The grid widens once the
    /// Cinder upgrade activates.
    pub fn stake_timestamp_mask(&self, height: i32) -> u32 {
        if network_upgrade_active(height, &self.upgrades, UpgradeIndex::Cinder) {
            STAKE_TIMESTAMP_MASK_CINDER
        } else {
            STAKE_TIMESTAMP_MASK_BASE
        }
    }

    pub fn stake_min_confirmations(&self) -> u32 {
        self.stake_min_confirmations
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    pub height: i32,
    pub hash: Hash256,
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }

    if hex.is_empty() {
        return Err(HexError::InvalidLength);
    }

    let mut hex_owned = if hex.len() % 2 == 1 {
        let mut padded = String::with_capacity(hex.len() + 1);
        padded.push('0');
        padded.push_str(hex);
        padded
    } else {
        hex.to_string()
    };

    if hex_owned.len() > 64 {
        return Err(HexError::InvalidLength);
    }

    if hex_owned.len() < 64 {
        let mut padded = String::with_capacity(64);
        for _ in 0..(64 - hex_owned.len()) {
            padded.push('0');
        }
        padded.push_str(&hex_owned);
        hex_owned = padded;
    }

    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        let byte = u8::from_str_radix(&hex_owned[start..start + 2], 16)
            .map_err(|_| HexError::InvalidHex)?;
        *byte_out = byte;
    }
    bytes.reverse();

    Ok(bytes)
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
    }
}

fn mainnet_consensus_params() -> ConsensusParams {
    let upgrades = [
        NetworkUpgrade {
            protocol_version: 90_001,
            activation_height: NetworkUpgrade::ALWAYS_ACTIVE,
            hash_activation_block: None,
        },
        NetworkUpgrade {
            protocol_version: 90_002,
            activation_height: 1_214_000,
            hash_activation_block: Some(
                hash256_from_hex(
                    "0000019b80a21c1a84d1a5a0dc7b5cc9f1a5adbb4b46f7fbbe7e235dcc281438",
                )
                .expect("mainnet cinder activation hash"),
            ),
        },
        NetworkUpgrade {
            protocol_version: 90_003,
            activation_height: NetworkUpgrade::NO_ACTIVATION_HEIGHT,
            hash_activation_block: None,
        },
    ];

    ConsensusParams {
        network: Network::Mainnet,
        hash_genesis_block: hash256_from_hex(
            "00000e014fc9e5ac4b1a2a1e9de715e455a288a971c3a26956435a0cbde6bcb1",
        )
        .expect("mainnet genesis hash"),
        genesis_time: 1_541_505_600,
        stake_target_spacing: 120,
        stake_min_confirmations: 225,
        pos_limit: hash256_from_hex(
            "000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("mainnet pos limit"),
        minimum_chain_work: hash256_from_hex(
            "00000000000000000000000000000000000000000000000000168a46dcb27b12",
        )
        .expect("mainnet minimum chain work"),
        upgrades,
        checkpoints: mainnet_checkpoints(),
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    let upgrades = [
        NetworkUpgrade {
            protocol_version: 90_001,
            activation_height: NetworkUpgrade::ALWAYS_ACTIVE,
            hash_activation_block: None,
        },
        NetworkUpgrade {
            protocol_version: 90_002,
            activation_height: 120_000,
            hash_activation_block: None,
        },
        NetworkUpgrade {
            protocol_version: 90_003,
            activation_height: NetworkUpgrade::NO_ACTIVATION_HEIGHT,
            hash_activation_block: None,
        },
    ];

    ConsensusParams {
        network: Network::Testnet,
        hash_genesis_block: hash256_from_hex(
            "0000a5bd02f3804b45f90b2c1a658a0cb956e33137b7ac02df6a2c18e297f94b",
        )
        .expect("testnet genesis hash"),
        genesis_time: 1_541_942_400,
        stake_target_spacing: 120,
        stake_min_confirmations: 225,
        pos_limit: hash256_from_hex(
            "0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("testnet pos limit"),
        minimum_chain_work: [0u8; 32],
        upgrades,
        checkpoints: testnet_checkpoints(),
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    let upgrades = [
        NetworkUpgrade {
            protocol_version: 90_001,
            activation_height: NetworkUpgrade::ALWAYS_ACTIVE,
            hash_activation_block: None,
        },
        NetworkUpgrade {
            protocol_version: 90_002,
            activation_height: NetworkUpgrade::NO_ACTIVATION_HEIGHT,
            hash_activation_block: None,
        },
        NetworkUpgrade {
            protocol_version: 90_003,
            activation_height: NetworkUpgrade::NO_ACTIVATION_HEIGHT,
            hash_activation_block: None,
        },
    ];

    ConsensusParams {
        network: Network::Regtest,
        hash_genesis_block: hash256_from_hex(
            "5ec1af9da1a74896fe6bc7d3e0cf3a63e6e5a271f70e2d4e1b5a1c77da680dca",
        )
        .expect("regtest genesis hash"),
        genesis_time: 1_296_688_602,
        stake_target_spacing: 120,
        stake_min_confirmations: 10,
        pos_limit: hash256_from_hex(
            "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("regtest pos limit"),
        minimum_chain_work: [0u8; 32],
        upgrades,
        checkpoints: Vec::new(),
    }
}

fn parse_checkpoints(entries: &[(i32, &str)]) -> Vec<Checkpoint> {
    entries
        .iter()
        .map(|(height, hash)| Checkpoint {
            height: *height,
            hash: hash256_from_hex(hash).expect("checkpoint hash"),
        })
        .collect()
}

fn mainnet_checkpoints() -> Vec<Checkpoint> {
    parse_checkpoints(&[
        (
            0,
            "00000e014fc9e5ac4b1a2a1e9de715e455a288a971c3a26956435a0cbde6bcb1",
        ),
        (
            50_000,
            "000000c8c15f6d9f9c64e2dfc24ba15dff27851de6749d4f361ce71ab4b91a48",
        ),
        (
            250_000,
            "0000007be4616bf430d1a5b443e4c4bdb6638001e930d6a9dd1d90c3a86d4a5e",
        ),
        (
            600_000,
            "0000012a23e2c13e6e80f9a6eb95b03cfd3e20b0b3b939a98c935c4a8201a18c",
        ),
        (
            1_214_000,
            "0000019b80a21c1a84d1a5a0dc7b5cc9f1a5adbb4b46f7fbbe7e235dcc281438",
        ),
    ])
}

fn testnet_checkpoints() -> Vec<Checkpoint> {
    parse_checkpoints(&[(
        0,
        "0000a5bd02f3804b45f90b2c1a658a0cb956e33137b7ac02df6a2c18e297f94b",
    )])
}
