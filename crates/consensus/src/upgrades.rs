//! Network upgrade schedule.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum UpgradeIndex {
    Base = 0,
    Cinder = 1,
    Ashfall = 2,
}

pub const MAX_NETWORK_UPGRADES: usize = 3;

pub const ALL_UPGRADES: [UpgradeIndex; MAX_NETWORK_UPGRADES] = [
    UpgradeIndex::Base,
    UpgradeIndex::Cinder,
    UpgradeIndex::Ashfall,
];

impl UpgradeIndex {
    pub const fn as_usize(self) -> usize {
        self as usize
    }
}

pub type Hash256 = [u8; 32];

#[derive(Clone, Copy, Debug)]
pub struct NetworkUpgrade {
    pub protocol_version: i32,
    pub activation_height: i32,
    pub hash_activation_block: Option<Hash256>,
}

impl NetworkUpgrade {
    pub const ALWAYS_ACTIVE: i32 = 0;
    pub const NO_ACTIVATION_HEIGHT: i32 = -1;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpgradeState {
    Disabled,
    Pending,
    Active,
}

pub fn network_upgrade_state(
    height: i32,
    upgrades: &[NetworkUpgrade; MAX_NETWORK_UPGRADES],
    idx: UpgradeIndex,
) -> UpgradeState {
    let activation_height = upgrades[idx.as_usize()].activation_height;
    if activation_height == NetworkUpgrade::NO_ACTIVATION_HEIGHT {
        UpgradeState::Disabled
    } else if height >= activation_height {
        UpgradeState::Active
    } else {
        UpgradeState::Pending
    }
}

pub fn network_upgrade_active(
    height: i32,
    upgrades: &[NetworkUpgrade; MAX_NETWORK_UPGRADES],
    idx: UpgradeIndex,
) -> bool {
    network_upgrade_state(height, upgrades, idx) == UpgradeState::Active
}

pub fn is_activation_height(
    height: i32,
    upgrades: &[NetworkUpgrade; MAX_NETWORK_UPGRADES],
    idx: UpgradeIndex,
) -> bool {
    if idx == UpgradeIndex::Base || height < 0 {
        return false;
    }
    height == upgrades[idx.as_usize()].activation_height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{consensus_params, Network};

    #[test]
    fn mainnet_activation_edges() {
        let params = consensus_params(Network::Mainnet);

        assert!(network_upgrade_active(0, &params.upgrades, UpgradeIndex::Base));

        let cinder = params.upgrades[UpgradeIndex::Cinder.as_usize()].activation_height;
        assert!(!network_upgrade_active(
            cinder - 1,
            &params.upgrades,
            UpgradeIndex::Cinder
        ));
        assert!(network_upgrade_active(
            cinder,
            &params.upgrades,
            UpgradeIndex::Cinder
        ));

        assert_eq!(
            network_upgrade_state(i32::MAX, &params.upgrades, UpgradeIndex::Ashfall),
            UpgradeState::Disabled
        );
    }
}
