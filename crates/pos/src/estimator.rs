//! Network stake estimator.
//!
//! Estimates how many kernel hashes per second the whole network is trying,
//! from the spacing and difficulty of recent proof-of-stake blocks.

use crate::difficulty::difficulty;

/// Blocks sampled when estimating network stake.
const POS_INTERVAL: usize = 72;

/// One block of the active chain, listed tip first.
#[derive(Clone, Copy, Debug)]
pub struct StakeSample {
    pub time: u32,
    pub bits: u32,
    pub proof_of_stake: bool,
}

/// Walk back through `samples` (tip first), pairing consecutive
/// proof-of-stake blocks. Each pair contributes the later block's difficulty
/// scaled to hash units and the seconds between the pair. The result is
/// corrected for the stake timestamp grid: only one nonce exists per
/// `mask + 1` seconds of wall time.
pub fn pos_kernels_per_second(samples: &[StakeSample], stake_timestamp_mask: u32) -> f64 {
    let mut prev_stake: Option<&StakeSample> = None;
    let mut kernels_tried = 0.0f64;
    let mut stakes_time = 0i64;
    let mut stakes_handled = 0usize;

    for sample in samples {
        if stakes_handled >= POS_INTERVAL {
            break;
        }
        if sample.proof_of_stake {
            if let Some(prev) = prev_stake {
                kernels_tried += difficulty(prev.bits) * 4_294_967_296.0;
                stakes_time += prev.time as i64 - sample.time as i64;
                stakes_handled += 1;
            }
            prev_stake = Some(sample);
        }
    }

    let mut result = 0.0;
    if stakes_time != 0 {
        result = kernels_tried / stakes_time as f64;
    }

    result * (stake_timestamp_mask + 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stake_chain(count: usize, spacing: u32, bits: u32) -> Vec<StakeSample> {
        // Tip first: later blocks carry larger timestamps.
        (0..count)
            .rev()
            .map(|offset| StakeSample {
                time: 1_600_000_000 + offset as u32 * spacing,
                bits,
                proof_of_stake: true,
            })
            .collect()
    }

    #[test]
    fn empty_and_single_block_chains_estimate_zero() {
        assert_eq!(pos_kernels_per_second(&[], 0x0f), 0.0);
        let one = stake_chain(1, 128, 0x1d00ffff);
        assert_eq!(pos_kernels_per_second(&one, 0x0f), 0.0);
    }

    #[test]
    fn zero_elapsed_time_estimates_zero() {
        let samples = vec![
            StakeSample {
                time: 1_600_000_000,
                bits: 0x1d00ffff,
                proof_of_stake: true,
            };
            4
        ];
        assert_eq!(pos_kernels_per_second(&samples, 0x0f), 0.0);
    }

    #[test]
    fn perfect_spacing_matches_closed_form() {
        let spacing = 128u32;
        let samples = stake_chain(10, spacing, 0x1d00ffff);
        // Nine pairs, each difficulty 1.0 * 2^32 over `spacing` seconds.
        let expected = (9.0 * 4_294_967_296.0) / (9.0 * spacing as f64) * 16.0;
        let result = pos_kernels_per_second(&samples, 0x0f);
        assert!((result - expected).abs() < 1e-3);
    }

    #[test]
    fn mask_scaling_is_linear() {
        let samples = stake_chain(10, 128, 0x1d00ffff);
        let narrow = pos_kernels_per_second(&samples, 0x0f);
        let wide = pos_kernels_per_second(&samples, 0x1f);
        assert!((wide / narrow - 2.0).abs() < 1e-9);
    }

    #[test]
    fn non_stake_blocks_are_skipped() {
        let mut samples = stake_chain(6, 128, 0x1d00ffff);
        // Interleave a non-stake block; the estimate must not change pairing.
        samples.insert(
            3,
            StakeSample {
                time: 1_600_000_001,
                bits: 0x1d00ffff,
                proof_of_stake: false,
            },
        );
        let with_gap = pos_kernels_per_second(&samples, 0x0f);
        let without = pos_kernels_per_second(&stake_chain(6, 128, 0x1d00ffff), 0x0f);
        assert!((with_gap - without).abs() < 1e-9);
    }

    #[test]
    fn sampling_stops_after_the_window() {
        let short = pos_kernels_per_second(&stake_chain(73, 128, 0x1d00ffff), 0x0f);
        let long = pos_kernels_per_second(&stake_chain(500, 128, 0x1d00ffff), 0x0f);
        assert!((short - long).abs() < 1e-9);
    }
}
