use std::sync::Arc;

use emberd_chainstate::stake::{
    check_coinstake_timestamp, check_kernel, check_proof_of_stake, get_kernel_info,
    resolve_kernel_coin, StakeError, StakeValidationState,
};
use emberd_chainstate::state::ChainState;
use emberd_consensus::params::{consensus_params, Network};
use emberd_consensus::Hash256;
use emberd_pos::kernel::stake_kernel_hash;
use emberd_primitives::block::{Block, BlockHeader, CURRENT_VERSION};
use emberd_primitives::outpoint::OutPoint;
use emberd_primitives::transaction::{
    BlindOut, DataOut, Transaction, TxIn, TxOut, TxOutVariant, BLIND_COMMITMENT_SIZE,
    EMBER_TX_VERSION,
};
use emberd_storage::memory::MemoryStore;

const T0: u32 = 1_600_000_000;
const SOFT_BITS: u32 = 0x207fffff;
const HARD_BITS: u32 = 0x1d00ffff;

fn p51() -> Vec<u8> {
    vec![0x51]
}

fn cond_stake_script() -> Vec<u8> {
    // OP_ISCOINSTAKE OP_IF OP_1 OP_ELSE OP_1 OP_ENDIF
    vec![0xb8, 0x63, 0x51, 0x67, 0x51, 0x68]
}

fn p2pk_stub() -> Vec<u8> {
    let mut script = vec![0x21, 0x02];
    script.extend_from_slice(&[0xee; 32]);
    script.push(0xac);
    script
}

fn standard_out(value: i64, script: Vec<u8>) -> TxOutVariant {
    TxOutVariant::Standard(TxOut {
        value,
        script_pubkey: script,
    })
}

fn data_out() -> TxOutVariant {
    TxOutVariant::Data(DataOut {
        data: vec![0x01, 0x02],
    })
}

fn null_input(script_sig: Vec<u8>) -> TxIn {
    TxIn {
        prevout: OutPoint::null(),
        script_sig,
        sequence: u32::MAX,
    }
}

fn spend_input(prevout: OutPoint) -> TxIn {
    TxIn {
        prevout,
        script_sig: Vec::new(),
        sequence: u32::MAX,
    }
}

/// Genesis coinbase carrying every coin the scenarios stake.
fn genesis_coinbase() -> Transaction {
    Transaction {
        version: EMBER_TX_VERSION,
        vin: vec![null_input(0u32.to_le_bytes().to_vec())],
        vpout: vec![
            standard_out(1_000_000_000, p51()),
            standard_out(2, p51()),
            standard_out(1, p51()),
            standard_out(2, p51()),
            standard_out(100, cond_stake_script()),
            standard_out(50, cond_stake_script()),
            standard_out(2, p2pk_stub()),
            standard_out(10, p51()),
        ],
        lock_time: 0,
    }
}

fn filler_coinbase(height: u32, extra: Option<(i64, Vec<u8>)>) -> Transaction {
    let mut vpout = vec![standard_out(0, p51())];
    if let Some((value, script)) = extra {
        vpout.push(standard_out(value, script));
    }
    Transaction {
        version: EMBER_TX_VERSION,
        vin: vec![null_input(height.to_le_bytes().to_vec())],
        vpout,
        lock_time: 0,
    }
}

fn make_header(prev_block: Hash256, time: u32) -> BlockHeader {
    BlockHeader {
        version: CURRENT_VERSION,
        prev_block,
        merkle_root: [0u8; 32],
        witness_merkle_root: [0u8; 32],
        time,
        bits: SOFT_BITS,
        nonce: 0,
    }
}

fn make_block(prev_block: Hash256, time: u32, transactions: Vec<Transaction>) -> Block {
    Block {
        header: make_header(prev_block, time),
        transactions,
        block_sig: Vec::new(),
    }
}

struct Harness {
    chain_state: ChainState<MemoryStore>,
    genesis_txid: Hash256,
    blocks: Vec<Block>,
}

impl Harness {
    fn genesis_prevout(&self, index: u32) -> OutPoint {
        OutPoint {
            hash: self.genesis_txid,
            index,
        }
    }

    fn connect(&mut self, transactions: Vec<Transaction>) {
        let prev = self.blocks.last().expect("genesis").hash();
        let time = T0 + self.blocks.len() as u32 * 16;
        let block = make_block(prev, time, transactions);
        self.chain_state.connect_block(&block).expect("connect");
        self.blocks.push(block);
    }

    fn extend_with_fillers(&mut self, target_height: i32) {
        while self.chain_state.tip().expect("tip").height < target_height {
            let height = self.blocks.len() as u32;
            self.connect(vec![filler_coinbase(height, filler_extra(height))]);
        }
    }
}

// Block 19's coinbase carries one extra coin so a freshly-created kernel is
// available near the tip for the depth tests.
fn filler_extra(height: u32) -> Option<(i64, Vec<u8>)> {
    (height == 19).then(|| (5, p51()))
}

fn base_harness(fillers: i32) -> Harness {
    let params = consensus_params(Network::Regtest);
    let chain_state = ChainState::new(Arc::new(MemoryStore::new()), params);

    let coinbase = genesis_coinbase();
    let genesis_txid = coinbase.txid();
    let genesis = make_block([0u8; 32], T0, vec![coinbase]);
    chain_state.connect_block(&genesis).expect("genesis");

    let mut harness = Harness {
        chain_state,
        genesis_txid,
        blocks: vec![genesis],
    };
    harness.extend_with_fillers(fillers);
    harness
}

/// Base chain plus a block at height 21 spending the genesis coin at index 3,
/// extended to `target_height`.
fn spent_kernel_harness(target_height: i32) -> Harness {
    let mut harness = base_harness(20);
    let spender = Transaction {
        version: EMBER_TX_VERSION,
        vin: vec![spend_input(harness.genesis_prevout(3))],
        vpout: vec![standard_out(2, vec![0x52])],
        lock_time: 0,
    };
    harness.connect(vec![filler_coinbase(21, None), spender]);
    harness.extend_with_fillers(target_height);
    harness
}

fn coinstake_tx(kernel: OutPoint, extra: Vec<OutPoint>, pay: Vec<TxOutVariant>) -> Transaction {
    let mut vin = vec![spend_input(kernel)];
    vin.extend(extra.into_iter().map(spend_input));
    let mut vpout = vec![data_out()];
    vpout.extend(pay);
    Transaction {
        version: EMBER_TX_VERSION,
        vin,
        vpout,
        lock_time: 0,
    }
}

#[test]
fn golden_kernel_is_accepted_with_matching_proof() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let kernel = harness.genesis_prevout(1);
    let tx = coinstake_tx(kernel.clone(), Vec::new(), vec![standard_out(2, p51())]);

    let n_time = (T0 + 21 * 16) as i64;
    let mut state = StakeValidationState::default();
    let proof =
        check_proof_of_stake(&harness.chain_state, &tip, &tx, n_time, SOFT_BITS, &mut state)
            .expect("kernel accepted");

    assert_eq!(
        proof.hash_proof,
        stake_kernel_hash(&tip.stake_modifier, T0, &kernel, n_time as u32)
    );
    assert!(!state.kernel_spent());
}

#[test]
fn losing_ticket_is_an_ordinary_rejection() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let tx = coinstake_tx(
        harness.genesis_prevout(2),
        Vec::new(),
        vec![standard_out(1, p51())],
    );

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 21 * 16) as i64,
        HARD_BITS,
        &mut state,
    )
    .expect_err("losing ticket");
    assert!(matches!(err, StakeError::CheckKernelFailed));
    assert_eq!(err.dos_score(), 1);
}

#[test]
fn block_time_before_kernel_time_is_rejected() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let tx = coinstake_tx(
        harness.genesis_prevout(1),
        Vec::new(),
        vec![standard_out(2, p51())],
    );

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 - 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("time violation");
    assert!(matches!(err, StakeError::TimeViolation));
}

#[test]
fn immature_kernel_is_rejected() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    // The coin minted at height 19 sits one block below the tip; required
    // depth at height 20 is min(10 - 1, 20 / 2) = 9.
    let fresh_coin = OutPoint {
        hash: harness.blocks[19].transactions[0].txid(),
        index: 1,
    };
    let tx = coinstake_tx(fresh_coin, Vec::new(), vec![standard_out(5, p51())]);

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 21 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("immature");
    assert!(matches!(err, StakeError::InvalidStakeDepth));
    assert_eq!(err.dos_score(), 100);
}

#[test]
fn spent_kernel_within_reorg_window_is_accepted() {
    let harness = spent_kernel_harness(25);
    let tip = harness.chain_state.tip().expect("tip");
    assert_eq!(tip.height, 25);
    let kernel = harness.genesis_prevout(3);
    assert!(harness
        .chain_state
        .utxo_coin(&kernel)
        .expect("utxo lookup")
        .is_none());

    let tx = coinstake_tx(kernel, Vec::new(), vec![standard_out(2, p51())]);
    let mut state = StakeValidationState::default();
    check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 26 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect("spent kernel accepted");
    assert!(state.kernel_spent());
}

#[test]
fn spent_kernel_beyond_reorg_window_is_rejected() {
    let harness = spent_kernel_harness(126);
    let tip = harness.chain_state.tip().expect("tip");
    assert_eq!(tip.height, 126);
    let kernel = harness.genesis_prevout(3);

    let tx = coinstake_tx(kernel.clone(), Vec::new(), vec![standard_out(2, p51())]);
    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 127 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("too deep");
    assert!(matches!(err, StakeError::InvalidPrevout));
    assert_eq!(err.dos_score(), 100);

    // Re-verifying the database relaxes the bound.
    let resolved =
        resolve_kernel_coin(&harness.chain_state, &kernel, tip.height, true).expect("verifying db");
    assert!(resolved.spent_in_chain);
    assert_eq!(resolved.coin.value, 2);
}

#[test]
fn unknown_prevout_is_rejected_with_low_score() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let tx = coinstake_tx(
        OutPoint {
            hash: [0x77; 32],
            index: 0,
        },
        Vec::new(),
        vec![standard_out(2, p51())],
    );

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 21 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("unknown prevout");
    assert!(matches!(err, StakeError::PrevoutNotFound));
    assert_eq!(err.dos_score(), 20);
}

#[test]
fn non_coinstake_transaction_is_malformed() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let tx = Transaction {
        version: EMBER_TX_VERSION,
        vin: vec![spend_input(harness.genesis_prevout(1))],
        vpout: vec![standard_out(2, p51())],
        lock_time: 0,
    };

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 21 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("malformed");
    assert!(matches!(err, StakeError::MalformedTxn));
    assert_eq!(err.dos_score(), 100);
}

#[test]
fn kernel_script_failure_is_rejected_eagerly() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    // Genesis output 6 demands a signature; the coinstake provides none.
    let tx = coinstake_tx(
        harness.genesis_prevout(6),
        Vec::new(),
        vec![standard_out(2, p51())],
    );

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 21 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("script failure");
    assert!(matches!(err, StakeError::VerifyScriptFailed(_)));
    assert_eq!(err.dos_score(), 100);
}

#[test]
fn coinstake_op_split_enforces_amount_returned_to_kernel_script() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let n_time = (T0 + 21 * 16) as i64;

    // Inputs 100 + 50 to the same conditional stake script; outputs pay back
    // only 140.
    let underpay = coinstake_tx(
        harness.genesis_prevout(4),
        vec![harness.genesis_prevout(5)],
        vec![standard_out(140, cond_stake_script())],
    );
    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &underpay,
        n_time,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("underpayment");
    assert!(matches!(err, StakeError::VerifyAmountScriptFailed));
    assert_eq!(err.dos_score(), 100);

    // Paying the full input value back is accepted; the reward may go
    // anywhere beyond that.
    let exact = coinstake_tx(
        harness.genesis_prevout(4),
        vec![harness.genesis_prevout(5)],
        vec![
            standard_out(150, cond_stake_script()),
            standard_out(25, p51()),
        ],
    );
    let mut state = StakeValidationState::default();
    check_proof_of_stake(&harness.chain_state, &tip, &exact, n_time, SOFT_BITS, &mut state)
        .expect("exact repayment accepted");
}

#[test]
fn coinstake_op_split_rejects_mixed_input_scripts() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let tx = coinstake_tx(
        harness.genesis_prevout(4),
        vec![harness.genesis_prevout(1)],
        vec![standard_out(102, cond_stake_script())],
    );

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 21 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("mixed scripts");
    assert!(matches!(err, StakeError::MixedPrevoutScripts));
    assert_eq!(err.dos_score(), 100);
}

#[test]
fn coinstake_op_split_rejects_non_data_non_standard_outputs() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let tx = coinstake_tx(
        harness.genesis_prevout(4),
        Vec::new(),
        vec![
            standard_out(100, cond_stake_script()),
            TxOutVariant::Blind(BlindOut {
                commitment: [0x05; BLIND_COMMITMENT_SIZE],
                script_pubkey: cond_stake_script(),
            }),
        ],
    );

    let mut state = StakeValidationState::default();
    let err = check_proof_of_stake(
        &harness.chain_state,
        &tip,
        &tx,
        (T0 + 21 * 16) as i64,
        SOFT_BITS,
        &mut state,
    )
    .expect_err("bad output type");
    assert!(matches!(err, StakeError::BadOutputType));
    assert_eq!(err.dos_score(), 100);
}

#[test]
fn staker_oracle_probes_without_scoring() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let n_time = (T0 + 21 * 16) as i64;

    let won = check_kernel(
        &harness.chain_state,
        &tip,
        SOFT_BITS,
        n_time,
        &harness.genesis_prevout(1),
    )
    .expect("probe");
    assert_eq!(won, Some(T0));

    let lost = check_kernel(
        &harness.chain_state,
        &tip,
        HARD_BITS,
        n_time,
        &harness.genesis_prevout(2),
    )
    .expect("probe");
    assert_eq!(lost, None);

    let immature = check_kernel(
        &harness.chain_state,
        &tip,
        SOFT_BITS,
        n_time,
        &OutPoint {
            hash: harness.blocks[19].transactions[0].txid(),
            index: 1,
        },
    )
    .expect("probe");
    assert_eq!(immature, None);
}

#[test]
fn staker_oracle_never_stakes_spent_coins() {
    let harness = spent_kernel_harness(25);
    let tip = harness.chain_state.tip().expect("tip");

    let probed = check_kernel(
        &harness.chain_state,
        &tip,
        SOFT_BITS,
        (T0 + 26 * 16) as i64,
        &harness.genesis_prevout(3),
    )
    .expect("probe");
    assert_eq!(probed, None);
}

#[test]
fn kernel_info_recomputes_from_header_data() {
    let harness = base_harness(20);
    let tip = harness.chain_state.tip().expect("tip");
    let kernel = harness.genesis_prevout(1);
    let tx = coinstake_tx(kernel.clone(), Vec::new(), vec![standard_out(2, p51())]);

    let info = get_kernel_info(&harness.chain_state, &tip, &tx)
        .expect("lookup")
        .expect("kernel info");
    assert_eq!(info.value, 2);
    assert_eq!(info.script_pubkey, p51());
    assert_eq!(info.block_hash, harness.blocks[0].hash());

    let prev_index = harness
        .chain_state
        .block_index(&tip.prev_hash)
        .expect("lookup")
        .expect("prev index");
    assert_eq!(
        info.hash,
        stake_kernel_hash(&prev_index.stake_modifier, T0, &kernel, tip.time)
    );

    let unknown = coinstake_tx(
        OutPoint {
            hash: [0x99; 32],
            index: 0,
        },
        Vec::new(),
        vec![standard_out(2, p51())],
    );
    assert!(get_kernel_info(&harness.chain_state, &tip, &unknown)
        .expect("lookup")
        .is_none());
}

#[test]
fn coinstake_timestamp_gate_uses_chain_params() {
    let harness = base_harness(2);
    assert!(check_coinstake_timestamp(
        &harness.chain_state,
        2,
        T0 as i64
    ));
    assert!(check_coinstake_timestamp(
        &harness.chain_state,
        2,
        (T0 + 16) as i64
    ));
    assert!(!check_coinstake_timestamp(
        &harness.chain_state,
        2,
        (T0 + 1) as i64
    ));
}

#[test]
fn spending_moves_coins_to_the_cache_and_disconnect_restores_them() {
    let mut harness = base_harness(20);
    let kernel = harness.genesis_prevout(3);
    assert!(harness
        .chain_state
        .utxo_coin(&kernel)
        .expect("lookup")
        .is_some());

    let spender = Transaction {
        version: EMBER_TX_VERSION,
        vin: vec![spend_input(kernel.clone())],
        vpout: vec![standard_out(2, vec![0x52])],
        lock_time: 0,
    };
    harness.connect(vec![filler_coinbase(21, None), spender]);

    assert!(harness
        .chain_state
        .utxo_coin(&kernel)
        .expect("lookup")
        .is_none());
    let spent = harness
        .chain_state
        .spent_coin(&kernel)
        .expect("lookup")
        .expect("cached");
    assert_eq!(spent.spent_height, 21);
    assert_eq!(spent.coin.value, 2);

    let tip_block = harness.blocks.last().expect("tip block").clone();
    harness
        .chain_state
        .disconnect_tip(&tip_block)
        .expect("disconnect");

    assert_eq!(harness.chain_state.tip().expect("tip").height, 20);
    assert!(harness
        .chain_state
        .utxo_coin(&kernel)
        .expect("lookup")
        .is_some());
    assert!(harness
        .chain_state
        .spent_coin(&kernel)
        .expect("lookup")
        .is_none());
}

#[test]
fn estimator_is_zero_without_stake_blocks_and_positive_with_them() {
    let harness = base_harness(20);
    assert_eq!(harness.chain_state.pos_kernels_per_second(), 0.0);

    let mut harness = base_harness(0);
    let mut kernel = harness.genesis_prevout(7);
    for _ in 0..5 {
        let coinstake = coinstake_tx(kernel.clone(), Vec::new(), vec![standard_out(10, p51())]);
        kernel = OutPoint {
            hash: coinstake.txid(),
            index: 1,
        };
        harness.connect(vec![coinstake]);
    }
    assert!(harness
        .chain_state
        .tip()
        .expect("tip")
        .is_proof_of_stake());
    assert!(harness.chain_state.pos_kernels_per_second() > 0.0);
}
