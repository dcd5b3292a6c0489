//! End-to-end ledger flow: genesis, pending transactions, mining, restart.

use emberchain::block::{Hash, BLOCK_REWARD};
use emberchain::crypto::KeyPair;
use emberchain::genesis::Genesis;
use emberchain::ledger::{self, State};
use emberchain::mempool::Mempool;
use emberchain::miner::{self, PendingBlock};
use emberchain::transaction::{SignedTx, Tx};
use std::sync::atomic::AtomicBool;
use tempfile::TempDir;

const DIFFICULTY: usize = 1;

#[test]
fn test_transfer_mine_and_restart() {
    let alice_key = KeyPair::generate();
    let alice = alice_key.account();
    let bob = KeyPair::generate().account();

    let dir = TempDir::new().unwrap();
    ledger::init_data_dir(dir.path(), &Genesis::default_devnet(alice)).unwrap();
    let mut state = State::new_from_disk(dir.path(), DIFFICULTY).unwrap();
    let mut pool = Mempool::new(&state);

    // Alice pays Bob 2000.
    let tx = SignedTx::sign(Tx::new(alice, bob, 2000, 1, ""), &alice_key).unwrap();
    assert!(pool.admit(tx, "local").unwrap());

    // Alice mines the pending transactions into block 0.
    let pending = PendingBlock::new(
        state.latest_block_hash(),
        state.next_block_number(),
        alice,
        pool.pending_txs(),
    );
    let block = miner::mine(pending, DIFFICULTY, &AtomicBool::new(false)).unwrap();
    state.add_block(block.clone()).unwrap();
    pool.remove_mined(&block, &state);

    assert_eq!(state.balance(&alice), 1_000_000 - 2000 + BLOCK_REWARD);
    assert_eq!(state.balance(&bob), 2000);
    assert_eq!(state.next_account_nonce(&alice), 2);
    assert_eq!(state.next_block_number(), 1);
    assert_eq!(pool.pending_len(), 0);

    // A restart replays the log into the same state.
    let replayed = State::new_from_disk(dir.path(), DIFFICULTY).unwrap();
    assert_eq!(replayed.balances(), state.balances());
    assert_eq!(replayed.latest_block_hash(), state.latest_block_hash());
    assert_eq!(replayed.next_block_number(), 1);
}

#[test]
fn test_competing_block_preempts_local_pending() {
    let alice_key = KeyPair::generate();
    let alice = alice_key.account();
    let bob_key = KeyPair::generate();
    let bob = bob_key.account();

    let dir = TempDir::new().unwrap();
    ledger::init_data_dir(dir.path(), &Genesis::default_devnet(alice)).unwrap();
    let mut state = State::new_from_disk(dir.path(), DIFFICULTY).unwrap();
    let mut pool = Mempool::new(&state);

    // Two local pending transactions from Alice.
    let tx1 = SignedTx::sign(Tx::new(alice, bob, 100, 1, ""), &alice_key).unwrap();
    let tx2 = SignedTx::sign(Tx::new(alice, bob, 200, 2, ""), &alice_key).unwrap();
    pool.admit(tx1.clone(), "local").unwrap();
    pool.admit(tx2.clone(), "local").unwrap();

    // A peer wins the race with a block containing only the first one.
    let peer_block = miner::mine(
        PendingBlock::new(Hash::empty(), 0, bob, vec![tx1]),
        DIFFICULTY,
        &AtomicBool::new(false),
    )
    .unwrap();
    state.add_block(peer_block.clone()).unwrap();
    pool.remove_mined(&peer_block, &state);

    // The second transaction survives and still applies on the new head.
    assert_eq!(pool.pending_len(), 1);
    let survivors = pool.pending_txs();
    assert_eq!(survivors[0].hash(), tx2.hash());
    assert_eq!(state.balance(&bob), 100 + BLOCK_REWARD);

    // Mining the survivor extends the chain to height 2.
    let local_block = miner::mine(
        PendingBlock::new(
            state.latest_block_hash(),
            state.next_block_number(),
            alice,
            survivors,
        ),
        DIFFICULTY,
        &AtomicBool::new(false),
    )
    .unwrap();
    state.add_block(local_block.clone()).unwrap();
    pool.remove_mined(&local_block, &state);

    assert_eq!(state.next_block_number(), 2);
    assert_eq!(state.balance(&bob), 300 + BLOCK_REWARD);
    assert_eq!(state.next_account_nonce(&alice), 3);
    assert_eq!(pool.pending_len(), 0);
}

#[test]
fn test_value_is_conserved_across_blocks() {
    let alice_key = KeyPair::generate();
    let alice = alice_key.account();
    let bob = KeyPair::generate().account();

    let dir = TempDir::new().unwrap();
    ledger::init_data_dir(dir.path(), &Genesis::default_devnet(alice)).unwrap();
    let mut state = State::new_from_disk(dir.path(), DIFFICULTY).unwrap();

    for nonce in 1..=3u64 {
        let tx = SignedTx::sign(Tx::new(alice, bob, 1000 * nonce, nonce, ""), &alice_key).unwrap();
        let block = miner::mine(
            PendingBlock::new(
                state.latest_block_hash(),
                state.next_block_number(),
                alice,
                vec![tx],
            ),
            DIFFICULTY,
            &AtomicBool::new(false),
        )
        .unwrap();
        state.add_block(block).unwrap();
    }

    // Total supply is genesis plus one reward per block.
    let total: u64 = state.balances().values().sum();
    assert_eq!(total, 1_000_000 + 3 * BLOCK_REWARD);
}
