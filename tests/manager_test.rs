//! Tests for the manager facade: acceptance, block and state lookups, statuses, and options.

use std::sync::{Arc, Mutex};

use platform_blocks::{
    block::{options::build_options, options::OptionsError, Block},
    clock::SystemClock,
    engine::{AcceptError, Manager, VerifyError},
    events::Event,
    executor::{
        basic::{entry_key, utxo_key, BasicTxExecutor},
        ExecutionContext, ProposalTxOutcome, TxError, TxExecutor, TxOutcome,
    },
    state::{
        pluggables::KVGet, Chain, Diff, State, StateChanges, StateError, Versions,
    },
    types::{
        data_types::{BlockHeight, BlockStatus, CryptoHash, Timestamp, TxId, TxStatus},
        transaction::{utxo_id, Tx},
        update_sets::AppStateUpdates,
    },
};

mod common;

use common::{
    fixtures::{
        add_timelock_tx, advance_time_tx, base_tx, export_tx, import_tx, random_id, test_config,
        HeightExt, TestChain, APRICOT_GENESIS_TIME, BANFF_GENESIS_TIME, FUNDED_AMOUNT,
    },
    logging::setup_logger,
    mem_db::MemDB,
    mempool::MockMempool,
};

fn secs(timestamp: Timestamp, offset: u64) -> Timestamp {
    Timestamp::from_secs(timestamp.secs() + offset)
}

#[test]
fn accept_standard_test() {
    setup_logger(log::LevelFilter::Trace);
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let tx = base_tx(&[chain.funds[0]], 60);
    let block = Block::new_apricot_standard(parent, height.plus(1), vec![tx.clone()]).unwrap();
    chain.manager.verify(&block).unwrap();

    chain.manager.accept(&block.id()).unwrap();

    assert_eq!(chain.manager.last_accepted(), block.id());
    assert_eq!(chain.manager.status(&block.id()).unwrap(), BlockStatus::Accepted);
    assert_eq!(chain.manager.backend().num_pending(), 0);

    // Everything reached the key-value store.
    assert_eq!(chain.db.last_accepted().unwrap(), Some(block.id()));
    assert_eq!(chain.db.app_state(&utxo_key(&chain.funds[0])), None);
    assert!(chain.db.app_state(&utxo_key(&utxo_id(&tx.id(), 0))).is_some());
    assert_eq!(chain.db.tx(&tx.id()).unwrap().unwrap().status, TxStatus::Committed);

    // A restarted engine picks up where this one left off.
    let state = State::new(chain.db.clone()).unwrap();
    assert_eq!(state.get_last_accepted().unwrap(), block.id());
    let (stored, status) = state.get_stateless_block(&block.id()).unwrap();
    assert_eq!(stored, block);
    assert_eq!(status, BlockStatus::Accepted);
    assert_eq!(state.get_tx(&tx.id()).unwrap(), Some((tx.clone(), TxStatus::Committed)));

    assert!(matches!(
        chain.take_events().as_slice(),
        [Event::VerifyBlock(_), Event::AcceptBlock(event)] if event.block == block.id()
    ));
}

/// Blocks are accepted in order along a branch, each one on top of the state its parent left.
#[test]
fn accept_chain_of_blocks_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let first =
        Block::new_apricot_standard(parent, height.plus(1), vec![base_tx(&[chain.funds[0]], 1)]).unwrap();
    let second =
        Block::new_apricot_standard(first.id(), height.plus(2), vec![base_tx(&[chain.funds[1]], 1)])
            .unwrap();
    chain.manager.verify(&first).unwrap();
    chain.manager.verify(&second).unwrap();

    chain.manager.accept(&first.id()).unwrap();
    // The second block now reads through to the persistent state.
    assert!(chain.manager.get_state(&second.id()).is_some());
    chain.manager.accept(&second.id()).unwrap();

    assert_eq!(chain.manager.last_accepted(), second.id());
    assert_eq!(chain.db.app_state(&utxo_key(&chain.funds[0])), None);
    assert_eq!(chain.db.app_state(&utxo_key(&chain.funds[1])), None);
    assert_eq!(chain.manager.get_block(&first.id()).unwrap(), first);
}

#[test]
fn accept_atomic_requests_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let x_chain = random_id();
    let c_chain = random_id();
    let imported = random_id();
    let export = export_tx(x_chain, chain.funds[0], FUNDED_AMOUNT);
    let block = Block::new_apricot_standard(
        parent,
        height.plus(1),
        vec![export.clone(), import_tx(c_chain, &[imported])],
    )
    .unwrap();
    chain.manager.verify(&block).unwrap();
    chain.manager.accept(&block.id()).unwrap();

    let requests = chain.db.atomic_requests(&block.id()).unwrap().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[&x_chain].put_requests[0].key,
        utxo_id(&export.id(), 0).bytes().to_vec()
    );
    assert!(requests[&x_chain].remove_requests.is_empty());
    assert_eq!(requests[&c_chain].remove_requests, vec![imported.bytes().to_vec()]);

    // Atomic blocks persist their requests the same way.
    let atomic = Block::new_apricot_atomic(
        block.id(),
        block.height().plus(1),
        import_tx(c_chain, &[random_id()]),
    )
    .unwrap();
    chain.manager.verify(&atomic).unwrap();
    chain.manager.accept(&atomic.id()).unwrap();
    let state = State::new(chain.db.clone()).unwrap();
    assert!(state.get_atomic_requests(&atomic.id()).unwrap().is_some());
    assert_eq!(state.get_atomic_requests(&chain.genesis.id()).unwrap(), None);
}

/// Accepting an option writes the proposal and the option, and frees the proposal and both options.
#[test]
fn accept_option_test() {
    let mut chain = TestChain::new(BANFF_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let time = secs(BANFF_GENESIS_TIME, 1);
    let tx = add_timelock_tx(
        chain.funds[0],
        b"key",
        b"value",
        secs(BANFF_GENESIS_TIME, 30),
        secs(BANFF_GENESIS_TIME, 300),
    );
    let proposal = Block::new_banff_proposal(time, parent, height.plus(1), tx.clone(), vec![]).unwrap();
    let (commit, abort) = build_options(&proposal).unwrap();
    chain.manager.verify(&proposal).unwrap();
    chain.manager.verify(&commit).unwrap();
    chain.manager.verify(&abort).unwrap();

    chain.manager.accept(&proposal.id()).unwrap();
    assert_eq!(chain.manager.last_accepted(), proposal.id());
    // Nothing reached the store yet.
    assert_eq!(chain.db.last_accepted().unwrap(), Some(parent));
    assert_eq!(chain.manager.status(&proposal.id()).unwrap(), BlockStatus::Processing);
    // The options still read through to the proposal's parent.
    assert!(chain.manager.get_state(&commit.id()).is_some());

    chain.manager.accept(&commit.id()).unwrap();

    assert_eq!(chain.manager.last_accepted(), commit.id());
    assert_eq!(chain.manager.backend().num_pending(), 0);
    assert_eq!(chain.manager.status(&proposal.id()).unwrap(), BlockStatus::Accepted);
    assert_eq!(chain.manager.status(&commit.id()).unwrap(), BlockStatus::Accepted);
    assert_eq!(chain.manager.status(&abort.id()).unwrap(), BlockStatus::Unknown);
    assert_eq!(chain.db.last_accepted().unwrap(), Some(commit.id()));
    assert_eq!(chain.db.timestamp().unwrap(), Some(time));
    assert_eq!(chain.db.tx(&tx.id()).unwrap().unwrap().status, TxStatus::Committed);
    assert_eq!(chain.db.app_state(&utxo_key(&chain.funds[0])), None);

    // The rejection consensus sends for the discarded option is a no-op.
    chain.manager.reject(&abort.id());

    // Once the chain time reaches the entry's start time, it appears in the store.
    let (parent, height) = chain.tip();
    let block = Block::new_banff_standard(secs(BANFF_GENESIS_TIME, 30), parent, height.plus(1), vec![])
        .unwrap();
    chain.manager.verify(&block).unwrap();
    chain.manager.accept(&block.id()).unwrap();
    assert_eq!(chain.db.app_state(&entry_key(b"key")), Some(b"value".to_vec()));
}

#[test]
fn accept_abort_option_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let tx = advance_time_tx(secs(APRICOT_GENESIS_TIME, 5));
    let proposal = Block::new_apricot_proposal(parent, height.plus(1), tx.clone()).unwrap();
    let (commit, abort) = build_options(&proposal).unwrap();
    chain.manager.verify(&proposal).unwrap();
    chain.manager.verify(&commit).unwrap();
    chain.manager.verify(&abort).unwrap();

    chain.manager.accept(&proposal.id()).unwrap();
    chain.manager.accept(&abort.id()).unwrap();

    assert_eq!(chain.manager.backend().num_pending(), 0);
    assert_eq!(chain.db.timestamp().unwrap(), Some(APRICOT_GENESIS_TIME));
    assert_eq!(chain.db.tx(&tx.id()).unwrap().unwrap().status, TxStatus::Aborted);
    assert!(matches!(
        chain.manager.accept(&commit.id()),
        Err(AcceptError::MissingBlockState { block }) if block == commit.id()
    ));
}

#[test]
fn accept_unknown_block_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let block = random_id();
    assert!(matches!(
        chain.manager.accept(&block),
        Err(AcceptError::MissingBlockState { block: missing }) if missing == block
    ));
    assert_eq!(chain.manager.last_accepted(), chain.genesis.id());
}

/// A failed write into the key-value store is reported as a commit error.
#[test]
fn accept_commit_failure_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let block =
        Block::new_apricot_standard(parent, height.plus(1), vec![base_tx(&[chain.funds[0]], 1)]).unwrap();
    chain.manager.verify(&block).unwrap();
    let num_entries = chain.db.len();

    chain.db.set_fail_writes(true);
    assert!(matches!(
        chain.manager.accept(&block.id()),
        Err(AcceptError::Commit(StateError::Write(_)))
    ));
    assert_eq!(chain.db.len(), num_entries);
    assert_eq!(chain.db.last_accepted().unwrap(), Some(chain.genesis.id()));

    // Nothing was written, so the block is still pending, and no buffered write leaks into the next
    // commit.
    assert_eq!(chain.manager.last_accepted(), chain.genesis.id());
    assert_eq!(chain.manager.status(&block.id()).unwrap(), BlockStatus::Processing);
    assert!(chain.take_events().iter().all(|event| !matches!(event, Event::AcceptBlock(_))));

    chain.db.set_fail_writes(false);
    chain.manager.accept(&block.id()).unwrap();
    assert_eq!(chain.db.last_accepted().unwrap(), Some(block.id()));
    assert_eq!(chain.manager.status(&block.id()).unwrap(), BlockStatus::Accepted);
}

/// When the write of an accepted option fails, the proposal and both of its options stay pending.
#[test]
fn accept_option_commit_failure_test() {
    let mut chain = TestChain::new(BANFF_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let time = secs(BANFF_GENESIS_TIME, 1);
    let tx = add_timelock_tx(
        chain.funds[0],
        b"key",
        b"value",
        secs(BANFF_GENESIS_TIME, 30),
        secs(BANFF_GENESIS_TIME, 300),
    );
    let proposal = Block::new_banff_proposal(time, parent, height.plus(1), tx, vec![]).unwrap();
    let (commit, abort) = build_options(&proposal).unwrap();
    for block in [&proposal, &commit, &abort] {
        chain.manager.verify(block).unwrap();
    }
    chain.manager.accept(&proposal.id()).unwrap();

    chain.db.set_fail_writes(true);
    assert!(matches!(
        chain.manager.accept(&commit.id()),
        Err(AcceptError::Commit(StateError::Write(_)))
    ));
    assert_eq!(chain.manager.backend().num_pending(), 3);
    assert_eq!(chain.db.last_accepted().unwrap(), Some(parent));

    chain.db.set_fail_writes(false);
    chain.manager.accept(&commit.id()).unwrap();
    assert_eq!(chain.manager.backend().num_pending(), 0);
    assert_eq!(chain.db.last_accepted().unwrap(), Some(commit.id()));
    assert_eq!(chain.manager.status(&proposal.id()).unwrap(), BlockStatus::Accepted);
}

#[test]
fn get_block_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let (parent, height) = chain.tip();
    let block =
        Block::new_apricot_standard(parent, height.plus(1), vec![base_tx(&[chain.funds[0]], 1)]).unwrap();

    assert_eq!(chain.manager.get_block(&chain.genesis.id()).unwrap(), chain.genesis);
    assert!(matches!(
        chain.manager.get_block(&block.id()),
        Err(StateError::NotFound(_))
    ));

    chain.manager.verify(&block).unwrap();
    assert_eq!(chain.manager.get_block(&block.id()).unwrap(), block);

    chain.manager.accept(&block.id()).unwrap();
    assert_eq!(chain.manager.get_block(&block.id()).unwrap(), block);
}

#[test]
fn get_state_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let genesis = chain.genesis.id();
    assert_eq!(
        chain.manager.get_state(&genesis).unwrap().get_timestamp().unwrap(),
        APRICOT_GENESIS_TIME
    );
    assert!(chain.manager.get_state(&random_id()).is_none());

    let block = Block::new_apricot_standard(
        genesis,
        BlockHeight::new(1),
        vec![base_tx(&[chain.funds[0]], 1)],
    )
    .unwrap();
    chain.manager.verify(&block).unwrap();
    let state = chain.manager.get_state(&block.id()).unwrap();
    assert_eq!(state.get_app_state(&utxo_key(&chain.funds[0])).unwrap(), None);
    assert!(state.get_app_state(&utxo_key(&chain.funds[1])).unwrap().is_some());

    // Once a child is accepted, the state after its parent is gone.
    chain.manager.accept(&block.id()).unwrap();
    assert!(chain.manager.get_state(&genesis).is_none());
    assert!(chain.manager.get_state(&block.id()).is_some());
}

#[test]
fn options_order_test() {
    let mut chain = TestChain::new(APRICOT_GENESIS_TIME);
    let (parent, height) = chain.tip();

    // The entry starts after the local clock, so committing is preferred.
    let preferred_commit = Block::new_apricot_proposal(
        parent,
        height.plus(1),
        add_timelock_tx(
            chain.funds[0],
            b"key",
            b"value",
            secs(APRICOT_GENESIS_TIME, 100),
            secs(APRICOT_GENESIS_TIME, 200),
        ),
    )
    .unwrap();
    chain.manager.verify(&preferred_commit).unwrap();
    let (commit, abort) = build_options(&preferred_commit).unwrap();
    assert_eq!(chain.manager.options(&preferred_commit.id()).unwrap(), [commit, abort]);

    // The entry starts before the local clock, so aborting is preferred.
    let preferred_abort = Block::new_apricot_proposal(
        parent,
        height.plus(1),
        add_timelock_tx(
            chain.funds[1],
            b"key",
            b"value",
            secs(APRICOT_GENESIS_TIME, 30),
            secs(APRICOT_GENESIS_TIME, 200),
        ),
    )
    .unwrap();
    chain.manager.verify(&preferred_abort).unwrap();
    let (commit, abort) = build_options(&preferred_abort).unwrap();
    assert_eq!(chain.manager.options(&preferred_abort.id()).unwrap(), [abort, commit]);

    assert!(matches!(
        chain.manager.options(&random_id()),
        Err(OptionsError::MissingBlockState { .. })
    ));

    let standard =
        Block::new_apricot_standard(parent, height.plus(1), vec![base_tx(&[chain.funds[2]], 1)]).unwrap();
    chain.manager.verify(&standard).unwrap();
    assert!(matches!(
        chain.manager.options(&standard.id()),
        Err(OptionsError::NotOracle { .. })
    ));
}

/// Wraps [`BasicTxExecutor`], giving every standard transaction a post-accept callback that records
/// its id.
struct RecordingExecutor {
    inner: BasicTxExecutor,
    accepted: Arc<Mutex<Vec<TxId>>>,
}

impl TxExecutor for RecordingExecutor {
    fn next_change_time(&self, chain: &dyn Chain) -> Result<Timestamp, TxError> {
        self.inner.next_change_time(chain)
    }

    fn advance_time_to(
        &self,
        ctx: ExecutionContext,
        chain: &dyn Chain,
        new_time: Timestamp,
    ) -> Result<StateChanges, TxError> {
        self.inner.advance_time_to(ctx, chain, new_time)
    }

    fn execute_standard(
        &self,
        ctx: ExecutionContext,
        tx: &Tx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError> {
        let mut outcome = self.inner.execute_standard(ctx, tx, diff, versions)?;
        let accepted = self.accepted.clone();
        let tx = tx.id();
        outcome.on_accept = Some(Box::new(move || accepted.lock().unwrap().push(tx)));
        Ok(outcome)
    }

    fn execute_proposal(
        &self,
        ctx: ExecutionContext,
        tx: &Tx,
        on_commit: &mut Diff,
        on_abort: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<ProposalTxOutcome, TxError> {
        self.inner
            .execute_proposal(ctx, tx, on_commit, on_abort, versions)
    }

    fn execute_atomic(
        &self,
        ctx: ExecutionContext,
        tx: &Tx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError> {
        self.inner.execute_atomic(ctx, tx, diff, versions)
    }
}

/// The post-accept callbacks of a block's transactions run in block order, and only on acceptance.
#[test]
fn on_accept_callbacks_test() {
    let db = MemDB::new();
    let genesis = Block::new_apricot_commit(CryptoHash::default(), BlockHeight::new(0)).unwrap();
    let funds = [random_id(), random_id()];
    let mut initial_app_state = AppStateUpdates::new();
    for utxo in &funds {
        initial_app_state.insert(
            utxo_key(utxo),
            borsh::BorshSerialize::try_to_vec(&platform_blocks::types::transaction::Utxo {
                amount: 10,
                owner: vec![],
            })
            .unwrap(),
        );
    }
    let state = State::initialize(db, &genesis, APRICOT_GENESIS_TIME, &initial_app_state).unwrap();

    let accepted = Arc::new(Mutex::new(Vec::new()));
    let executor = RecordingExecutor {
        inner: BasicTxExecutor::new(),
        accepted: accepted.clone(),
    };
    let mut manager = Manager::new(
        test_config(),
        state,
        MockMempool::new(),
        executor,
        Box::new(SystemClock),
        None,
    )
    .unwrap();

    let txs = vec![base_tx(&[funds[0]], 10), base_tx(&[funds[1]], 10)];
    let block = Block::new_apricot_standard(genesis.id(), BlockHeight::new(1), txs.clone()).unwrap();
    manager.verify(&block).unwrap();
    assert!(accepted.lock().unwrap().is_empty());

    manager.accept(&block.id()).unwrap();
    assert_eq!(*accepted.lock().unwrap(), vec![txs[0].id(), txs[1].id()]);
}

/// No block can extend a block at the greatest representable height.
#[test]
fn child_of_max_height_block_test() {
    let genesis =
        Block::new_apricot_commit(CryptoHash::default(), BlockHeight::new(u64::MAX)).unwrap();
    let state =
        State::initialize(MemDB::new(), &genesis, APRICOT_GENESIS_TIME, &AppStateUpdates::new())
            .unwrap();
    let mut manager = Manager::new(
        test_config(),
        state,
        MockMempool::new(),
        BasicTxExecutor::new(),
        Box::new(SystemClock),
        None,
    )
    .unwrap();

    let child =
        Block::new_apricot_standard(genesis.id(), BlockHeight::new(u64::MAX), vec![base_tx(&[random_id()], 1)])
            .unwrap();
    assert!(matches!(
        manager.verify(&child),
        Err(VerifyError::HeightOverflow { parent, .. }) if parent == genesis.id()
    ));
    assert!(!manager.backend().is_pending(&child.id()));
}
