//! A ready-to-use block engine over in-memory pluggables, and builders for the transactions the
//! reference executor understands.

use std::sync::mpsc::{self, Receiver};

use borsh::BorshSerialize;

use platform_blocks::{
    block::Block,
    config::Configuration,
    engine::Manager,
    events::Event,
    executor::basic::{utxo_key, BasicTxExecutor},
    state::State,
    types::{
        data_types::{BlockHeight, ChainId, CryptoHash, InputId, Timestamp},
        transaction::{
            AddTimelockTx, AdvanceTimeTx, BaseTx, ExportTx, ImportTx, ImportedInput, TimelockEntry,
            Tx, UnsignedTx, Utxo,
        },
        update_sets::AppStateUpdates,
    },
};

use super::{clock::MockClock, mem_db::MemDB, mempool::MockMempool};

pub(crate) const APRICOT_PHASE5_TIME: Timestamp = Timestamp::from_secs(1_500_000);
pub(crate) const BANFF_TIME: Timestamp = Timestamp::from_secs(2_000_000);

/// Genesis time of a chain that starts before both forks.
pub(crate) const APRICOT_GENESIS_TIME: Timestamp = Timestamp::from_secs(1_000_000);

/// Genesis time of a chain that starts after both forks.
pub(crate) const BANFF_GENESIS_TIME: Timestamp = Timestamp::from_secs(2_500_000);

/// Amount held by each of the UTXOs a [`TestChain`] starts with.
pub(crate) const FUNDED_AMOUNT: u64 = 100;

const NUM_FUNDED_UTXOS: usize = 8;

pub(crate) type TestManager = Manager<MemDB, MockMempool, BasicTxExecutor>;

/// A block engine initialized with a genesis block and a handful of funded UTXOs.
pub(crate) struct TestChain {
    pub(crate) manager: TestManager,
    pub(crate) db: MemDB,
    pub(crate) mempool: MockMempool,
    pub(crate) clock: MockClock,
    pub(crate) events: Receiver<Event>,
    pub(crate) genesis: Block,
    pub(crate) funds: Vec<InputId>,
}

impl TestChain {
    /// A chain whose genesis chain time is `genesis_time`, with the local clock set a minute later.
    pub(crate) fn new(genesis_time: Timestamp) -> TestChain {
        TestChain::with_config(test_config(), genesis_time)
    }

    pub(crate) fn with_config(config: Configuration, genesis_time: Timestamp) -> TestChain {
        let db = MemDB::new();
        let mempool = MockMempool::new();
        let clock = MockClock::new(Timestamp::from_secs(genesis_time.secs() + 60));
        let genesis = Block::new_apricot_commit(CryptoHash::default(), BlockHeight::new(0)).unwrap();

        let funds: Vec<InputId> = (0..NUM_FUNDED_UTXOS).map(|_| random_id()).collect();
        let mut initial_app_state = AppStateUpdates::new();
        for utxo in &funds {
            initial_app_state.insert(utxo_key(utxo), funded_utxo().try_to_vec().unwrap());
        }

        let state = State::initialize(db.clone(), &genesis, genesis_time, &initial_app_state).unwrap();
        let (sender, events) = mpsc::channel();
        let mut manager = Manager::new(
            config,
            state,
            mempool.clone(),
            BasicTxExecutor::new(),
            Box::new(clock.clone()),
            Some(sender),
        )
        .unwrap();
        manager.set_bootstrapped(true);

        TestChain {
            manager,
            db,
            mempool,
            clock,
            events,
            genesis,
            funds,
        }
    }

    /// Id and height of the last accepted block, for building its child.
    pub(crate) fn tip(&self) -> (CryptoHash, BlockHeight) {
        let last_accepted = self.manager.last_accepted();
        let height = self.manager.get_block(&last_accepted).unwrap().height();
        (last_accepted, height)
    }

    /// Drain the events published so far.
    pub(crate) fn take_events(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }
}

pub(crate) fn test_config() -> Configuration {
    Configuration::builder()
        .apricot_phase5_time(APRICOT_PHASE5_TIME)
        .banff_time(BANFF_TIME)
        .build()
}

pub(crate) trait HeightExt {
    /// The height `n` blocks above this one.
    fn plus(self, n: u64) -> BlockHeight;
}

impl HeightExt for BlockHeight {
    fn plus(self, n: u64) -> BlockHeight {
        self.checked_add(n).unwrap()
    }
}

pub(crate) fn random_id() -> CryptoHash {
    CryptoHash::new(rand::random())
}

fn funded_utxo() -> Utxo {
    Utxo {
        amount: FUNDED_AMOUNT,
        owner: vec![1],
    }
}

// A random memo keeps the ids of otherwise identical transactions apart.
fn base(inputs: &[InputId], outputs: Vec<Utxo>) -> BaseTx {
    BaseTx {
        inputs: inputs.to_vec(),
        outputs,
        memo: random_id().bytes().to_vec(),
    }
}

fn output(amount: u64) -> Utxo {
    Utxo {
        amount,
        owner: vec![2],
    }
}

/// Spend `inputs`, producing a single output of `amount`.
pub(crate) fn base_tx(inputs: &[InputId], amount: u64) -> Tx {
    Tx::new(UnsignedTx::Base(base(inputs, vec![output(amount)])), vec![]).unwrap()
}

/// Import `imported` from `source_chain`, each worth 50, into a single output.
pub(crate) fn import_tx(source_chain: ChainId, imported: &[InputId]) -> Tx {
    let unsigned = UnsignedTx::Import(ImportTx {
        base: base(&[], vec![output(50 * imported.len() as u64)]),
        source_chain,
        imported_inputs: imported
            .iter()
            .map(|utxo_id| ImportedInput {
                utxo_id: *utxo_id,
                amount: 50,
            })
            .collect(),
    });
    Tx::new(unsigned, vec![]).unwrap()
}

/// Spend `input`, exporting `amount` of it to `destination_chain`.
pub(crate) fn export_tx(destination_chain: ChainId, input: InputId, amount: u64) -> Tx {
    let unsigned = UnsignedTx::Export(ExportTx {
        base: base(&[input], vec![]),
        destination_chain,
        exported_outputs: vec![output(amount)],
    });
    Tx::new(unsigned, vec![]).unwrap()
}

/// Spend `input` to schedule `key -> value` between `start_time` and `end_time`.
pub(crate) fn add_timelock_tx(
    input: InputId,
    key: &[u8],
    value: &[u8],
    start_time: Timestamp,
    end_time: Timestamp,
) -> Tx {
    let unsigned = UnsignedTx::AddTimelock(AddTimelockTx {
        base: base(&[input], vec![]),
        entry: TimelockEntry {
            key: key.to_vec(),
            value: value.to_vec(),
            start_time,
            end_time,
        },
    });
    Tx::new(unsigned, vec![]).unwrap()
}

pub(crate) fn advance_time_tx(time: Timestamp) -> Tx {
    Tx::new(UnsignedTx::AdvanceTime(AdvanceTimeTx { time }), vec![]).unwrap()
}
