/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A small reference transaction executor.
//!
//! ## App state layout
//!
//! |Key|Value|
//! |---|---|
//! |`b"utxo/"` ++ UTXO id|Borsh-serialized [`Utxo`].|
//! |`b"entry/"` ++ entry key|Value of a timelocked entry that has started and not yet ended.|
//! |`b"schedule"`|Borsh-serialized [`Schedule`].|
//!
//! ## Transactions
//!
//! - `Base`, `Import` and `Export` transactions are valid in standard blocks, and `Import` and `Export`
//!   transactions are also valid in atomic blocks. Each consumes its local inputs and creates its local
//!   outputs. The value produced may not exceed the value consumed (local inputs plus imported inputs).
//!   Imported inputs are reported as the transaction's conflict set, and are removed from the source
//!   chain's shared memory on accept. Exported outputs are put into the destination chain's shared
//!   memory on accept.
//! - `AddTimelock` transactions are valid in proposal blocks. Both options pay the transaction's local
//!   inputs into its outputs, and the commit option additionally schedules the entry.
//! - `AdvanceTime` transactions are valid in untimestamped proposal blocks, before Banff. The commit
//!   option moves the chain time, the abort option leaves it unchanged.

use std::collections::HashSet;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    codec::CodecError,
    state::{Chain, Diff, StateChanges, Versions},
    types::{
        data_types::{InputId, Timestamp},
        transaction::{
            utxo_id, AtomicRequests, BaseTx, Element, ExportTx, ImportTx, Tx, UnsignedTx, Utxo,
        },
    },
};

use super::{
    verify_new_chain_time, ExecutionContext, ProposalTxOutcome, TxError, TxExecutor, TxOutcome,
};

pub const UTXO_PREFIX: &[u8] = b"utxo/";
pub const ENTRY_PREFIX: &[u8] = b"entry/";
pub const SCHEDULE_KEY: &[u8] = b"schedule";

pub fn utxo_key(utxo: &InputId) -> Vec<u8> {
    [UTXO_PREFIX, &utxo.bytes()].concat()
}

pub fn entry_key(key: &[u8]) -> Vec<u8> {
    [ENTRY_PREFIX, key].concat()
}

/// Timelocked entries that are waiting to start (`pending`) or waiting to end (`current`).
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Schedule {
    pub pending: Vec<ScheduledEntry>,
    pub current: Vec<ScheduledEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ScheduledEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl Schedule {
    fn read(chain: &dyn Chain) -> Result<Schedule, TxError> {
        match chain.get_app_state(SCHEDULE_KEY)? {
            Some(bytes) => Schedule::try_from_slice(&bytes)
                .map_err(|err| TxError::Codec(CodecError::Deserialize(err))),
            None => Ok(Schedule::default()),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, TxError> {
        self.try_to_vec()
            .map_err(|err| TxError::Codec(CodecError::Serialize(err)))
    }

    fn next_change_time(&self) -> Timestamp {
        let starts = self.pending.iter().map(|entry| entry.start_time);
        let ends = self.current.iter().map(|entry| entry.end_time);
        starts.chain(ends).min().unwrap_or(Timestamp::MAX)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BasicTxExecutor;

impl BasicTxExecutor {
    pub fn new() -> BasicTxExecutor {
        BasicTxExecutor
    }

    /// Consume the local inputs and create the local outputs of `base`. Returns the value consumed.
    fn spend(
        &self,
        tx: &Tx,
        base: &BaseTx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<u64, TxError> {
        let mut seen = HashSet::new();
        let mut consumed: u64 = 0;
        {
            let view = diff.view(versions);
            for input in &base.inputs {
                if !seen.insert(*input) {
                    return Err(TxError::DuplicateInput {
                        tx: tx.id(),
                        input: *input,
                    });
                }
                let bytes = view
                    .get_app_state(&utxo_key(input))?
                    .ok_or(TxError::MissingUtxo {
                        tx: tx.id(),
                        utxo: *input,
                    })?;
                let utxo = Utxo::try_from_slice(&bytes)
                    .map_err(|err| TxError::Codec(CodecError::Deserialize(err)))?;
                consumed = consumed.saturating_add(utxo.amount);
            }
        }

        for input in &base.inputs {
            diff.delete(utxo_key(input));
        }
        self.produce(tx, &base.outputs, 0, diff)?;
        Ok(consumed)
    }

    fn produce(
        &self,
        tx: &Tx,
        outputs: &[Utxo],
        first_index: u32,
        diff: &mut Diff,
    ) -> Result<(), TxError> {
        for (index, output) in (first_index..).zip(outputs) {
            let bytes = output
                .try_to_vec()
                .map_err(|err| TxError::Codec(CodecError::Serialize(err)))?;
            diff.put(utxo_key(&utxo_id(&tx.id(), index)), bytes);
        }
        Ok(())
    }

    fn check_funds(tx: &Tx, consumed: u64, outputs: &[&[Utxo]]) -> Result<(), TxError> {
        let produced = outputs
            .iter()
            .flat_map(|outputs| outputs.iter())
            .fold(0u64, |sum, output| sum.saturating_add(output.amount));
        if produced > consumed {
            return Err(TxError::InsufficientFunds {
                tx: tx.id(),
                consumed,
                produced,
            });
        }
        Ok(())
    }

    fn import(
        &self,
        tx: &Tx,
        import: &ImportTx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError> {
        let mut outcome = TxOutcome::default();
        let mut consumed = self.spend(tx, &import.base, diff, versions)?;
        for imported in &import.imported_inputs {
            if !outcome.inputs.insert(imported.utxo_id) {
                return Err(TxError::DuplicateInput {
                    tx: tx.id(),
                    input: imported.utxo_id,
                });
            }
            consumed = consumed.saturating_add(imported.amount);
        }
        Self::check_funds(tx, consumed, &[import.base.outputs.as_slice()])?;

        let requests = AtomicRequests {
            put_requests: Vec::new(),
            remove_requests: import
                .imported_inputs
                .iter()
                .map(|imported| imported.utxo_id.bytes().to_vec())
                .collect(),
        };
        outcome
            .atomic_requests
            .insert(import.source_chain, requests);
        Ok(outcome)
    }

    fn export(
        &self,
        tx: &Tx,
        export: &ExportTx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError> {
        let consumed = self.spend(tx, &export.base, diff, versions)?;
        Self::check_funds(
            tx,
            consumed,
            &[
                export.base.outputs.as_slice(),
                export.exported_outputs.as_slice(),
            ],
        )?;

        let first_index = export.base.outputs.len() as u32;
        let mut put_requests = Vec::with_capacity(export.exported_outputs.len());
        for (index, output) in (first_index..).zip(&export.exported_outputs) {
            put_requests.push(Element {
                key: utxo_id(&tx.id(), index).bytes().to_vec(),
                value: output
                    .try_to_vec()
                    .map_err(|err| TxError::Codec(CodecError::Serialize(err)))?,
            });
        }

        let mut outcome = TxOutcome::default();
        outcome.atomic_requests.insert(
            export.destination_chain,
            AtomicRequests {
                put_requests,
                remove_requests: Vec::new(),
            },
        );
        Ok(outcome)
    }

    fn execute_transfer(
        &self,
        tx: &Tx,
        diff: &mut Diff,
        versions: &dyn Versions,
        block_kind: &'static str,
        allow_local: bool,
    ) -> Result<TxOutcome, TxError> {
        match tx.unsigned() {
            UnsignedTx::Base(base) if allow_local => {
                let consumed = self.spend(tx, base, diff, versions)?;
                Self::check_funds(tx, consumed, &[base.outputs.as_slice()])?;
                Ok(TxOutcome::default())
            }
            UnsignedTx::Import(import) => self.import(tx, import, diff, versions),
            UnsignedTx::Export(export) => self.export(tx, export, diff, versions),
            unsigned => Err(TxError::WrongTxType {
                tx: tx.id(),
                kind: unsigned.kind_name(),
                block_kind,
            }),
        }
    }
}

impl TxExecutor for BasicTxExecutor {
    fn next_change_time(&self, chain: &dyn Chain) -> Result<Timestamp, TxError> {
        Ok(Schedule::read(chain)?.next_change_time())
    }

    fn advance_time_to(
        &self,
        _: ExecutionContext,
        chain: &dyn Chain,
        new_time: Timestamp,
    ) -> Result<StateChanges, TxError> {
        let mut changes = StateChanges::new();
        let mut schedule = Schedule::read(chain)?;
        let mut changed = false;

        let (started, pending): (Vec<_>, Vec<_>) = schedule
            .pending
            .drain(..)
            .partition(|entry| entry.start_time <= new_time);
        schedule.pending = pending;
        for entry in started {
            changed = true;
            if entry.end_time > new_time {
                changes.put(entry_key(&entry.key), entry.value.clone());
                schedule.current.push(entry);
            }
        }

        let (ended, current): (Vec<_>, Vec<_>) = schedule
            .current
            .drain(..)
            .partition(|entry| entry.end_time <= new_time);
        schedule.current = current;
        for entry in ended {
            changed = true;
            changes.delete(entry_key(&entry.key));
        }

        if changed {
            changes.put(SCHEDULE_KEY.to_vec(), schedule.to_bytes()?);
        }
        Ok(changes)
    }

    fn execute_standard(
        &self,
        _: ExecutionContext,
        tx: &Tx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError> {
        self.execute_transfer(tx, diff, versions, "Standard", true)
    }

    fn execute_proposal(
        &self,
        ctx: ExecutionContext,
        tx: &Tx,
        on_commit: &mut Diff,
        on_abort: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<ProposalTxOutcome, TxError> {
        match tx.unsigned() {
            UnsignedTx::AddTimelock(add) => {
                let chain_time = on_commit.timestamp();
                let entry = &add.entry;
                if entry.start_time <= chain_time {
                    return Err(TxError::InvalidTimelock {
                        tx: tx.id(),
                        reason: "entry starts before the current chain time",
                    });
                }
                if entry.start_time > chain_time.saturating_add(ctx.config.max_future_start_time) {
                    return Err(TxError::InvalidTimelock {
                        tx: tx.id(),
                        reason: "entry starts too far in the future",
                    });
                }
                if entry.end_time <= entry.start_time {
                    return Err(TxError::InvalidTimelock {
                        tx: tx.id(),
                        reason: "entry ends before it starts",
                    });
                }

                for diff in [&mut *on_commit, &mut *on_abort] {
                    let consumed = self.spend(tx, &add.base, diff, versions)?;
                    Self::check_funds(tx, consumed, &[add.base.outputs.as_slice()])?;
                }

                let mut schedule = Schedule::read(&on_commit.view(versions))?;
                schedule.pending.push(ScheduledEntry {
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                    start_time: entry.start_time,
                    end_time: entry.end_time,
                });
                on_commit.put(SCHEDULE_KEY.to_vec(), schedule.to_bytes()?);

                Ok(ProposalTxOutcome {
                    prefers_commit: entry.start_time > ctx.now,
                })
            }
            UnsignedTx::AdvanceTime(advance) => {
                if ctx.config.is_banff_activated(advance.time) {
                    return Err(TxError::AdvanceTimeAfterBanff { tx: tx.id() });
                }

                let chain_time = on_commit.timestamp();
                if advance.time <= chain_time {
                    return Err(TxError::TimeNotAfterChainTime {
                        tx: tx.id(),
                        proposed: advance.time,
                        chain_time,
                    });
                }

                let changes = {
                    let parent = on_commit.view(versions);
                    let next_change_time = self.next_change_time(&parent)?;
                    verify_new_chain_time(
                        advance.time,
                        next_change_time,
                        ctx.now,
                        ctx.config.sync_bound,
                    )?;
                    self.advance_time_to(ctx, &parent, advance.time)?
                };
                on_commit.set_timestamp(advance.time);
                changes.apply(on_commit);

                Ok(ProposalTxOutcome {
                    prefers_commit: advance.time <= ctx.now,
                })
            }
            unsigned => Err(TxError::WrongTxType {
                tx: tx.id(),
                kind: unsigned.kind_name(),
                block_kind: "Proposal",
            }),
        }
    }

    fn execute_atomic(
        &self,
        _: ExecutionContext,
        tx: &Tx,
        diff: &mut Diff,
        versions: &dyn Versions,
    ) -> Result<TxOutcome, TxError> {
        self.execute_transfer(tx, diff, versions, "Atomic", false)
    }
}
