use crate::{BlockState, Link, SnapshotEvent, StoreError, StoreReader, StoreResult, StoreWriter};
use parking_lot::RwLock;
use rbtc_chainspec::ChainSpec;
use rbtc_primitives::{
    BlockHash, BlockNumber, Context, OutPoint, SealedBlock, SealedHeader, Transaction, TxHash,
    TxOutput,
};
use std::collections::HashMap;
use tracing::trace;

/// An in-memory implementation of the block archive.
///
/// Holds the header index, block bodies, the candidate and confirmed
/// sequences and the block state table behind one lock, giving the
/// snapshot-per-call consistency the chasers assume. Suitable for dev runs
/// and for driving the node in tests; durable archives implement the same
/// traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<Row>,
    by_hash: HashMap<BlockHash, Link>,
    candidate: Vec<Link>,
    confirmed: Vec<Link>,
    /// Outputs of every archived transaction, keyed by txid.
    archived_outputs: HashMap<TxHash, Vec<TxOutput>>,
    /// Outputs of strong transactions, keyed by txid.
    strong_outputs: HashMap<TxHash, Vec<TxOutput>>,
    /// Outpoints spent by strong transactions.
    strong_spends: HashMap<OutPoint, TxHash>,
    full: bool,
    fault: Option<StoreError>,
    /// Writes remaining until an injected disk-full fires.
    writes_until_full: Option<u32>,
}

#[derive(Debug)]
struct Row {
    header: SealedHeader,
    parent: Option<Link>,
    height: BlockNumber,
    context: Context,
    state: BlockState,
    body: Option<Vec<Transaction>>,
    malleable64: bool,
    fees: Option<u64>,
}

impl MemoryStore {
    /// Creates an empty, uninitialized store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store initialized with the spec's genesis header.
    ///
    /// Genesis is archived body-less, confirmable by definition, and seeds
    /// both the candidate and confirmed chains.
    pub fn with_genesis(spec: &ChainSpec) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            let genesis = spec.genesis.clone().seal_slow();
            let link = Link(0);
            inner.by_hash.insert(genesis.hash(), link);
            inner.rows.push(Row {
                header: genesis,
                parent: None,
                height: 0,
                context: Context {
                    forks: spec.fork_flags(0),
                    height: 0,
                    median_time_past: 0,
                    minimum_block_version: spec.minimum_block_version(0),
                },
                state: BlockState::Confirmable,
                body: None,
                malleable64: false,
                fees: Some(0),
            });
            inner.candidate.push(link);
            inner.confirmed.push(link);
        }
        store
    }

    /// Arms an injected disk-full fault after `writes` more archive writes.
    pub fn inject_disk_full_after(&self, writes: u32) {
        self.inner.write().writes_until_full = Some(writes);
    }

    fn archive(
        &self,
        header: SealedHeader,
        body: Option<Vec<Transaction>>,
        malleable64: bool,
        context: Context,
    ) -> StoreResult<Link> {
        let mut inner = self.inner.write();
        inner.charge_write()?;

        // Re-archiving a known header is idempotent; a supplied body
        // associates it.
        if let Some(link) = inner.by_hash.get(&header.hash()).copied() {
            if let Some(transactions) = body {
                for tx in &transactions {
                    inner.archived_outputs.insert(tx.txid(), tx.outputs.clone());
                }
                let row = inner.row_mut(link)?;
                row.body = Some(transactions);
                row.malleable64 = malleable64;
                if row.state == BlockState::Unassociated {
                    row.state = BlockState::Associated;
                }
            }
            return Ok(link);
        }

        let parent = inner.by_hash.get(&header.parent_hash()).copied();
        let link = Link(inner.rows.len() as u64);
        let state =
            if body.is_some() { BlockState::Associated } else { BlockState::Unassociated };
        if let Some(transactions) = &body {
            for tx in transactions {
                inner.archived_outputs.insert(tx.txid(), tx.outputs.clone());
            }
        }
        inner.by_hash.insert(header.hash(), link);
        inner.rows.push(Row {
            header,
            parent,
            height: context.height,
            context,
            state,
            body,
            malleable64,
            fees: None,
        });
        Ok(link)
    }
}

impl Inner {
    fn row(&self, link: Link) -> StoreResult<&Row> {
        self.rows.get(link.0 as usize).ok_or(StoreError::UnknownLink { link: link.0 })
    }

    fn row_mut(&mut self, link: Link) -> StoreResult<&mut Row> {
        self.rows.get_mut(link.0 as usize).ok_or(StoreError::UnknownLink { link: link.0 })
    }

    fn charge_write(&mut self) -> StoreResult<()> {
        if self.full {
            return Err(StoreError::DiskFull);
        }
        if let Some(remaining) = self.writes_until_full.as_mut() {
            if *remaining == 0 {
                self.full = true;
                self.writes_until_full = None;
                return Err(StoreError::DiskFull);
            }
            *remaining -= 1;
        }
        Ok(())
    }

    /// Resolves a prevout against strong transactions or earlier entries of
    /// the same block.
    fn resolve_prevout<'a>(
        &'a self,
        point: &OutPoint,
        within: &'a HashMap<TxHash, &'a Transaction>,
    ) -> Option<&'a TxOutput> {
        if let Some(outputs) = self.strong_outputs.get(&point.txid) {
            return outputs.get(point.index as usize);
        }
        within.get(&point.txid).and_then(|tx| tx.outputs.get(point.index as usize))
    }
}

impl StoreReader for MemoryStore {
    fn get_height(&self, link: Link) -> StoreResult<BlockNumber> {
        Ok(self.inner.read().row(link)?.height)
    }

    fn get_bits(&self, link: Link) -> StoreResult<u32> {
        Ok(self.inner.read().row(link)?.header.bits)
    }

    fn get_timestamp(&self, link: Link) -> StoreResult<u32> {
        Ok(self.inner.read().row(link)?.header.timestamp)
    }

    fn get_header_key(&self, link: Link) -> StoreResult<BlockHash> {
        Ok(self.inner.read().row(link)?.header.hash())
    }

    fn get_header(&self, link: Link) -> StoreResult<SealedHeader> {
        Ok(self.inner.read().row(link)?.header.clone())
    }

    fn get_block(&self, link: Link) -> StoreResult<Option<SealedBlock>> {
        let inner = self.inner.read();
        let row = inner.row(link)?;
        Ok(row.body.clone().map(|transactions| SealedBlock {
            header: row.header.clone(),
            transactions,
        }))
    }

    fn get_context(&self, link: Link) -> StoreResult<Context> {
        Ok(self.inner.read().row(link)?.context)
    }

    fn to_header(&self, hash: &BlockHash) -> Option<Link> {
        self.inner.read().by_hash.get(hash).copied()
    }

    fn to_parent(&self, link: Link) -> Option<Link> {
        self.inner.read().row(link).ok()?.parent
    }

    fn to_candidate(&self, height: BlockNumber) -> Option<Link> {
        self.inner.read().candidate.get(height as usize).copied()
    }

    fn to_confirmed(&self, height: BlockNumber) -> Option<Link> {
        self.inner.read().confirmed.get(height as usize).copied()
    }

    fn get_top_candidate(&self) -> BlockNumber {
        self.inner.read().candidate.len().saturating_sub(1) as BlockNumber
    }

    fn get_top_confirmed(&self) -> BlockNumber {
        self.inner.read().confirmed.len().saturating_sub(1) as BlockNumber
    }

    fn get_fork(&self) -> BlockNumber {
        let inner = self.inner.read();
        let mut height = inner.candidate.len().min(inner.confirmed.len()).saturating_sub(1);
        while height > 0 && inner.candidate[height] != inner.confirmed[height] {
            height -= 1;
        }
        height as BlockNumber
    }

    fn is_candidate_header(&self, link: Link) -> bool {
        let inner = self.inner.read();
        inner
            .row(link)
            .is_ok_and(|row| inner.candidate.get(row.height as usize) == Some(&link))
    }

    fn is_confirmed_block(&self, link: Link) -> bool {
        let inner = self.inner.read();
        inner
            .row(link)
            .is_ok_and(|row| inner.confirmed.get(row.height as usize) == Some(&link))
    }

    fn get_block_state(&self, link: Link) -> StoreResult<BlockState> {
        Ok(self.inner.read().row(link)?.state)
    }

    fn is_malleable64(&self, link: Link) -> StoreResult<bool> {
        Ok(self.inner.read().row(link)?.malleable64)
    }

    fn populate(&self, transactions: &mut [Transaction]) -> bool {
        let inner = self.inner.read();
        let mut complete = true;
        for tx in transactions.iter_mut() {
            if tx.is_coinbase() {
                continue;
            }
            for input in &mut tx.inputs {
                if input.prevout.is_some() {
                    continue;
                }
                let point = input.previous_output;
                input.prevout = inner
                    .archived_outputs
                    .get(&point.txid)
                    .and_then(|outputs| outputs.get(point.index as usize))
                    .cloned();
                complete &= input.prevout.is_some();
            }
        }
        complete
    }

    fn is_initialized(&self) -> bool {
        !self.inner.read().rows.is_empty()
    }

    fn is_full(&self) -> bool {
        self.inner.read().full
    }

    fn is_fault(&self) -> bool {
        self.inner.read().fault.is_some()
    }

    fn get_code(&self) -> Option<StoreError> {
        self.inner.read().fault.clone()
    }
}

impl StoreWriter for MemoryStore {
    fn set_header_link(&self, header: &SealedHeader, context: Context) -> StoreResult<Link> {
        self.archive(header.clone(), None, false, context)
    }

    fn set_link(&self, block: &SealedBlock, context: Context) -> StoreResult<Link> {
        self.archive(
            block.header.clone(),
            Some(block.transactions.clone()),
            block.is_malleable64(),
            context,
        )
    }

    fn set_associated(&self, link: Link, transactions: Vec<Transaction>) -> StoreResult<()> {
        let malleable64 = {
            let inner = self.inner.read();
            let row = inner.row(link)?;
            SealedBlock { header: row.header.clone(), transactions: transactions.clone() }
                .is_malleable64()
        };
        let mut inner = self.inner.write();
        inner.charge_write()?;
        for tx in &transactions {
            inner.archived_outputs.insert(tx.txid(), tx.outputs.clone());
        }
        let row = inner.row_mut(link)?;
        row.body = Some(transactions);
        row.malleable64 = malleable64;
        if row.state == BlockState::Unassociated {
            row.state = BlockState::Associated;
        }
        Ok(())
    }

    fn set_disassociated(&self, link: Link) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let row = inner.row_mut(link)?;
        row.body = None;
        row.state = BlockState::Unassociated;
        row.fees = None;
        Ok(())
    }

    fn push_candidate(&self, link: Link) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let height = inner.row(link)?.height;
        if height != inner.candidate.len() as BlockNumber {
            return Err(StoreError::Integrity("candidate push out of sequence"));
        }
        inner.candidate.push(link);
        trace!(target: "store", %link, height, "pushed candidate");
        Ok(())
    }

    fn pop_candidate(&self) -> StoreResult<Link> {
        let mut inner = self.inner.write();
        if inner.candidate.len() <= 1 {
            return Err(StoreError::Integrity("cannot pop candidate genesis"));
        }
        inner.candidate.pop().ok_or(StoreError::Integrity("candidate underflow"))
    }

    fn push_confirmed(&self, link: Link) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let height = inner.row(link)?.height;
        if height != inner.confirmed.len() as BlockNumber {
            return Err(StoreError::Integrity("confirmed push out of sequence"));
        }
        inner.confirmed.push(link);
        trace!(target: "store", %link, height, "pushed confirmed");
        Ok(())
    }

    fn pop_confirmed(&self) -> StoreResult<Link> {
        let mut inner = self.inner.write();
        if inner.confirmed.len() <= 1 {
            return Err(StoreError::Integrity("cannot pop confirmed genesis"));
        }
        inner.confirmed.pop().ok_or(StoreError::Integrity("confirmed underflow"))
    }

    fn set_block_confirmable(&self, link: Link, fees: u64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let row = inner.row_mut(link)?;
        row.state = BlockState::Confirmable;
        row.fees = Some(fees);
        Ok(())
    }

    fn set_block_unconfirmable(&self, link: Link) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let row = inner.row_mut(link)?;
        row.state = BlockState::Unconfirmable;
        row.fees = None;
        Ok(())
    }

    fn set_strong(&self, link: Link) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let Some(body) = inner.row(link)?.body.clone() else { return Ok(()) };
        for tx in &body {
            let txid = tx.txid();
            inner.strong_outputs.insert(txid, tx.outputs.clone());
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    inner.strong_spends.insert(input.previous_output, txid);
                }
            }
        }
        Ok(())
    }

    fn set_unstrong(&self, link: Link) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let Some(body) = inner.row(link)?.body.clone() else { return Ok(()) };
        for tx in &body {
            let txid = tx.txid();
            inner.strong_outputs.remove(&txid);
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    if inner.strong_spends.get(&input.previous_output) == Some(&txid) {
                        inner.strong_spends.remove(&input.previous_output);
                    }
                }
            }
        }
        Ok(())
    }

    fn block_confirmable(&self, link: Link) -> StoreResult<u64> {
        let inner = self.inner.read();
        let row = inner.row(link)?;
        let Some(body) = row.body.as_ref() else {
            return Err(StoreError::Unassociated { hash: row.header.hash() });
        };

        let within: HashMap<TxHash, &Transaction> =
            body.iter().map(|tx| (tx.txid(), tx)).collect();
        let mut spent_here: HashMap<OutPoint, TxHash> = HashMap::new();
        let mut fees = 0u64;

        for tx in body.iter().skip(1) {
            let txid = tx.txid();
            let mut in_value = 0u64;
            for input in &tx.inputs {
                let point = input.previous_output;
                if let Some(spender) = inner.strong_spends.get(&point) {
                    if *spender != txid {
                        return Err(StoreError::DoubleSpend { txid: point.txid, index: point.index });
                    }
                }
                if let Some(spender) = spent_here.get(&point) {
                    if *spender != txid {
                        return Err(StoreError::DoubleSpend { txid: point.txid, index: point.index });
                    }
                }
                let Some(prevout) = inner.resolve_prevout(&point, &within) else {
                    return Err(StoreError::MissingPrevout { txid: point.txid, index: point.index });
                };
                in_value += prevout.value;
                spent_here.insert(point, txid);
            }
            fees = fees.saturating_add(in_value.saturating_sub(tx.total_output_value()));
        }
        Ok(fees)
    }

    fn snapshot(&self, observer: &mut dyn FnMut(SnapshotEvent)) -> StoreResult<()> {
        observer(SnapshotEvent::Begin);
        let mut inner = self.inner.write();
        if let Some(fault) = &inner.fault {
            return Err(fault.clone());
        }
        // Compaction stand-in: the header, body and chain tables in turn.
        for table in 0..3 {
            observer(SnapshotEvent::TableCompacted { table });
        }
        inner.full = false;
        inner.writes_until_full = None;
        observer(SnapshotEvent::Complete);
        Ok(())
    }

    fn reset_full(&self) {
        self.inner.write().full = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rbtc_chainspec::DEV;
    use rbtc_primitives::{Block, Header, TxInput};

    fn child_of(parent: &SealedHeader, nonce: u32) -> SealedHeader {
        Header {
            version: 1,
            previous_block_hash: parent.hash(),
            merkle_root: BlockHash::ZERO,
            timestamp: parent.timestamp + 600,
            bits: parent.bits,
            nonce,
        }
        .seal_slow()
    }

    fn context_at(height: BlockNumber) -> Context {
        Context { height, ..Default::default() }
    }

    #[test]
    fn genesis_seeds_both_chains() {
        let store = MemoryStore::with_genesis(&DEV);
        assert!(store.is_initialized());
        assert_eq!(store.get_top_candidate(), 0);
        assert_eq!(store.get_top_confirmed(), 0);
        assert_eq!(store.get_fork(), 0);

        let genesis = store.to_candidate(0).unwrap();
        assert_eq!(store.get_header_key(genesis).unwrap(), DEV.genesis_hash());
        assert_matches!(store.get_block_state(genesis), Ok(BlockState::Confirmable));
    }

    #[test]
    fn header_archive_and_chain_walk() {
        let store = MemoryStore::with_genesis(&DEV);
        let genesis = store.get_header(store.to_candidate(0).unwrap()).unwrap();
        let header = child_of(&genesis, 1);

        let link = store.set_header_link(&header, context_at(1)).unwrap();
        assert_matches!(store.get_block_state(link), Ok(BlockState::Unassociated));
        assert_eq!(store.to_header(&header.hash()), Some(link));
        assert_eq!(store.to_parent(link), store.to_candidate(0));

        store.push_candidate(link).unwrap();
        assert!(store.is_candidate_header(link));
        assert_eq!(store.get_top_candidate(), 1);
        assert_eq!(store.get_fork(), 0);

        assert_eq!(store.pop_candidate().unwrap(), link);
        assert!(!store.is_candidate_header(link));
    }

    #[test]
    fn pop_never_reaches_genesis() {
        let store = MemoryStore::with_genesis(&DEV);
        assert_matches!(store.pop_candidate(), Err(StoreError::Integrity(_)));
        assert_matches!(store.pop_confirmed(), Err(StoreError::Integrity(_)));
    }

    #[test]
    fn out_of_sequence_push_is_integrity() {
        let store = MemoryStore::with_genesis(&DEV);
        let genesis = store.get_header(store.to_candidate(0).unwrap()).unwrap();
        let header = child_of(&genesis, 1);
        let link = store.set_header_link(&header, context_at(5)).unwrap();
        assert_matches!(store.push_candidate(link), Err(StoreError::Integrity(_)));
    }

    #[test]
    fn injected_disk_full_trips_and_resets() {
        let store = MemoryStore::with_genesis(&DEV);
        let genesis = store.get_header(store.to_candidate(0).unwrap()).unwrap();
        store.inject_disk_full_after(1);

        let first = child_of(&genesis, 1);
        let link = store.set_header_link(&first, context_at(1)).unwrap();
        let second = child_of(&first, 2);
        assert_matches!(
            store.set_header_link(&second, context_at(2)),
            Err(StoreError::DiskFull)
        );
        assert!(store.is_full());

        let mut events = vec![];
        store.snapshot(&mut |event| events.push(event)).unwrap();
        assert!(!store.is_full());
        assert_eq!(events.first(), Some(&SnapshotEvent::Begin));
        assert_eq!(events.last(), Some(&SnapshotEvent::Complete));

        // Writes succeed again.
        store.set_associated(link, vec![]).unwrap();
    }

    #[test]
    fn confirmation_catches_double_spends() {
        let store = MemoryStore::with_genesis(&DEV);
        let genesis = store.get_header(store.to_candidate(0).unwrap()).unwrap();

        // Block 1 funds an output.
        let coinbase1 = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                script_sig: vec![1],
                sequence: u32::MAX,
                prevout: None,
            }],
            outputs: vec![TxOutput { value: 50, script_pubkey: vec![] }],
            lock_time: 0,
        };
        let funded = OutPoint { txid: coinbase1.txid(), index: 0 };
        let block1 = Block {
            header: child_of(&genesis, 1).unseal(),
            transactions: vec![coinbase1],
        }
        .seal_slow();
        let link1 = store.set_link(&block1, context_at(1)).unwrap();
        store.push_candidate(link1).unwrap();
        store.set_strong(link1).unwrap();
        store.push_confirmed(link1).unwrap();

        // Block 2 spends it once: confirmable with fees.
        let coinbase2 = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                script_sig: vec![2],
                sequence: u32::MAX,
                prevout: None,
            }],
            outputs: vec![TxOutput { value: 50, script_pubkey: vec![] }],
            lock_time: 0,
        };
        let spend = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: funded,
                script_sig: vec![],
                sequence: u32::MAX,
                prevout: None,
            }],
            outputs: vec![TxOutput { value: 40, script_pubkey: vec![] }],
            lock_time: 0,
        };
        let block2 = Block {
            header: child_of(&block1.header, 2).unseal(),
            transactions: vec![coinbase2, spend.clone()],
        }
        .seal_slow();
        let link2 = store.set_link(&block2, context_at(2)).unwrap();
        assert_eq!(store.block_confirmable(link2).unwrap(), 10);

        // Once block 2 is strong, respending the same output is caught.
        store.push_candidate(link2).unwrap();
        store.set_strong(link2).unwrap();
        store.push_confirmed(link2).unwrap();

        let coinbase3 = Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_output: OutPoint::null(),
                script_sig: vec![3],
                sequence: u32::MAX,
                prevout: None,
            }],
            outputs: vec![TxOutput { value: 50, script_pubkey: vec![] }],
            lock_time: 0,
        };
        let respend = Transaction { outputs: vec![TxOutput { value: 1, script_pubkey: vec![] }], ..spend };
        let block3 = Block {
            header: child_of(&block2.header, 3).unseal(),
            transactions: vec![coinbase3, respend],
        }
        .seal_slow();
        let link3 = store.set_link(&block3, context_at(3)).unwrap();
        assert_matches!(
            store.block_confirmable(link3),
            Err(StoreError::DoubleSpend { .. })
        );

        // Unstrong releases the spend again.
        store.set_unstrong(link2).unwrap();
        assert_matches!(store.block_confirmable(link3), Err(StoreError::MissingPrevout { .. }));
    }

    #[test]
    fn disassociation_resets_state() {
        let store = MemoryStore::with_genesis(&DEV);
        let genesis = store.get_header(store.to_candidate(0).unwrap()).unwrap();
        let header = child_of(&genesis, 1);
        let link = store.set_header_link(&header, context_at(1)).unwrap();

        store.set_associated(link, vec![]).unwrap();
        assert_matches!(store.get_block_state(link), Ok(BlockState::Associated));

        store.set_disassociated(link).unwrap();
        assert_matches!(store.get_block_state(link), Ok(BlockState::Unassociated));
        assert_eq!(store.get_block(link).unwrap(), None);
    }
}
