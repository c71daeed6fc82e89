//! End-to-end chaser scenarios over the in-memory store.

use parking_lot::Mutex;
use rbtc_chainspec::{ChainSpec, Checkpoint, NodeConfig, DEV};
use rbtc_network_api::{Announcement, Network, SuspendReason};
use rbtc_node::{Chase, ChaseEvent, EventValue, FullNode, ManualClock, NodeError, OrganizeError};
use rbtc_primitives::{
    proofs, BlockHash, Header, OutPoint, SealedBlock, SealedHeader, Transaction, TxInput,
    TxOutput,
};
use rbtc_storage_api::{BlockState, MemoryStore, StoreReader};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

const SUBSIDY: u64 = 50_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetEvent {
    Suspend(SuspendReason),
    Resume,
    Announce(Announcement),
    Stop,
}

/// A network double recording every call.
#[derive(Clone, Default)]
struct RecordingNetwork(Arc<Mutex<Vec<NetEvent>>>);

impl RecordingNetwork {
    fn take(&self) -> Vec<NetEvent> {
        std::mem::take(&mut self.0.lock())
    }
}

impl Network for RecordingNetwork {
    fn suspend(&self, reason: SuspendReason) {
        self.0.lock().push(NetEvent::Suspend(reason));
    }

    fn resume(&self) {
        self.0.lock().push(NetEvent::Resume);
    }

    fn announce(&self, announcement: Announcement) {
        self.0.lock().push(NetEvent::Announce(announcement));
    }

    fn stop(&self) {
        self.0.lock().push(NetEvent::Stop);
    }
}

struct Harness {
    spec: ChainSpec,
    store: Arc<MemoryStore>,
    node: FullNode<MemoryStore, RecordingNetwork>,
    net: RecordingNetwork,
    events: UnboundedReceiver<ChaseEvent>,
}

impl Harness {
    async fn new(spec: ChainSpec) -> Self {
        // The currency check is exercised by its own test.
        let config = NodeConfig { currency_window_minutes: 0, ..Default::default() };
        Self::with_config(spec, config).await
    }

    async fn with_config(spec: ChainSpec, config: NodeConfig) -> Self {
        let store = Arc::new(MemoryStore::with_genesis(&spec));
        let net = RecordingNetwork::default();
        let clock = Arc::new(ManualClock::at_unix(u64::from(spec.genesis.timestamp) + 7200));
        let mut node = FullNode::with_clock(
            store.clone(),
            net.clone(),
            spec.clone(),
            config,
            clock,
        );
        node.start().expect("node starts");
        let (_, events) = node.subscribe_events().await.expect("subscribe");
        node.run().await.expect("node runs");
        let mut harness = Harness { spec, store, node, net, events };
        harness.drain();
        harness.net.take();
        harness
    }

    fn genesis(&self) -> SealedHeader {
        self.spec.genesis.clone().seal_slow()
    }

    fn drain(&mut self) -> Vec<ChaseEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    fn candidate_hashes(&self) -> Vec<BlockHash> {
        (0..=self.store.get_top_candidate())
            .map(|height| {
                let link = self.store.to_candidate(height).expect("candidate entry");
                self.store.get_header_key(link).expect("header key")
            })
            .collect()
    }

    fn confirmed_hashes(&self) -> Vec<BlockHash> {
        (0..=self.store.get_top_confirmed())
            .map(|height| {
                let link = self.store.to_confirmed(height).expect("confirmed entry");
                self.store.get_header_key(link).expect("header key")
            })
            .collect()
    }

    /// Heights carried by all events of the given kind, links resolved.
    fn heights_of(&self, events: &[ChaseEvent], chase: Chase) -> Vec<u64> {
        events
            .iter()
            .filter(|event| event.chase == chase)
            .map(|event| match event.value {
                EventValue::Height(height) => height,
                EventValue::Link(link) => self.store.get_height(link).expect("link height"),
                _ => panic!("event without a resolvable height"),
            })
            .collect()
    }
}

fn mine(mut header: Header) -> SealedHeader {
    loop {
        let sealed = header.clone().seal_slow();
        if sealed.is_valid_proof_of_work() {
            return sealed;
        }
        header.nonce += 1;
    }
}

fn child_header(parent: &SealedHeader, spec: &ChainSpec, salt: u8) -> SealedHeader {
    mine(Header {
        version: 1,
        previous_block_hash: parent.hash(),
        merkle_root: BlockHash::with_last_byte(salt),
        timestamp: parent.timestamp + 600,
        bits: spec.pow.limit,
        nonce: 0,
    })
}

fn header_chain(from: &SealedHeader, spec: &ChainSpec, length: usize, salt: u8) -> Vec<SealedHeader> {
    let mut parent = from.clone();
    (0..length)
        .map(|_| {
            let header = child_header(&parent, spec, salt);
            parent = header.clone();
            header
        })
        .collect()
}

fn coinbase(value: u64, salt: u8) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script_sig: vec![salt],
            sequence: u32::MAX,
            prevout: None,
        }],
        outputs: vec![TxOutput { value, script_pubkey: vec![0x51] }],
        lock_time: 0,
    }
}

fn spend(point: OutPoint, value: u64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: point,
            script_sig: vec![],
            sequence: u32::MAX,
            prevout: None,
        }],
        outputs: vec![TxOutput { value, script_pubkey: vec![] }],
        lock_time: 0,
    }
}

fn child_block(
    parent: &SealedHeader,
    spec: &ChainSpec,
    transactions: Vec<Transaction>,
) -> SealedBlock {
    let merkle_root = proofs::calculate_transaction_root(&transactions);
    let header = mine(Header {
        version: 1,
        previous_block_hash: parent.hash(),
        merkle_root,
        timestamp: parent.timestamp + 600,
        bits: spec.pow.limit,
        nonce: 0,
    });
    SealedBlock { header, transactions }
}

/// A body for a previously organized header: same header, real coinbase.
fn body_for(header: &SealedHeader, transactions: Vec<Transaction>) -> SealedBlock {
    SealedBlock { header: header.clone(), transactions }
}

// Scenario 1 plus round trip R1: linear extension, then duplicate refusal.
#[tokio::test]
async fn linear_extend_and_duplicates() {
    let mut h = Harness::new(DEV.clone()).await;
    let chain = header_chain(&h.genesis(), &h.spec, 5, 0);

    for (index, header) in chain.iter().enumerate() {
        let height = h.node.organize_header(header.clone()).await.expect("organized");
        assert_eq!(height, index as u64 + 1);

        let events = h.drain();
        assert_eq!(h.heights_of(&events, Chase::Bump), vec![height]);
        assert_eq!(h.heights_of(&events, Chase::Header), vec![height - 1]);
    }
    assert_eq!(h.store.get_top_candidate(), 5);

    // Resubmission never mutates the store.
    let before = h.candidate_hashes();
    for header in &chain {
        let result = h.node.organize_header(header.clone()).await;
        assert_eq!(result, Err(OrganizeError::Duplicate));
    }
    assert_eq!(h.candidate_hashes(), before);
}

// Scenario 2: a branch tying on work must not reorganize.
#[tokio::test]
async fn tying_branch_is_cached_not_organized() {
    let mut h = Harness::new(DEV.clone()).await;
    let chain = header_chain(&h.genesis(), &h.spec, 3, 0);
    for header in &chain {
        h.node.organize_header(header.clone()).await.expect("organized");
    }
    let before = h.candidate_hashes();
    h.drain();

    // Fork at H2: the replacement for H3 carries equal work.
    let rival = child_header(&chain[1], &h.spec, 9);
    assert_ne!(rival.hash(), chain[2].hash());
    let height = h.node.organize_header(rival.clone()).await.expect("accepted");
    assert_eq!(height, 3);
    assert_eq!(h.candidate_hashes(), before, "tie must not reorganize");
    assert!(h.drain().iter().all(|event| event.chase != Chase::Header));

    // The tree now knows it: resubmission is a duplicate.
    assert_eq!(h.node.organize_header(rival).await, Err(OrganizeError::Duplicate));
}

// Scenario 3 plus round trip R2: strong reorg, then reorg back.
#[tokio::test]
async fn strong_branch_reorganizes_and_reverses() {
    let mut h = Harness::new(DEV.clone()).await;
    let chain = header_chain(&h.genesis(), &h.spec, 3, 0);
    for header in &chain {
        h.node.organize_header(header.clone()).await.expect("organized");
    }
    h.drain();

    // A longer branch from H1 carries strictly more work over the range.
    let branch = header_chain(&chain[0], &h.spec, 3, 9);
    h.node.organize_header(branch[0].clone()).await.expect("cached");
    h.node.organize_header(branch[1].clone()).await.expect("cached");
    assert_eq!(h.store.get_top_candidate(), 3, "weak until the third arrives");

    let height = h.node.organize_header(branch[2].clone()).await.expect("organized");
    assert_eq!(height, 4);
    let expected: Vec<_> = [h.genesis(), chain[0].clone()]
        .iter()
        .chain(&branch)
        .map(SealedHeader::hash)
        .collect();
    assert_eq!(h.candidate_hashes(), expected);

    let events = h.drain();
    assert_eq!(h.heights_of(&events, Chase::Bump), vec![2]);
    assert_eq!(h.heights_of(&events, Chase::Header), vec![1]);

    // Reverse: extend the original chain past the branch.
    let tail = header_chain(&chain[2], &h.spec, 2, 0);
    h.node.organize_header(tail[0].clone()).await.expect("cached");
    let height = h.node.organize_header(tail[1].clone()).await.expect("organized");
    assert_eq!(height, 5);

    let expected: Vec<_> = std::iter::once(h.genesis())
        .chain(chain)
        .chain(tail)
        .map(|header| header.hash())
        .collect();
    assert_eq!(h.candidate_hashes(), expected, "original chain restored and extended");
}

// A store with no genesis refuses to start the node.
#[tokio::test]
async fn uninitialized_store_refuses_to_start() {
    let store = Arc::new(MemoryStore::new());
    let mut node = FullNode::new(
        store,
        RecordingNetwork::default(),
        DEV.clone(),
        NodeConfig::default(),
    );
    assert!(matches!(node.start(), Err(NodeError::StoreUninitialized)));
}

#[tokio::test]
async fn orphans_are_rejected() {
    let h = Harness::new(DEV.clone()).await;
    let stranger = mine(Header {
        version: 1,
        previous_block_hash: BlockHash::with_last_byte(0xee),
        merkle_root: BlockHash::ZERO,
        timestamp: h.spec.genesis.timestamp + 600,
        bits: h.spec.pow.limit,
        nonce: 0,
    });
    assert_eq!(h.node.organize_header(stranger).await, Err(OrganizeError::Orphan));
}

// Boundary: a checkpoint conflict rejects regardless of work.
#[tokio::test]
async fn checkpoint_conflict_rejects() {
    let mut spec = DEV.clone();
    spec.checkpoints =
        vec![Checkpoint { height: 2, hash: BlockHash::with_last_byte(0xcc) }];
    let h = Harness::new(spec).await;

    let chain = header_chain(&h.genesis(), &h.spec, 2, 0);
    h.node.organize_header(chain[0].clone()).await.expect("organized");
    assert_eq!(
        h.node.organize_header(chain[1].clone()).await,
        Err(OrganizeError::CheckpointConflict { height: 2 })
    );
    assert_eq!(h.store.get_top_candidate(), 1);
}

// Boundary: organizing the milestone header flips the active milestone.
#[tokio::test]
async fn milestone_flip_emits_bypass() {
    let plain = DEV.clone();
    let genesis = plain.genesis.clone().seal_slow();
    let chain = header_chain(&genesis, &plain, 2, 0);

    let mut spec = plain;
    spec.milestone = Some(Checkpoint { height: 2, hash: chain[1].hash() });
    let mut h = Harness::new(spec).await;

    h.node.organize_header(chain[0].clone()).await.expect("organized");
    let events = h.drain();
    assert!(events.iter().all(|event| event.chase != Chase::Bypass));

    h.node.organize_header(chain[1].clone()).await.expect("organized");
    let events = h.drain();
    assert_eq!(h.heights_of(&events, Chase::Bypass), vec![2]);
    let link = h.store.to_candidate(2).expect("milestone entry");
    assert_eq!(h.store.get_header_key(link).unwrap(), chain[1].hash());
}

// Under the milestone, confirmation advances without full validation.
#[tokio::test]
async fn milestone_bypasses_confirmation() {
    let plain = DEV.clone();
    let genesis = plain.genesis.clone().seal_slow();
    let block1 = child_block(&genesis, &plain, vec![coinbase(SUBSIDY, 1)]);
    let block2 = child_block(&block1.header, &plain, vec![coinbase(SUBSIDY, 2)]);

    let mut spec = plain;
    spec.milestone = Some(Checkpoint { height: 2, hash: block2.hash() });
    let mut h = Harness::new(spec).await;

    h.node.organize_header(block1.header.clone()).await.expect("organized");
    h.node.organize_header(block2.header.clone()).await.expect("organized");
    let events = h.drain();
    assert_eq!(h.heights_of(&events, Chase::Bypass), vec![2]);

    h.node.put_block(block1).await.expect("archived");
    h.node.put_block(block2).await.expect("archived");
    let events = h.drain();
    assert_eq!(h.heights_of(&events, Chase::Organized), vec![1, 2]);
    assert_eq!(h.store.get_top_confirmed(), 2);

    // Bypassed confirmation leaves the blocks unvalidated in the state
    // table: associated, not confirmable.
    let link = h.store.to_confirmed(1).unwrap();
    assert_eq!(h.store.get_block_state(link).unwrap(), BlockState::Associated);
}

// A stale header that is neither current nor certified stays in the tree.
#[tokio::test]
async fn stale_header_is_not_storable() {
    let config = NodeConfig { currency_window_minutes: 1, ..Default::default() };
    let mut h = Harness::with_config(DEV.clone(), config).await;

    // The clock sits two hours past genesis; a genesis-adjacent header is
    // far outside a one minute window.
    let header = child_header(&h.genesis(), &h.spec, 0);
    let height = h.node.organize_header(header.clone()).await.expect("accepted");
    assert_eq!(height, 1);
    assert_eq!(h.store.get_top_candidate(), 0, "stale header must not organize");
    assert!(h.store.to_header(&header.hash()).is_none(), "and must not archive");
    assert!(h.drain().iter().all(|event| event.chase != Chase::Header));
}

#[tokio::test]
async fn download_map_hand_out_and_return() {
    let mut h = Harness::new(DEV.clone()).await;
    let chain = header_chain(&h.genesis(), &h.spec, 3, 0);
    for header in &chain {
        h.node.organize_header(header.clone()).await.expect("organized");
    }

    let map = h.node.get_hashes(2).await.expect("batch");
    assert_eq!(
        map.entries().iter().map(|(height, _)| *height).collect::<Vec<_>>(),
        vec![1, 2]
    );

    // Returned hashes become available again.
    h.node.put_hashes(map).await.expect("returned");
    let map = h.node.get_hashes(10).await.expect("batch");
    assert_eq!(map.len(), 3);
}

// Scenario 5: all bodies valid; the confirmed chain follows the candidate.
#[tokio::test]
async fn confirm_happy_path() {
    let mut h = Harness::new(DEV.clone()).await;
    let genesis = h.genesis();

    let block1 = child_block(&genesis, &h.spec, vec![coinbase(SUBSIDY, 1)]);
    let funded = OutPoint { txid: block1.transactions[0].txid(), index: 0 };
    let block2 = child_block(
        &block1.header,
        &h.spec,
        vec![coinbase(SUBSIDY + 10, 2), spend(funded, SUBSIDY - 10)],
    );
    let block3 = child_block(&block2.header, &h.spec, vec![coinbase(SUBSIDY, 3)]);
    let blocks = [block1, block2, block3];

    for block in &blocks {
        h.node.organize_header(block.header.clone()).await.expect("organized");
    }
    assert_eq!(h.store.get_top_confirmed(), 0);
    h.drain();

    for (index, block) in blocks.iter().enumerate() {
        let height = h.node.put_block(block.clone()).await.expect("archived");
        assert_eq!(height, index as u64 + 1);

        let events = h.drain();
        assert_eq!(h.heights_of(&events, Chase::Checked), vec![height]);
        assert_eq!(h.heights_of(&events, Chase::Valid), vec![height]);
        assert_eq!(h.heights_of(&events, Chase::Confirmable), vec![height]);
        assert_eq!(h.heights_of(&events, Chase::Organized), vec![height]);
    }
    assert_eq!(h.store.get_top_confirmed(), 3);
    assert_eq!(h.confirmed_hashes(), h.candidate_hashes());

    // Confirmations were announced to peers in order.
    let announced: Vec<_> = h
        .net
        .take()
        .into_iter()
        .filter_map(|event| match event {
            NetEvent::Announce(Announcement::BlockOrganized(hash)) => Some(hash),
            _ => None,
        })
        .collect();
    assert_eq!(announced, blocks.iter().map(|block| block.hash()).collect::<Vec<_>>());
}

// Scenario 4: a validation failure disorganizes the candidate chain down to
// the confirmed top.
#[tokio::test]
async fn unvalid_block_disorganizes() {
    let mut h = Harness::new(DEV.clone()).await;
    let genesis = h.genesis();

    let block1 = child_block(&genesis, &h.spec, vec![coinbase(SUBSIDY, 1)]);
    let block2 = child_block(&block1.header, &h.spec, vec![coinbase(SUBSIDY, 2)]);
    // The third block's coinbase claims more than subsidy plus fees.
    let block3 = child_block(&block2.header, &h.spec, vec![coinbase(SUBSIDY + 1, 3)]);
    let block4 = child_block(&block3.header, &h.spec, vec![coinbase(SUBSIDY, 4)]);
    let block5 = child_block(&block4.header, &h.spec, vec![coinbase(SUBSIDY, 5)]);
    let blocks = [block1, block2, block3, block4, block5];

    for block in &blocks {
        h.node.organize_header(block.header.clone()).await.expect("organized");
    }
    assert_eq!(h.store.get_top_candidate(), 5);

    h.node.put_block(blocks[0].clone()).await.expect("archived");
    h.node.put_block(blocks[1].clone()).await.expect("archived");
    assert_eq!(h.store.get_top_confirmed(), 2);
    h.drain();

    h.node.put_block(blocks[2].clone()).await.expect("archives before validating");
    let events = h.drain();
    assert_eq!(h.heights_of(&events, Chase::Unvalid), vec![3]);
    assert_eq!(h.heights_of(&events, Chase::Disorganized), vec![2]);

    // Candidate truncated to the confirmed top; the bad block is condemned.
    assert_eq!(h.store.get_top_candidate(), 2);
    assert_eq!(h.candidate_hashes(), h.confirmed_hashes());
    let link = h.store.to_header(&blocks[2].hash()).expect("still archived");
    assert_eq!(h.store.get_block_state(link).unwrap(), BlockState::Unconfirmable);

    // The set-aside candidates live in the tree now: resubmission is a
    // duplicate, the condemned block included.
    assert_eq!(
        h.node.organize_header(blocks[3].header.clone()).await,
        Err(OrganizeError::Duplicate)
    );
    assert_eq!(
        h.node.organize_header(blocks[2].header.clone()).await,
        Err(OrganizeError::Duplicate)
    );
}

// Scenario 6: a confirmation failure rolls the confirmed chain back and
// restores the previously popped links.
#[tokio::test]
async fn confirm_rollback_restores_previous_chain() {
    let mut h = Harness::new(DEV.clone()).await;
    let genesis = h.genesis();

    // Chain A: two confirmed blocks.
    let a1 = child_block(&genesis, &h.spec, vec![coinbase(SUBSIDY, 1)]);
    let a2 = child_block(&a1.header, &h.spec, vec![coinbase(SUBSIDY, 2)]);
    for block in [&a1, &a2] {
        h.node.organize_header(block.header.clone()).await.expect("organized");
        h.node.put_block(block.clone()).await.expect("archived");
    }
    assert_eq!(h.store.get_top_confirmed(), 2);

    // Chain B: three blocks from genesis, stronger than A, but the third
    // double spends the first's coinbase at confirmation time.
    let b1 = child_block(&genesis, &h.spec, vec![coinbase(SUBSIDY, 11)]);
    let funded = OutPoint { txid: b1.transactions[0].txid(), index: 0 };
    let b2 = child_block(&b1.header, &h.spec, vec![coinbase(SUBSIDY, 12), spend(funded, 1)]);
    let b3 = child_block(&b2.header, &h.spec, vec![coinbase(SUBSIDY, 13), spend(funded, 2)]);
    for block in [&b1, &b2, &b3] {
        h.node.organize_header(block.header.clone()).await.expect("accepted");
    }
    assert_eq!(h.store.get_top_candidate(), 3, "B is the stronger candidate");
    h.drain();

    h.node.put_block(b1.clone()).await.expect("archived");
    h.node.put_block(b2.clone()).await.expect("archived");
    let events = h.drain();
    assert!(events.iter().all(|event| event.chase != Chase::Valid), "gap below position");

    h.node.put_block(b3.clone()).await.expect("archived");
    let events = h.drain();

    // The confirm pass popped A, pushed B1 and B2, hit the double spend,
    // and rolled back to A.
    assert_eq!(h.heights_of(&events, Chase::Unconfirmable), vec![3]);
    assert_eq!(h.store.get_top_confirmed(), 2);
    assert_eq!(
        h.confirmed_hashes()[1..],
        [a1.hash(), a2.hash()],
        "popped links restored in original order"
    );
    let link = h.store.to_header(&b3.hash()).expect("archived");
    assert_eq!(h.store.get_block_state(link).unwrap(), BlockState::Unconfirmable);

    // The disorganize that followed put the candidate back over confirmed.
    assert_eq!(h.candidate_hashes(), h.confirmed_hashes());

    // Reorganized/organized announcements bracket the rollback.
    let reorganized = h.heights_of(&events, Chase::Reorganized);
    assert_eq!(reorganized, vec![2, 1, 2, 1], "initial pops then rollback pops");
    let organized = h.heights_of(&events, Chase::Organized);
    assert_eq!(organized, vec![1, 2, 1, 2], "fork pushes then restoration");
}

// Scenario 7: disk full during a body write suspends, snapshots, resumes.
#[tokio::test]
async fn disk_full_recovers_through_snapshot() {
    let mut h = Harness::new(DEV.clone()).await;
    let genesis = h.genesis();

    let block1 = child_block(&genesis, &h.spec, vec![coinbase(SUBSIDY, 1)]);
    h.node.organize_header(block1.header.clone()).await.expect("organized");
    h.drain();
    h.net.take();

    h.store.inject_disk_full_after(0);
    let result = h.node.put_block(block1.clone()).await;
    assert!(matches!(result, Err(OrganizeError::Store(_))));

    let events = h.drain();
    assert!(events.iter().any(|event| event.chase == Chase::Snapshot));
    assert!(events.iter().any(|event| event.chase == Chase::Suspend));

    // The network suspended on disk full and resumed after the snapshot
    // chaser reclaimed space.
    let net = h.net.take();
    assert!(net.contains(&NetEvent::Suspend(SuspendReason::DiskFull)));
    assert!(net.contains(&NetEvent::Resume));
    assert!(!h.store.is_full());

    // The next write succeeds and the block confirms.
    h.node.put_block(block1).await.expect("archived after recovery");
    let events = h.drain();
    assert_eq!(h.heights_of(&events, Chase::Organized), vec![1]);
}

// Peer garbage: a body that does not commit to the header is refused and
// the height stays mapped for re-download.
#[tokio::test]
async fn mismatched_body_is_refused() {
    let mut h = Harness::new(DEV.clone()).await;
    let genesis = h.genesis();

    let block1 = child_block(&genesis, &h.spec, vec![coinbase(SUBSIDY, 1)]);
    h.node.organize_header(block1.header.clone()).await.expect("organized");
    h.drain();

    let garbage = body_for(&block1.header, vec![coinbase(SUBSIDY, 99)]);
    let result = h.node.put_block(garbage).await;
    assert!(matches!(result, Err(OrganizeError::Block(_))));

    // Still unassociated, still downloadable.
    let link = h.store.to_header(&block1.hash()).unwrap();
    assert_eq!(h.store.get_block_state(link).unwrap(), BlockState::Unassociated);
    let map = h.node.get_hashes(10).await.expect("batch");
    assert_eq!(map.entries(), [(1, block1.hash())]);
}

// Blocks-first: organize full blocks, confirm inline, reject a double
// spend at confirmation.
#[tokio::test]
async fn blocks_first_end_to_end() {
    let config = NodeConfig {
        headers_first: false,
        currency_window_minutes: 0,
        ..Default::default()
    };
    let mut h = Harness::with_config(DEV.clone(), config).await;
    let genesis = h.genesis();

    let b1 = child_block(&genesis, &h.spec, vec![coinbase(SUBSIDY, 1)]);
    let funded = OutPoint { txid: b1.transactions[0].txid(), index: 0 };
    let b2 = child_block(&b1.header, &h.spec, vec![coinbase(SUBSIDY, 2), spend(funded, 1)]);

    for (index, block) in [&b1, &b2].into_iter().enumerate() {
        let height = h.node.organize_block(block.clone()).await.expect("organized");
        assert_eq!(height, index as u64 + 1);

        let events = h.drain();
        assert_eq!(h.heights_of(&events, Chase::Blocks), vec![height - 1]);
        assert_eq!(h.heights_of(&events, Chase::Organized), vec![height]);
    }
    assert_eq!(h.store.get_top_confirmed(), 2);

    // An invalid block is rejected inline, before any organization.
    let greedy = child_block(&b2.header, &h.spec, vec![coinbase(SUBSIDY + 1, 3)]);
    assert!(matches!(
        h.node.organize_block(greedy).await,
        Err(OrganizeError::Block(_))
    ));

    // A double spend passes inline checks but fails confirmation and is
    // disorganized out.
    let b3 = child_block(&b2.header, &h.spec, vec![coinbase(SUBSIDY, 3), spend(funded, 2)]);
    h.node.organize_block(b3.clone()).await.expect("organized before confirm");
    let events = h.drain();
    assert_eq!(h.heights_of(&events, Chase::Unconfirmable), vec![3]);
    assert_eq!(h.heights_of(&events, Chase::Disorganized), vec![2]);
    assert_eq!(h.store.get_top_candidate(), 2);
    assert_eq!(h.store.get_top_confirmed(), 2);
}

// Invariant I1 at quiescence, and clean shutdown semantics.
#[tokio::test]
async fn close_notifies_and_stops() {
    let mut h = Harness::new(DEV.clone()).await;
    let chain = header_chain(&h.genesis(), &h.spec, 2, 0);
    for header in &chain {
        h.node.organize_header(header.clone()).await.expect("organized");
    }
    assert!(h.store.get_top_confirmed() <= h.store.get_top_candidate());
    h.drain();

    h.node.close().await.expect("closes");
    let mut saw_stop = false;
    while let Ok(event) = h.events.try_recv() {
        saw_stop |= event.chase == Chase::Stop;
    }
    assert!(saw_stop, "subscribers are told about the stop");
    assert!(h.net.take().contains(&NetEvent::Stop));
}
