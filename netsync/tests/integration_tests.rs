// End-to-end scenarios for the sync layer, driven against the in-memory
// chain and recording fixtures: orphan buffering, cascading resolution,
// inventory/data round-trips, and lifecycle behavior.

use netsync::network::{DataResponse, InventoryRequest, MessageHandler, SyncContent};
use netsync::wire::{self, WireError};
use netsync::{
    Block, ChannelId, CommitCertificate, ConsensusMessage, Message, Proposal, SyncConfig,
    SyncData, SyncError, SyncManager, Vote,
};
use std::sync::Arc;
use std::time::Duration;
use testutil::fixtures::{MemoryChain, RecordingConsensus, RecordingNetwork};
use testutil::generators::{random_block, random_peer_id};

struct Harness {
    chain: Arc<MemoryChain>,
    consensus: Arc<RecordingConsensus>,
    network: Arc<RecordingNetwork>,
    manager: Arc<SyncManager>,
}

fn harness() -> Harness {
    let chain = Arc::new(MemoryChain::with_genesis());
    let consensus = Arc::new(RecordingConsensus::committing_to("node-1", chain.clone()));
    let network = Arc::new(RecordingNetwork::new());
    let manager = SyncManager::new(
        chain.clone(),
        consensus.clone(),
        network.clone(),
        SyncConfig::default(),
    );
    Harness {
        chain,
        consensus,
        network,
        manager,
    }
}

fn block_payload(block: &Block) -> Vec<u8> {
    let (_, payload) = wire::encode_entity(&SyncData::Block(block.clone())).unwrap();
    payload
}

#[tokio::test]
async fn test_orphan_arrives_first() {
    let h = harness();
    let b1 = random_block(h.chain.genesis_hash(), 1);
    let b2 = random_block(b1.hash(), 2);

    h.manager.process_data(SyncData::Block(b2)).await;

    let stats = h.manager.stats().await;
    assert_eq!(stats.orphan_blocks, 1);
    assert!(h.manager.request_manager().contains(&b1.hash()).await);
    assert!(h.consensus.is_empty());
}

#[tokio::test]
async fn test_parent_resolves_child() {
    let h = harness();
    let b1 = random_block(h.chain.genesis_hash(), 1);
    let b2 = random_block(b1.hash(), 2);

    h.manager.process_data(SyncData::Block(b2.clone())).await;
    h.manager.process_data(SyncData::Block(b1.clone())).await;

    assert_eq!(h.consensus.blocks(), vec![b1.clone(), b2]);
    let stats = h.manager.stats().await;
    assert_eq!(stats.orphan_blocks, 0);
    assert!(!h.manager.request_manager().contains(&b1.hash()).await);
}

#[tokio::test]
async fn test_cc_orphan_then_block() {
    let h = harness();
    let b3 = random_block(h.chain.genesis_hash(), 1);
    let cc = CommitCertificate::new(b3.hash(), vec![1, 2, 3]);

    h.manager.process_data(SyncData::CommitCertificate(cc.clone())).await;

    let stats = h.manager.stats().await;
    assert_eq!(stats.orphan_ccs, 1);
    assert!(h.manager.request_manager().contains(&b3.hash()).await);
    assert!(h.consensus.is_empty());

    h.manager.process_data(SyncData::Block(b3.clone())).await;

    assert_eq!(
        h.consensus.messages(),
        vec![
            ConsensusMessage::Block(b3),
            ConsensusMessage::CommitCertificate(cc),
        ]
    );
    assert_eq!(h.manager.stats().await.orphan_ccs, 0);
}

#[tokio::test]
async fn test_inventory_round_trip() {
    let h = harness();
    let known = h.chain.genesis_hash();
    let unknown = testutil::generators::random_hash();
    let peer_a = random_peer_id();

    h.manager
        .process_message(Message {
            peer_id: peer_a,
            channel_id: ChannelId::Block,
            content: SyncContent::InventoryRequest(InventoryRequest {
                channel_id: ChannelId::Block,
                hashes: vec![known, unknown],
            }),
        })
        .await;

    let sent = h.network.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].peer_id, peer_a);
    match &sent[0].content {
        SyncContent::InventoryResponse(response) => {
            assert_eq!(response.hashes, vec![known]);
        }
        other => panic!("expected InventoryResponse, got {:?}", other),
    }
}

#[tokio::test]
async fn test_data_round_trip() {
    let h = harness();
    let b4 = random_block(h.chain.genesis_hash(), 1);
    let h4 = b4.hash();

    h.manager.request_manager().enqueue_blocks(h4).await;
    h.manager
        .process_message(Message {
            peer_id: random_peer_id(),
            channel_id: ChannelId::Block,
            content: SyncContent::DataResponse(DataResponse {
                channel_id: ChannelId::Block,
                payloads: vec![block_payload(&b4)],
            }),
        })
        .await;

    assert_eq!(h.consensus.blocks(), vec![b4]);
    assert!(!h.manager.request_manager().contains(&h4).await);
}

#[tokio::test]
async fn test_malformed_frame_changes_nothing() {
    let h = harness();
    let peer = random_peer_id();

    match h.manager.parse_message(peer, ChannelId::Block, &[]) {
        Err(WireError::MalformedFrame(_)) => {}
        other => panic!("expected MalformedFrame, got {:?}", other),
    }

    let stats = h.manager.stats().await;
    assert_eq!(stats.orphan_blocks, 0);
    assert_eq!(stats.orphan_ccs, 0);
    assert_eq!(stats.pending_requests, 0);
    assert!(h.consensus.is_empty());

    // The manager still accepts well-formed traffic.
    let block = random_block(h.chain.genesis_hash(), 1);
    h.manager.process_data(SyncData::Block(block.clone())).await;
    assert_eq!(h.consensus.blocks(), vec![block]);
}

#[tokio::test]
async fn test_cascade_drains_buffered_descendants() {
    let h = harness();
    let chain = testutil::generators::block_chain(h.chain.genesis_hash(), 1, 6);

    // Everything after the first block arrives ahead of its ancestry.
    for block in chain.iter().skip(1).rev() {
        h.manager.process_data(SyncData::Block(block.clone())).await;
    }
    assert_eq!(h.manager.stats().await.orphan_blocks, 5);
    assert!(h.consensus.is_empty());

    h.manager.process_data(SyncData::Block(chain[0].clone())).await;

    assert_eq!(h.consensus.blocks(), chain);
    assert_eq!(h.manager.stats().await.orphan_blocks, 0);
}

#[tokio::test]
async fn test_cascade_resolves_forks_lowest_hash_first() {
    let h = harness();
    let b1 = random_block(h.chain.genesis_hash(), 1);
    let mut forks = vec![random_block(b1.hash(), 2), random_block(b1.hash(), 2)];
    forks.sort_by_key(|block| block.hash());

    h.manager.process_data(SyncData::Block(forks[1].clone())).await;
    h.manager.process_data(SyncData::Block(forks[0].clone())).await;
    h.manager.process_data(SyncData::Block(b1.clone())).await;

    assert_eq!(
        h.consensus.blocks(),
        vec![b1, forks[0].clone(), forks[1].clone()]
    );
}

#[tokio::test]
async fn test_orphan_resend_reaches_consensus_once() {
    let h = harness();
    let b1 = random_block(h.chain.genesis_hash(), 1);
    let b2 = random_block(b1.hash(), 2);

    h.manager.process_data(SyncData::Block(b2.clone())).await;
    h.manager.process_data(SyncData::Block(b2.clone())).await;
    assert_eq!(h.manager.stats().await.orphan_blocks, 1);

    h.manager.process_data(SyncData::Block(b1.clone())).await;

    assert_eq!(h.consensus.blocks(), vec![b1, b2]);
}

#[tokio::test]
async fn test_proposal_routes_cc_before_block() {
    let h = harness();
    let b1 = random_block(h.chain.genesis_hash(), 1);
    let cc = CommitCertificate::new(h.chain.genesis_hash(), vec![9]);
    let proposal = Proposal {
        commit_certificate: Some(cc.clone()),
        block: b1.clone(),
    };

    h.manager.process_data(SyncData::Proposal(proposal)).await;

    assert_eq!(
        h.consensus.messages(),
        vec![
            ConsensusMessage::CommitCertificate(cc),
            ConsensusMessage::Block(b1),
        ]
    );
}

#[tokio::test]
async fn test_vote_for_missing_block_is_dropped_and_requested() {
    let h = harness();
    let missing = testutil::generators::random_hash();
    let vote = Vote {
        block_hash: Some(missing),
        voter: vec![1],
        signature: vec![2],
    };

    h.manager.process_data(SyncData::Vote(vote)).await;

    assert!(h.consensus.is_empty());
    assert!(h.manager.request_manager().contains(&missing).await);
}

#[tokio::test]
async fn test_vote_for_known_block_is_forwarded() {
    let h = harness();
    let vote = Vote {
        block_hash: Some(h.chain.genesis_hash()),
        voter: vec![1],
        signature: vec![2],
    };

    h.manager.process_data(SyncData::Vote(vote.clone())).await;

    assert_eq!(h.consensus.messages(), vec![ConsensusMessage::Vote(vote)]);
}

#[tokio::test]
async fn test_hashless_vote_is_forwarded() {
    let h = harness();
    let vote = Vote {
        block_hash: None,
        voter: vec![1],
        signature: vec![2],
    };

    h.manager.process_data(SyncData::Vote(vote.clone())).await;

    assert_eq!(h.consensus.messages(), vec![ConsensusMessage::Vote(vote)]);
}

#[tokio::test]
async fn test_subscribed_channels() {
    let h = harness();

    assert_eq!(
        h.manager.channel_ids(),
        vec![
            ChannelId::Header,
            ChannelId::Block,
            ChannelId::Proposal,
            ChannelId::CommitCertificate,
            ChannelId::Vote,
        ]
    );
}

#[tokio::test]
async fn test_parse_then_encode_round_trip() {
    let h = harness();
    let peer = random_peer_id();
    let content = SyncContent::InventoryRequest(InventoryRequest {
        channel_id: ChannelId::Block,
        hashes: vec![h.chain.genesis_hash()],
    });
    let bytes = wire::encode(&content).unwrap();

    let message = h.manager.parse_message(peer, ChannelId::Block, &bytes).unwrap();
    assert_eq!(message.peer_id, peer);
    assert_eq!(message.content, content);
    assert_eq!(h.manager.encode_message(&message).unwrap(), bytes);
}

#[tokio::test]
async fn test_ingress_is_fifo_per_producer() {
    let h = harness();
    let peer = random_peer_id();
    let b1 = random_block(h.chain.genesis_hash(), 1);
    let b2 = random_block(b1.hash(), 2);

    h.manager.start().await.unwrap();

    let handler = h.network.handler().expect("handler registered at construction");
    for block in [&b1, &b2] {
        handler
            .handle_message(Message {
                peer_id: peer,
                channel_id: ChannelId::Block,
                content: SyncContent::DataResponse(DataResponse {
                    channel_id: ChannelId::Block,
                    payloads: vec![block_payload(block)],
                }),
            })
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.consensus.blocks(), vec![b1, b2]);

    h.manager.stop();
    h.manager.wait().await;
}

#[tokio::test]
async fn test_start_twice_fails() {
    let h = harness();

    h.manager.start().await.unwrap();
    assert!(matches!(
        h.manager.start().await,
        Err(SyncError::AlreadyStarted)
    ));

    h.manager.stop();
    h.manager.wait().await;
}

#[tokio::test]
async fn test_stop_terminates_consumer() {
    let h = harness();

    h.manager.start().await.unwrap();
    h.manager.stop();

    // Both the consumer and the ticker observe the signal and exit.
    tokio::time::timeout(Duration::from_secs(1), h.manager.wait())
        .await
        .expect("sync manager did not shut down");
}
