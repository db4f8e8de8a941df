//! Sync manager: the intermediate layer between the consensus engine and
//! the p2p network.
//!
//! Owns the bounded ingress queue and its single consumer. Inventory and
//! data traffic is delegated to the request manager; unpacked entities are
//! triaged for orphanhood and handed to consensus, with a cascading
//! resolution pass when a block's arrival unblocks buffered descendants.

pub mod orphan;
pub mod request;

use crate::chain::Chain;
use crate::engine::{ConsensusEngine, ConsensusMessage};
use crate::network::{Message, MessageHandler, Network, NetworkError, SyncContent};
use crate::types::{Block, ChannelId, CommitCertificate, SyncData, Vote};
use crate::wire::{self, WireError};
use async_trait::async_trait;
use libp2p::PeerId;
use orphan::{OrphanBlockPool, OrphanCcPool};
use request::RequestManager;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

/// Sync errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("sync manager already started")]
    AlreadyStarted,

    #[error("sync manager stopped")]
    Stopped,
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Configuration for the sync layer.
///
/// Injected as a plain struct at construction; nothing in the sync core
/// reads a process-wide config store.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Bound of the ingress channel.
    pub message_queue_size: usize,

    /// Unanswered inventory rounds before the fan-out widens to all peers.
    pub request_retry_epochs: u32,

    /// Include the consensus engine's ID in log records.
    pub log_print_self_id: bool,

    /// Period of the retry ticker driving `RequestManager::tick`.
    pub epoch_interval: Duration,

    /// Soft cap of the orphan block pool.
    pub orphan_pool_capacity: usize,

    /// Peers per non-escalated inventory round.
    pub inventory_sample_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            message_queue_size: 1024,
            request_retry_epochs: 3,
            log_print_self_id: false,
            epoch_interval: Duration::from_secs(1),
            orphan_pool_capacity: 2048,
            inventory_sample_size: 4,
        }
    }
}

/// Sync statistics
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub orphan_blocks: usize,
    pub orphan_ccs: usize,
    pub pending_requests: usize,
}

/// The sync layer's entry point.
///
/// Lifecycle: `new` registers the manager with the network; `start` spawns
/// the ingress consumer and the retry ticker; `stop` signals shutdown;
/// `wait` joins both tasks. All buffered state is volatile.
pub struct SyncManager {
    config: SyncConfig,
    chain: Arc<dyn Chain>,
    consensus: Arc<dyn ConsensusEngine>,
    request_mgr: Arc<RequestManager>,

    // Written only by the ingress consumer; read locks serve stats and
    // data-request lookups on the same task.
    orphan_blocks: RwLock<OrphanBlockPool>,
    orphan_ccs: RwLock<OrphanCcPool>,

    incoming_tx: mpsc::Sender<Message>,
    incoming_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncManager {
    pub fn new(
        chain: Arc<dyn Chain>,
        consensus: Arc<dyn ConsensusEngine>,
        network: Arc<dyn Network>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::channel(config.message_queue_size);
        let (shutdown_tx, _) = watch::channel(false);
        let request_mgr = Arc::new(RequestManager::new(
            chain.clone(),
            network.clone(),
            &config,
        ));

        let manager = Arc::new(Self {
            orphan_blocks: RwLock::new(OrphanBlockPool::new(config.orphan_pool_capacity)),
            orphan_ccs: RwLock::new(OrphanCcPool::new()),
            config,
            chain,
            consensus,
            request_mgr,
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        });

        network.register_message_handler(manager.clone());
        manager
    }

    /// Spawn the ingress consumer and the retry ticker.
    pub async fn start(self: &Arc<Self>) -> SyncResult<()> {
        let incoming_rx = self
            .incoming_rx
            .lock()
            .await
            .take()
            .ok_or(SyncError::AlreadyStarted)?;

        let span = if self.config.log_print_self_id {
            tracing::info_span!("sync", id = %self.consensus.id())
        } else {
            tracing::info_span!("sync")
        };

        let consumer = {
            let manager = Arc::clone(self);
            let shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(
                async move { manager.ingress_loop(incoming_rx, shutdown_rx).await }
                    .instrument(span),
            )
        };

        let ticker = {
            let request_mgr = Arc::clone(&self.request_mgr);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let period = self.config.epoch_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => request_mgr.tick().await,
                    }
                }
            })
        };

        let mut tasks = self.tasks.lock().await;
        tasks.push(consumer);
        tasks.push(ticker);
        info!("sync manager started");
        Ok(())
    }

    /// Signal shutdown. The consumer observes it on its next iteration and
    /// exits without flushing pending ingress.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Block until the consumer and ticker have exited.
    pub async fn wait(&self) {
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    pub async fn stats(&self) -> SyncStats {
        SyncStats {
            orphan_blocks: self.orphan_blocks.read().await.len(),
            orphan_ccs: self.orphan_ccs.read().await.len(),
            pending_requests: self.request_mgr.len().await,
        }
    }

    pub fn request_manager(&self) -> &Arc<RequestManager> {
        &self.request_mgr
    }

    async fn ingress_loop(
        self: Arc<Self>,
        mut incoming_rx: mpsc::Receiver<Message>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("ingress consumer stopping");
                        return;
                    }
                }
                maybe_message = incoming_rx.recv() => match maybe_message {
                    Some(message) => self.process_message(message).await,
                    None => return,
                },
            }
        }
    }

    /// Dispatch one ingress message by its kind. The set is closed; an
    /// undecodable kind never reaches this point (dropped at parse).
    pub async fn process_message(&self, message: Message) {
        let peer_id = message.peer_id;
        match message.content {
            SyncContent::InventoryRequest(request) => {
                self.request_mgr.handle_inv_request(peer_id, &request);
            }
            SyncContent::InventoryResponse(response) => {
                self.request_mgr.handle_inv_response(peer_id, &response).await;
            }
            SyncContent::DataRequest(request) => {
                let orphan_blocks = self.orphan_blocks.read().await;
                let orphan_ccs = self.orphan_ccs.read().await;
                self.request_mgr
                    .handle_data_request(peer_id, &request, &orphan_blocks, &orphan_ccs);
            }
            SyncContent::DataResponse(response) => {
                let entities = self.request_mgr.handle_data_response(peer_id, &response).await;
                for data in entities {
                    self.process_data(data).await;
                }
            }
        }
    }

    /// Process one decoded entity and everything it transitively resolves.
    ///
    /// Runs an explicit work-list instead of recursing: each resolution
    /// removes its entry from a pool, so the queue drains in at most the
    /// pooled entry count plus one.
    pub async fn process_data(&self, data: SyncData) {
        let mut queue = VecDeque::new();
        queue.push_back(data);

        while let Some(item) = queue.pop_front() {
            match item {
                SyncData::Proposal(proposal) => {
                    // CC first, so the block's arrival path sees it.
                    queue.push_front(SyncData::Block(proposal.block));
                    if let Some(cc) = proposal.commit_certificate {
                        queue.push_front(SyncData::CommitCertificate(cc));
                    }
                }
                SyncData::Block(block) => self.handle_block(block, &mut queue).await,
                SyncData::CommitCertificate(cc) => self.handle_cc(cc).await,
                SyncData::Vote(vote) => self.handle_vote(vote).await,
            }
        }
    }

    async fn handle_block(&self, block: Block, queue: &mut VecDeque<SyncData>) {
        let hash = block.hash();

        if self.chain.is_orphan(&block) {
            debug!(block = %hash, parent = %block.parent, "received orphaned block");
            let parent = block.parent;
            self.orphan_blocks.write().await.add(block);
            self.request_mgr.enqueue_blocks(parent).await;
            return;
        }

        debug!(block = %hash, parent = %block.parent, "received block");
        self.consensus.add_message(ConsensusMessage::Block(block));
        self.request_mgr.cancel(&hash).await;

        if let Some(cc) = self
            .orphan_ccs
            .write()
            .await
            .try_get_cc_by_block_hash(&hash)
        {
            queue.push_back(SyncData::CommitCertificate(cc));
        }

        let mut orphan_blocks = self.orphan_blocks.write().await;
        while let Some(child) = orphan_blocks.try_get_next_block(&hash) {
            queue.push_back(SyncData::Block(child));
        }
    }

    async fn handle_cc(&self, cc: CommitCertificate) {
        if self.chain.find_block(&cc.block_hash).is_none() {
            debug!(block = %cc.block_hash, "received orphaned CC");
            let target = cc.block_hash;
            self.orphan_ccs.write().await.add(cc);
            self.request_mgr.enqueue_blocks(target).await;
            return;
        }

        self.consensus.add_message(ConsensusMessage::CommitCertificate(cc));
    }

    async fn handle_vote(&self, vote: Vote) {
        if let Some(block_hash) = vote.block_hash {
            if self.chain.find_block(&block_hash).is_none() {
                debug!(block = %block_hash, "received orphaned vote");
                // Dropped: consensus will re-observe the vote once the
                // block is known.
                self.request_mgr.enqueue_blocks(block_hash).await;
                return;
            }
        }

        self.consensus.add_message(ConsensusMessage::Vote(vote));
    }
}

#[async_trait]
impl MessageHandler for SyncManager {
    fn channel_ids(&self) -> Vec<ChannelId> {
        vec![
            ChannelId::Header,
            ChannelId::Block,
            ChannelId::Proposal,
            ChannelId::CommitCertificate,
            ChannelId::Vote,
        ]
    }

    fn parse_message(
        &self,
        peer_id: PeerId,
        channel_id: ChannelId,
        raw: &[u8],
    ) -> crate::wire::WireResult<Message> {
        let content = wire::decode(raw)?;
        Ok(Message {
            peer_id,
            channel_id,
            content,
        })
    }

    fn encode_message(&self, message: &Message) -> crate::wire::WireResult<Vec<u8>> {
        wire::encode(&message.content)
    }

    async fn handle_message(&self, message: Message) -> SyncResult<()> {
        self.incoming_tx
            .send(message)
            .await
            .map_err(|_| SyncError::Stopped)
    }
}
