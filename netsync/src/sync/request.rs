//! Request manager: causes the local node to obtain every block hash that
//! has been referenced but is not present in the chain.
//!
//! Hashes are recorded by `enqueue_blocks` and driven by the periodic
//! `tick`: each round broadcasts an inventory request to a rotating sample
//! of peers, widening to every connected peer once a hash has gone
//! unanswered for the configured number of rounds. Peers advertising a
//! pending hash are sent a data request; returned entities re-enter the
//! sync manager's processing path.

use crate::chain::Chain;
use crate::crypto::Hash;
use crate::network::{
    DataRequest, DataResponse, InventoryRequest, InventoryResponse, Message, Network, SyncContent,
};
use crate::sync::orphan::{OrphanBlockPool, OrphanCcPool};
use crate::sync::SyncConfig;
use crate::types::{ChannelId, SyncData};
use crate::wire;
use libp2p::PeerId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A hash being sought, with its retry bookkeeping.
#[derive(Debug, Clone)]
struct PendingHash {
    added_epoch: u32,
    /// Inventory rounds broadcast without any peer advertising the hash.
    unanswered_rounds: u32,
}

impl PendingHash {
    fn new(epoch: u32) -> Self {
        Self {
            added_epoch: epoch,
            unanswered_rounds: 0,
        }
    }
}

struct RequestState {
    epoch: u32,
    pending: HashMap<Hash, PendingHash>,
    /// Hashes with an outstanding data request per peer. Consulted before
    /// re-requesting from the same peer; entries are invalidated when the
    /// data arrives, the hash is cancelled, or its retry escalates.
    requested_by_peer: HashMap<PeerId, HashSet<Hash>>,
}

/// Tracks missing block hashes and drives peers for them.
///
/// Invoked from the ingress consumer (handlers) and the periodic ticker
/// (`tick`); the single lock is never held across a network send.
pub struct RequestManager {
    chain: Arc<dyn Chain>,
    network: Arc<dyn Network>,
    retry_epochs: u32,
    sample_size: usize,
    state: RwLock<RequestState>,
}

impl RequestManager {
    pub fn new(chain: Arc<dyn Chain>, network: Arc<dyn Network>, config: &SyncConfig) -> Self {
        Self {
            chain,
            network,
            retry_epochs: config.request_retry_epochs,
            sample_size: config.inventory_sample_size,
            state: RwLock::new(RequestState {
                epoch: 0,
                pending: HashMap::new(),
                requested_by_peer: HashMap::new(),
            }),
        }
    }

    /// Record that `hash` is needed. No-op when the chain already has the
    /// block or the hash is already pending.
    pub async fn enqueue_blocks(&self, hash: Hash) {
        if self.chain.find_block(&hash).is_some() {
            return;
        }
        let mut state = self.state.write().await;
        let epoch = state.epoch;
        state
            .pending
            .entry(hash)
            .or_insert_with(|| PendingHash::new(epoch));
    }

    /// Explicitly drop a pending hash.
    pub async fn cancel(&self, hash: &Hash) {
        let mut state = self.state.write().await;
        state.pending.remove(hash);
        for requested in state.requested_by_peer.values_mut() {
            requested.remove(hash);
        }
    }

    /// Answer a peer's inventory request with the locally available subset.
    pub fn handle_inv_request(&self, peer_id: PeerId, request: &InventoryRequest) {
        let have: Vec<Hash> = request
            .hashes
            .iter()
            .filter(|hash| self.chain.find_block(hash).is_some())
            .copied()
            .collect();

        debug!(peer = %peer_id, requested = request.hashes.len(), have = have.len(),
            "answering inventory request");

        self.send(Message {
            peer_id,
            channel_id: request.channel_id,
            content: SyncContent::InventoryResponse(InventoryResponse {
                channel_id: request.channel_id,
                hashes: have,
            }),
        });
    }

    /// For each advertised hash still pending, ask `peer_id` for the data.
    ///
    /// The data request is built only after the whole response has been
    /// recorded, so it never asks for hashes the peer did not advertise,
    /// and a hash with a request already outstanding to this peer is not
    /// asked for again.
    pub async fn handle_inv_response(&self, peer_id: PeerId, response: &InventoryResponse) {
        let wanted: Vec<Hash> = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let requested = state.requested_by_peer.entry(peer_id).or_default();
            let mut wanted = Vec::new();
            for hash in &response.hashes {
                let entry = match state.pending.get_mut(hash) {
                    Some(entry) => entry,
                    None => continue,
                };
                entry.unanswered_rounds = 0;
                if requested.insert(*hash) {
                    wanted.push(*hash);
                }
            }
            wanted
        };

        if wanted.is_empty() {
            return;
        }

        debug!(peer = %peer_id, count = wanted.len(), "requesting advertised data");

        self.send(Message {
            peer_id,
            channel_id: response.channel_id,
            content: SyncContent::DataRequest(DataRequest {
                channel_id: response.channel_id,
                hashes: wanted,
            }),
        });
    }

    /// Serve a peer's data request from the chain or the orphan pools.
    ///
    /// The response is positional with the request's hashes; a miss is an
    /// empty payload entry, not an error.
    pub fn handle_data_request(
        &self,
        peer_id: PeerId,
        request: &DataRequest,
        orphan_blocks: &OrphanBlockPool,
        orphan_ccs: &OrphanCcPool,
    ) {
        let payloads: Vec<Vec<u8>> = request
            .hashes
            .iter()
            .map(|hash| self.locate(request.channel_id, hash, orphan_blocks, orphan_ccs))
            .collect();

        self.send(Message {
            peer_id,
            channel_id: request.channel_id,
            content: SyncContent::DataResponse(DataResponse {
                channel_id: request.channel_id,
                payloads,
            }),
        });
    }

    /// Decode the entities in a data response and release their pending
    /// hashes. Returned entities re-enter the sync manager's normal
    /// processing path; undecodable payloads are logged and skipped.
    pub async fn handle_data_response(
        &self,
        peer_id: PeerId,
        response: &DataResponse,
    ) -> Vec<SyncData> {
        let mut entities = Vec::new();
        for payload in &response.payloads {
            if payload.is_empty() {
                continue;
            }
            match wire::decode_entity(response.channel_id, payload) {
                Ok(data) => entities.push(data),
                Err(err) => {
                    warn!(peer = %peer_id, channel = ?response.channel_id, %err,
                        "dropping undecodable data payload");
                }
            }
        }

        if !entities.is_empty() {
            let mut state = self.state.write().await;
            for data in &entities {
                let satisfied = match data {
                    SyncData::Block(block) => Some(block.hash()),
                    SyncData::Proposal(proposal) => Some(proposal.block.hash()),
                    SyncData::CommitCertificate(_) | SyncData::Vote(_) => None,
                };
                if let Some(hash) = satisfied {
                    state.pending.remove(&hash);
                    if let Some(requested) = state.requested_by_peer.get_mut(&peer_id) {
                        requested.remove(&hash);
                    }
                }
            }
        }

        entities
    }

    /// Advance the retry epoch: prune satisfied hashes, then broadcast an
    /// inventory request for every hash older than one epoch, to a rotating
    /// peer sample, or to all connected peers once the hash has gone
    /// unanswered past the escalation threshold.
    pub async fn tick(&self) {
        let (epoch, sampled, escalated) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            state.epoch += 1;
            let epoch = state.epoch;

            let chain = &self.chain;
            state
                .pending
                .retain(|hash, _| chain.find_block(hash).is_none());

            // Outstanding-request bookkeeping only covers pending hashes.
            let pending = &state.pending;
            for requested in state.requested_by_peer.values_mut() {
                requested.retain(|hash| pending.contains_key(hash));
            }

            let mut sampled = Vec::new();
            let mut escalated = Vec::new();
            let retry_epochs = self.retry_epochs;
            for (hash, entry) in state.pending.iter_mut() {
                // Due once strictly older than one full epoch.
                if entry.added_epoch + 1 >= epoch {
                    continue;
                }
                entry.unanswered_rounds += 1;
                if entry.unanswered_rounds > retry_epochs {
                    escalated.push(*hash);
                } else {
                    sampled.push(*hash);
                }
            }

            // An escalated hash invalidates its outstanding per-peer
            // requests; whoever advertises it next is asked again.
            for hash in &escalated {
                for requested in state.requested_by_peer.values_mut() {
                    requested.remove(hash);
                }
            }
            (epoch, sampled, escalated)
        };

        let peers = self.network.peers();
        if peers.is_empty() {
            return;
        }

        if !sampled.is_empty() {
            let targets = rotating_sample(&peers, epoch as usize, self.sample_size);
            debug!(epoch, hashes = sampled.len(), peers = targets.len(),
                "broadcasting inventory request");
            self.broadcast_inv_request(&targets, &sampled);
        }
        if !escalated.is_empty() {
            debug!(epoch, hashes = escalated.len(), peers = peers.len(),
                "escalating inventory request to all peers");
            self.broadcast_inv_request(&peers, &escalated);
        }
    }

    pub async fn contains(&self, hash: &Hash) -> bool {
        self.state.read().await.pending.contains_key(hash)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.pending.is_empty()
    }

    fn locate(
        &self,
        channel_id: ChannelId,
        hash: &Hash,
        orphan_blocks: &OrphanBlockPool,
        orphan_ccs: &OrphanCcPool,
    ) -> Vec<u8> {
        let entity = match channel_id {
            ChannelId::Block => self
                .chain
                .find_block(hash)
                .or_else(|| orphan_blocks.get(hash).cloned())
                .map(SyncData::Block),
            ChannelId::CommitCertificate => {
                orphan_ccs.get(hash).cloned().map(SyncData::CommitCertificate)
            }
            _ => None,
        };

        match entity {
            Some(data) => match wire::encode_entity(&data) {
                Ok((_, payload)) => payload,
                Err(err) => {
                    warn!(%hash, %err, "failed to encode entity for data response");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    fn broadcast_inv_request(&self, peers: &[PeerId], hashes: &[Hash]) {
        for peer_id in peers {
            self.send(Message {
                peer_id: *peer_id,
                channel_id: ChannelId::Block,
                content: SyncContent::InventoryRequest(InventoryRequest {
                    channel_id: ChannelId::Block,
                    hashes: hashes.to_vec(),
                }),
            });
        }
    }

    fn send(&self, message: Message) {
        if let Err(err) = self.network.send(message) {
            // Transport-adjacent failure; the next epoch retries.
            warn!(%err, "outbound send failed");
        }
    }
}

/// Deterministic rotating peer sample: sorted order, window advanced by
/// epoch so successive rounds reach different peers.
fn rotating_sample(peers: &[PeerId], offset: usize, count: usize) -> Vec<PeerId> {
    let mut sorted = peers.to_vec();
    sorted.sort();
    let len = sorted.len();
    (0..count.min(len)).map(|i| sorted[(offset + i) % len]).collect()
}
