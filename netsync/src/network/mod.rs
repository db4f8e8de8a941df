// Transport-facing types and contracts.
//
// The p2p layer delivers raw bytes per channel and accepts outbound
// messages addressed to peer IDs. The sync layer plugs in through the
// `MessageHandler` registration hook and never touches the transport
// internals.

use crate::crypto::Hash;
use crate::types::ChannelId;
use async_trait::async_trait;
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Network error types
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to send message: {0}")]
    SendError(String),

    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

/// A framed message entering or leaving the sync layer.
///
/// `peer_id` is the origin on ingress and the destination on egress.
#[derive(Clone, Debug)]
pub struct Message {
    pub peer_id: PeerId,
    pub channel_id: ChannelId,
    pub content: SyncContent,
}

/// The four wire message kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncContent {
    InventoryRequest(InventoryRequest),
    InventoryResponse(InventoryResponse),
    DataRequest(DataRequest),
    DataResponse(DataResponse),
}

/// Asks a peer which of the listed hashes it possesses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryRequest {
    pub channel_id: ChannelId,
    pub hashes: Vec<Hash>,
}

/// The subset of a prior inventory request the responder possesses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub channel_id: ChannelId,
    pub hashes: Vec<Hash>,
}

/// Asks a peer for the entities behind the listed hashes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    pub channel_id: ChannelId,
    pub hashes: Vec<Hash>,
}

/// Encoded entities, positional with the request's hashes.
///
/// A miss is an empty payload entry, not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub channel_id: ChannelId,
    pub payloads: Vec<Vec<u8>>,
}

/// Contract the transport expects from a message handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Channels this handler subscribes to.
    fn channel_ids(&self) -> Vec<ChannelId>;

    /// Decode raw channel bytes into a typed message.
    fn parse_message(
        &self,
        peer_id: PeerId,
        channel_id: ChannelId,
        raw: &[u8],
    ) -> crate::wire::WireResult<Message>;

    /// Encode a typed message for the wire.
    fn encode_message(&self, message: &Message) -> crate::wire::WireResult<Vec<u8>>;

    /// Append a delivered message to the handler's ingress queue.
    ///
    /// Blocks (awaits) while the queue is full so transport flow control
    /// propagates upstream. Never drops silently.
    async fn handle_message(&self, message: Message) -> crate::sync::SyncResult<()>;
}

/// Outbound side of the p2p transport.
///
/// Sends enqueue into the transport and may be aborted by it on
/// cancellation; callers treat a failed send as a non-fatal drop.
pub trait Network: Send + Sync {
    fn register_message_handler(&self, handler: Arc<dyn MessageHandler>);

    /// Send a message to `message.peer_id`.
    fn send(&self, message: Message) -> NetworkResult<()>;

    /// Currently connected peers.
    fn peers(&self) -> Vec<PeerId>;
}
