//! Wire framing: a 1-byte message-kind tag followed by the bincode
//! encoding of the kind's payload.
//!
//! bincode's fixed-width little-endian encoding is deterministic, so
//! structurally equal payloads encode byte-identically and the upstream
//! content-addressing stays sound.

use crate::network::{DataRequest, DataResponse, InventoryRequest, InventoryResponse, SyncContent};
use crate::types::{ChannelId, SyncData};
use thiserror::Error;

/// Message-kind tags. The set is closed; anything else is `UnknownKind`.
pub const KIND_INV_REQUEST: u8 = 0;
pub const KIND_INV_RESPONSE: u8 = 1;
pub const KIND_DATA_REQUEST: u8 = 2;
pub const KIND_DATA_RESPONSE: u8 = 3;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unknown message kind: {0}")]
    UnknownKind(u8),

    #[error("channel {0:?} carries no entity payload")]
    UnsupportedChannel(ChannelId),

    #[error("encoding failed: {0}")]
    Encode(String),
}

pub type WireResult<T> = Result<T, WireError>;

/// Encode a message content for the wire.
pub fn encode(content: &SyncContent) -> WireResult<Vec<u8>> {
    let (kind, payload) = match content {
        SyncContent::InventoryRequest(request) => (KIND_INV_REQUEST, serialize(request)?),
        SyncContent::InventoryResponse(response) => (KIND_INV_RESPONSE, serialize(response)?),
        SyncContent::DataRequest(request) => (KIND_DATA_REQUEST, serialize(request)?),
        SyncContent::DataResponse(response) => (KIND_DATA_RESPONSE, serialize(response)?),
    };
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(kind);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode wire bytes into a message content.
pub fn decode(raw: &[u8]) -> WireResult<SyncContent> {
    let (&kind, trailer) = raw
        .split_first()
        .ok_or_else(|| WireError::MalformedFrame("empty frame".into()))?;
    match kind {
        KIND_INV_REQUEST => Ok(SyncContent::InventoryRequest(deserialize(trailer)?)),
        KIND_INV_RESPONSE => Ok(SyncContent::InventoryResponse(deserialize(trailer)?)),
        KIND_DATA_REQUEST => Ok(SyncContent::DataRequest(deserialize(trailer)?)),
        KIND_DATA_RESPONSE => Ok(SyncContent::DataResponse(deserialize(trailer)?)),
        other => Err(WireError::UnknownKind(other)),
    }
}

/// Encode an entity for a data response payload. The channel tells the
/// receiving side which type to decode.
pub fn encode_entity(data: &SyncData) -> WireResult<(ChannelId, Vec<u8>)> {
    match data {
        SyncData::Proposal(proposal) => Ok((ChannelId::Proposal, serialize(proposal)?)),
        SyncData::Block(block) => Ok((ChannelId::Block, serialize(block)?)),
        SyncData::CommitCertificate(cc) => Ok((ChannelId::CommitCertificate, serialize(cc)?)),
        SyncData::Vote(vote) => Ok((ChannelId::Vote, serialize(vote)?)),
    }
}

/// Decode a data response payload by its channel.
pub fn decode_entity(channel_id: ChannelId, raw: &[u8]) -> WireResult<SyncData> {
    match channel_id {
        ChannelId::Proposal => Ok(SyncData::Proposal(deserialize(raw)?)),
        ChannelId::Block => Ok(SyncData::Block(deserialize(raw)?)),
        ChannelId::CommitCertificate => Ok(SyncData::CommitCertificate(deserialize(raw)?)),
        ChannelId::Vote => Ok(SyncData::Vote(deserialize(raw)?)),
        ChannelId::Header => Err(WireError::UnsupportedChannel(channel_id)),
    }
}

fn serialize<T: serde::Serialize>(value: &T) -> WireResult<Vec<u8>> {
    bincode::serialize(value).map_err(|err| WireError::Encode(err.to_string()))
}

fn deserialize<'a, T: serde::Deserialize<'a>>(raw: &'a [u8]) -> WireResult<T> {
    bincode::deserialize(raw).map_err(|err| WireError::MalformedFrame(err.to_string()))
}
