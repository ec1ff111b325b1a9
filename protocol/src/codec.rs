//! # Issuance Codec
//!
//! The serialized issuance snapshot is a boundary contract: it leaves the
//! engine through `custom_data` and may be persisted or transmitted by
//! whatever sits outside. The engine only depends on [`IssuanceCodec`];
//! [`BincodeCodec`] is the reference implementation.
//!
//! ## Wire Format
//!
//! ```text
//! [ version: u8 ][ bincode(IssuanceSnapshot) ]
//! ```
//!
//! Decoders reject any version byte they don't recognize instead of guessing.
//!
//! The same bincode helpers ([`encode_params`] / [`decode_params`]) carry
//! maker/taker parameters and policy property blobs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CODEC_VERSION;
use crate::instrument::issuance::Issuance;
use crate::ledger::line_item::SupplementalLineItem;

/// Errors raised while encoding or decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("unsupported codec version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },
}

/// Everything an outside observer needs to reconstruct an issuance:
/// parties, state, due timestamps, properties and the full line-item list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceSnapshot {
    pub issuance: Issuance,
    pub line_items: Vec<SupplementalLineItem>,
}

/// Versioned serializer for issuance snapshots.
pub trait IssuanceCodec: Send + Sync {
    fn encode(&self, snapshot: &IssuanceSnapshot) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<IssuanceSnapshot, CodecError>;
}

/// Version-prefixed bincode encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl IssuanceCodec for BincodeCodec {
    fn encode(&self, snapshot: &IssuanceSnapshot) -> Result<Vec<u8>, CodecError> {
        let body = encode_params(snapshot)?;
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(CODEC_VERSION);
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<IssuanceSnapshot, CodecError> {
        let (version, body) = bytes
            .split_first()
            .ok_or_else(|| CodecError::Decode("empty buffer".into()))?;
        if *version != CODEC_VERSION {
            return Err(CodecError::UnsupportedVersion {
                found: *version,
                expected: CODEC_VERSION,
            });
        }
        decode_params(body)
    }
}

/// Encodes a parameter or properties struct.
pub fn encode_params<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a parameter or properties struct.
pub fn decode_params<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::issuance::IssuanceState;
    use crate::ledger::line_item::{LineItemKind, LineItemState};
    use crate::types::Address;
    use chrono::Utc;

    fn snapshot() -> IssuanceSnapshot {
        let now = Utc::now();
        IssuanceSnapshot {
            issuance: Issuance {
                id: 7,
                maker: Address::from_label("maker"),
                taker: Address::ZERO,
                state: IssuanceState::Engageable,
                escrow_address: Address::from_label("escrow"),
                created_at: now,
                engaged_at: None,
                engagement_due: Some(now),
                issuance_due: None,
                properties: vec![1, 2, 3],
            },
            line_items: vec![SupplementalLineItem {
                id: 1,
                kind: LineItemKind::Principal,
                state: LineItemState::Unpaid,
                obligor: Address::from_label("escrow"),
                claimor: Address::from_label("maker"),
                token: Address::from_label("L"),
                amount: 20_000,
                due: now,
                reinitiated_to: 0,
            }],
        }
    }

    #[test]
    fn snapshot_survives_encoding() {
        let codec = BincodeCodec;
        let original = snapshot();
        let bytes = codec.encode(&original).unwrap();
        assert_eq!(bytes[0], CODEC_VERSION);
        assert_eq!(codec.decode(&bytes).unwrap(), original);
    }

    #[test]
    fn unknown_line_item_kind_rejected() {
        let last = encode_params(&LineItemKind::SwapOutput).unwrap();
        assert_eq!(last, vec![4, 0, 0, 0]);
        assert!(decode_params::<LineItemKind>(&[5, 0, 0, 0]).is_err());
    }

    #[test]
    fn unknown_version_rejected() {
        let codec = BincodeCodec;
        let mut bytes = codec.encode(&snapshot()).unwrap();
        bytes[0] = CODEC_VERSION + 1;
        assert!(matches!(
            codec.decode(&bytes),
            Err(CodecError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn empty_and_truncated_buffers_rejected() {
        let codec = BincodeCodec;
        assert!(matches!(codec.decode(&[]), Err(CodecError::Decode(_))));
        let bytes = codec.encode(&snapshot()).unwrap();
        assert!(codec.decode(&bytes[..bytes.len() / 2]).is_err());
    }
}
