//! Payload types shared by host and worker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChainType {
    /// EVM-compatible chain.
    Evm,
}

impl From<ChainType> for u8 {
    fn from(chain_type: ChainType) -> Self {
        match chain_type {
            ChainType::Evm => 0,
        }
    }
}

impl TryFrom<u8> for ChainType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Evm),
            other => Err(format!("unknown chain type {other}")),
        }
    }
}

/// A chain/network identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chain {
    /// Chain family.
    #[serde(rename = "type")]
    pub chain_type: ChainType,

    /// Chain id within the family.
    pub id: u64,
}

impl Chain {
    /// An EVM chain with the given id.
    pub fn evm(id: u64) -> Self {
        Self {
            chain_type: ChainType::Evm,
            id,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", u8::from(self.chain_type), self.id)
    }
}

/// Connectivity of the peer-to-peer broadcaster client for one chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcasterConnectionStatus {
    /// Looking for broadcasters.
    #[default]
    Searching,

    /// At least one broadcaster is reachable.
    Connected,

    /// Lost all peers.
    Disconnected,

    /// Peers reachable but no broadcaster serves this chain.
    AllUnavailable,

    /// Client paused to save resources.
    Hibernating,

    /// Client failed.
    Error,
}

impl BroadcasterConnectionStatus {
    /// Check if connected.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transient state.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Searching | Self::Hibernating)
    }

    /// Get status message for UI.
    pub fn message(self) -> &'static str {
        match self {
            Self::Searching => "Searching for broadcasters...",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::AllUnavailable => "No broadcasters available",
            Self::Hibernating => "Hibernating",
            Self::Error => "Broadcaster client error",
        }
    }
}

/// Payload of the broadcaster status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterStatusCallbackData {
    /// Chain the status applies to.
    pub chain: Chain,

    /// New connection state.
    pub status: BroadcasterConnectionStatus,
}

/// Serialized error description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human readable message.
    pub message: String,
}

impl ErrorPayload {
    /// Create an error payload.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of a broadcaster action that reports failure in-band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionData {
    /// Error message, if the action failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionData {
    /// A successful action.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A failed action.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }
}

/// Parameters of `Broadcaster.Start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcasterStartParams {
    pub chain: Chain,
    pub trusted_fee_signer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_sub_topic: Option<String>,

    #[serde(default)]
    pub additional_direct_peers: Vec<String>,

    /// Milliseconds to wait for peer discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_discovery_timeout: Option<u64>,

    #[serde(default)]
    pub poi_active_list_keys: Vec<String>,
}

/// Parameters of `Broadcaster.SetChain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterSetChainParams {
    pub chain: Chain,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_params_accept_minimal_payload() {
        let params: BroadcasterStartParams = serde_json::from_value(json!({
            "chain": { "type": 0, "id": 1 },
            "trustedFeeSigner": "0zk1q"
        }))
        .unwrap();

        assert_eq!(params.chain, Chain::evm(1));
        assert!(params.additional_direct_peers.is_empty());
        assert_eq!(params.peer_discovery_timeout, None);
    }

    #[test]
    fn test_chain_wire_shape() {
        let value = serde_json::to_value(Chain::evm(137)).unwrap();
        assert_eq!(value, json!({ "type": 0, "id": 137 }));
    }

    #[test]
    fn test_unknown_chain_type_rejected() {
        let result: Result<Chain, _> = serde_json::from_value(json!({ "type": 9, "id": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_status_callback_wire_shape() {
        let data = BroadcasterStatusCallbackData {
            chain: Chain::evm(1),
            status: BroadcasterConnectionStatus::AllUnavailable,
        };
        let value = serde_json::to_value(data).unwrap();
        assert_eq!(
            value,
            json!({ "chain": { "type": 0, "id": 1 }, "status": "AllUnavailable" })
        );
    }

    #[test]
    fn test_action_data_omits_missing_error() {
        assert_eq!(serde_json::to_value(ActionData::ok()).unwrap(), json!({}));
        assert_eq!(
            serde_json::to_value(ActionData::failed("no peers")).unwrap(),
            json!({ "error": "no peers" })
        );
    }
}
