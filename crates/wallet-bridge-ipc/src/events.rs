//! Well-known event and call names.

/// Fire-and-forget events, mostly sent from the worker to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeEvent {
    /// Generic log line.
    Message,

    /// Error log line, payload is an `ErrorPayload`.
    Error,

    /// The worker context crashed with no handler.
    UncaughtException,

    /// Log line from the broadcaster client.
    WakuMessage,

    /// Error from the broadcaster client.
    WakuError,

    /// Broadcaster connectivity changed for a chain.
    OnBroadcasterStatusCallback,

    /// Proof generation progress.
    OnProofProgress,

    /// Shielded balances changed.
    OnBalancesUpdate,

    /// UTXO merkletree scan progress.
    OnUtxoMerkletreeScanUpdate,
}

impl BridgeEvent {
    /// Every known event.
    pub const ALL: [Self; 9] = [
        Self::Message,
        Self::Error,
        Self::UncaughtException,
        Self::WakuMessage,
        Self::WakuError,
        Self::OnBroadcasterStatusCallback,
        Self::OnProofProgress,
        Self::OnBalancesUpdate,
        Self::OnUtxoMerkletreeScanUpdate,
    ];

    /// Returns the name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Error => "error",
            Self::UncaughtException => "uncaughtException",
            Self::WakuMessage => "wakuMessage",
            Self::WakuError => "wakuError",
            Self::OnBroadcasterStatusCallback => "OnBroadcasterStatusCallback",
            Self::OnProofProgress => "onProofProgress",
            Self::OnBalancesUpdate => "onBalancesUpdate",
            Self::OnUtxoMerkletreeScanUpdate => "onUTXOMerkletreeScanCallback",
        }
    }

    /// Look up an event by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl AsRef<str> for BridgeEvent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Calls the worker answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeCallEvent {
    /// Start the broadcaster client for a chain.
    BroadcasterStart,

    /// Ask the broadcaster client to reconnect.
    BroadcasterTryReconnect,

    /// Switch the broadcaster client to another chain.
    BroadcasterSetChain,

    /// Number of peers in the broadcaster mesh.
    BroadcasterGetMeshPeerCount,

    /// Random bytes from the worker's RNG.
    GetRandomBytes,

    /// Generate a transfer proof.
    GenerateTransferProof,

    /// Populate a shield transaction.
    PopulateShield,

    /// Gas estimate for a shield transaction.
    GasEstimateForShield,
}

impl BridgeCallEvent {
    /// Returns the name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BroadcasterStart => "Broadcaster.Start",
            Self::BroadcasterTryReconnect => "Broadcaster.TryReconnect",
            Self::BroadcasterSetChain => "Broadcaster.SetChain",
            Self::BroadcasterGetMeshPeerCount => "Broadcaster.GetMeshPeerCount",
            Self::GetRandomBytes => "getRandomBytes",
            Self::GenerateTransferProof => "generateTransferProof",
            Self::PopulateShield => "populateShield",
            Self::GasEstimateForShield => "gasEstimateForShield",
        }
    }
}

impl AsRef<str> for BridgeCallEvent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_round_trip() {
        for event in BridgeEvent::ALL {
            assert_eq!(BridgeEvent::from_name(event.as_str()), Some(event));
        }
        assert_eq!(BridgeEvent::from_name("nope"), None);
    }

    #[test]
    fn test_event_names_are_unique() {
        let mut names: Vec<_> = BridgeEvent::ALL.iter().map(|e| e.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BridgeEvent::ALL.len());
    }
}
