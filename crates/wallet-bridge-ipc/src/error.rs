//! Error types for envelope handling.

use thiserror::Error;

use crate::EnvelopeKind;

/// Errors raised while encoding, decoding or validating envelopes.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The text on the wire was not a valid envelope.
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A call or call response arrived without a correlation id.
    #[error("Envelope '{event}' of kind {kind:?} has no correlation id")]
    MissingCorrelationId { event: String, kind: EnvelopeKind },

    /// The event name was empty.
    #[error("Envelope has an empty event name")]
    EmptyEvent,
}
