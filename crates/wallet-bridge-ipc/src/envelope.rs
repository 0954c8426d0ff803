//! The envelope: the unit that crosses a transport boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{IpcError, IpcResult};

/// Identifies exactly one outstanding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discriminates what an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    /// Host asks the worker to run a registered handler.
    Call,

    /// Successful handler result.
    CallResult,

    /// Handler failure, payload is an `ErrorPayload`.
    CallError,

    /// Fire-and-forget notification.
    Event,
}

impl EnvelopeKind {
    /// Returns true for kinds that must carry a correlation id.
    pub fn is_correlated(self) -> bool {
        !matches!(self, Self::Event)
    }
}

/// A message exchanged between host and worker.
///
/// On the wire calls put their arguments under `payload`; responses and
/// events put their data under `result`. Decoding accepts either field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub struct Envelope {
    /// Call-type or event-type name.
    pub event: String,

    /// What the envelope carries.
    pub kind: EnvelopeKind,

    /// Set for calls and call responses.
    pub correlation_id: Option<CorrelationId>,

    /// Arguments for calls, data for results and events.
    pub payload: Value,
}

impl Envelope {
    /// Build a call envelope.
    pub fn call(event: impl Into<String>, id: CorrelationId, payload: Value) -> Self {
        Self {
            event: event.into(),
            kind: EnvelopeKind::Call,
            correlation_id: Some(id),
            payload,
        }
    }

    /// Build a successful response to the call `id`.
    pub fn call_result(event: impl Into<String>, id: CorrelationId, result: Value) -> Self {
        Self {
            event: event.into(),
            kind: EnvelopeKind::CallResult,
            correlation_id: Some(id),
            payload: result,
        }
    }

    /// Build a failed response to the call `id`.
    pub fn call_error(event: impl Into<String>, id: CorrelationId, message: impl Into<String>) -> Self {
        let error = crate::ErrorPayload::new(message);
        Self {
            event: event.into(),
            kind: EnvelopeKind::CallError,
            correlation_id: Some(id),
            payload: serde_json::to_value(error).unwrap_or(Value::Null),
        }
    }

    /// Build a fire-and-forget event.
    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            kind: EnvelopeKind::Event,
            correlation_id: None,
            payload,
        }
    }

    /// Check protocol invariants that serde cannot express.
    pub fn validate(&self) -> IpcResult<()> {
        if self.event.is_empty() {
            return Err(IpcError::EmptyEvent);
        }
        if self.kind.is_correlated() && self.correlation_id.is_none() {
            return Err(IpcError::MissingCorrelationId {
                event: self.event.clone(),
                kind: self.kind,
            });
        }
        Ok(())
    }

    /// Serialize to the JSON text sent over a transport.
    pub fn to_json(&self) -> IpcResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate JSON text received from a transport.
    pub fn from_json(text: &str) -> IpcResult<Self> {
        let envelope: Self = serde_json::from_str(text)?;
        envelope.validate()?;
        Ok(envelope)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    event: String,
    kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        let (payload, result) = match envelope.kind {
            EnvelopeKind::Call => (Some(envelope.payload), None),
            _ => (None, Some(envelope.payload)),
        };
        Self {
            event: envelope.event,
            kind: envelope.kind,
            correlation_id: envelope.correlation_id,
            payload,
            result,
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        if wire.payload.is_some() && wire.result.is_some() {
            return Err(format!(
                "envelope '{}' carries both payload and result",
                wire.event
            ));
        }
        Ok(Self {
            event: wire.event,
            kind: wire.kind,
            correlation_id: wire.correlation_id,
            payload: wire.payload.or(wire.result).unwrap_or(Value::Null),
        })
    }
}
