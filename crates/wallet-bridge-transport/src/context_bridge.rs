//! Isolated-context transport over a restricted API surface.
//!
//! An isolated rendering context never touches the raw IPC primitive. The
//! privileged side hands it an [`ExposedApi`] that can only post to, and
//! subscribe on, allow-listed channel names.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use wallet_bridge_ipc::Envelope;

use crate::{DispatchSlot, Dispatcher, Transport, TransportError, TransportResult};

/// Callback receiving raw text posted on a channel.
pub type ChannelCallback = Box<dyn Fn(String) + Send + Sync>;

/// The only surface an isolated context sees.
pub trait ExposedApi: Send + Sync {
    /// Post text on a channel.
    fn post(&self, channel: &str, message: String) -> TransportResult<()>;

    /// Receive text posted on a channel by the other side.
    fn subscribe(&self, channel: &str, callback: ChannelCallback) -> TransportResult<()>;
}

/// `ExposedApi` backed by a thread channel, with a channel allow list and
/// one subscriber per channel.
pub struct RestrictedApi {
    allowed: HashSet<String>,
    tx: Sender<(String, String)>,
    rx: Mutex<Option<Receiver<(String, String)>>>,
    subscribers: Arc<RwLock<HashMap<String, ChannelCallback>>>,
}

/// Create two connected restricted APIs sharing the same allow list.
pub fn restricted_api_pair(allowed: &[&str]) -> (RestrictedApi, RestrictedApi) {
    let (a_tx, b_rx) = crossbeam_channel::unbounded();
    let (b_tx, a_rx) = crossbeam_channel::unbounded();

    (
        RestrictedApi::new(allowed, a_tx, a_rx),
        RestrictedApi::new(allowed, b_tx, b_rx),
    )
}

impl RestrictedApi {
    fn new(allowed: &[&str], tx: Sender<(String, String)>, rx: Receiver<(String, String)>) -> Self {
        Self {
            allowed: allowed.iter().map(|channel| channel.to_string()).collect(),
            tx,
            rx: Mutex::new(Some(rx)),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn check_allowed(&self, channel: &str) -> TransportResult<()> {
        if self.allowed.contains(channel) {
            Ok(())
        } else {
            Err(TransportError::ChannelNotAllowed(channel.to_string()))
        }
    }

    /// Start the pump thread on first subscription.
    fn start_pump(&self) -> TransportResult<()> {
        let Some(rx) = self.rx.lock().take() else {
            return Ok(());
        };

        let subscribers = Arc::clone(&self.subscribers);
        thread::Builder::new()
            .name("context-bridge-rx".to_string())
            .spawn(move || {
                for (channel, message) in rx.iter() {
                    match subscribers.read().get(&channel) {
                        Some(callback) => callback(message),
                        None => warn!(channel, "No subscriber, dropping message"),
                    }
                }
                info!("Context bridge peer disconnected");
            })?;

        Ok(())
    }
}

impl ExposedApi for RestrictedApi {
    fn post(&self, channel: &str, message: String) -> TransportResult<()> {
        self.check_allowed(channel)?;
        self.tx
            .send((channel.to_string(), message))
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn subscribe(&self, channel: &str, callback: ChannelCallback) -> TransportResult<()> {
        self.check_allowed(channel)?;
        {
            let mut subscribers = self.subscribers.write();
            if subscribers.contains_key(channel) {
                return Err(TransportError::AlreadySubscribed(channel.to_string()));
            }
            subscribers.insert(channel.to_string(), callback);
        }
        debug!(channel, "Channel subscribed");
        self.start_pump()
    }
}

/// Transport for an isolated context, speaking only through an `ExposedApi`.
pub struct ContextBridgeTransport {
    api: Arc<dyn ExposedApi>,
    channel: String,
    slot: Arc<DispatchSlot>,
}

impl ContextBridgeTransport {
    /// Wrap an exposed API, using `channel` for all envelopes.
    pub fn new(api: Arc<dyn ExposedApi>, channel: impl Into<String>) -> Self {
        Self {
            api,
            channel: channel.into(),
            slot: Arc::new(DispatchSlot::new()),
        }
    }
}

impl Transport for ContextBridgeTransport {
    fn name(&self) -> &'static str {
        "context-bridge"
    }

    fn send(&self, envelope: Envelope) {
        let result = envelope
            .to_json()
            .map_err(TransportError::from)
            .and_then(|text| self.api.post(&self.channel, text));

        if let Err(e) = result {
            self.slot.report_error(
                self.name(),
                format!("Failed to post '{}': {}", envelope.event, e),
            );
        }
    }

    fn on_receive(&self, dispatcher: Dispatcher) -> TransportResult<()> {
        self.slot.set(dispatcher)?;
        let slot = Arc::clone(&self.slot);
        self.api.subscribe(
            &self.channel,
            Box::new(move |text| slot.deliver_text("context-bridge", &text)),
        )
    }
}
