//! The bridge core.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use wallet_bridge_ipc::{BridgeEvent, CorrelationId, Envelope, EnvelopeKind, ErrorPayload};
use wallet_bridge_transport::{Dispatcher, FnTransport, Transport};

use crate::calls::{self, CallRegistry};
use crate::listeners::{Listener, ListenerRegistry, TypedListener};
use crate::pending::{CallOutcome, PendingCalls};
use crate::{BridgeConfig, BridgeError, BridgeResult, BridgeState};

/// Transport and runtime, fixed by `setup`.
struct Wiring {
    transport: Arc<dyn Transport>,
    runtime: Handle,
}

struct Inner {
    config: BridgeConfig,
    wiring: RwLock<Option<Arc<Wiring>>>,
    pending: PendingCalls,
    calls: CallRegistry,
    listeners: ListenerRegistry,
}

/// One side of the host/worker bridge.
///
/// The same type serves both sides: the host issues `call`s and listens for
/// events, the worker registers call handlers and triggers events. Clones
/// share state.
#[derive(Clone)]
pub struct BridgeCore {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`BridgeCore`].
///
/// Anything stored inside the core itself, such as state captured by call
/// handlers, must hold one of these instead of a `BridgeCore`, or the core
/// is never freed.
#[derive(Clone)]
pub struct WeakBridge {
    inner: Weak<Inner>,
}

impl WeakBridge {
    /// The bridge, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<BridgeCore> {
        self.inner.upgrade().map(|inner| BridgeCore { inner })
    }
}

impl BridgeCore {
    /// Create an uninitialized bridge.
    pub fn new(config: BridgeConfig) -> Self {
        let reject_on_crash = config.reject_pending_on_uncaught_exception;
        let core = Self {
            inner: Arc::new(Inner {
                config,
                wiring: RwLock::new(None),
                pending: PendingCalls::new(),
                calls: CallRegistry::new(),
                listeners: ListenerRegistry::new(),
            }),
        };

        if reject_on_crash {
            let weak = Arc::downgrade(&core.inner);
            core.listen(
                BridgeEvent::UncaughtException,
                Arc::new(move |payload: &Value| {
                    if let Some(inner) = weak.upgrade() {
                        inner.reject_all_pending(&error_message(payload));
                    }
                }),
            );
        }

        core
    }

    /// Wire a transport into the bridge. Only the first successful call
    /// takes effect; if the transport refuses the dispatcher the bridge stays
    /// uninitialized and `setup` may be retried.
    ///
    /// Must run inside a Tokio runtime; call handlers are spawned on it.
    #[instrument(name = "bridge_setup", skip_all, fields(transport = transport.name()))]
    pub fn setup(&self, transport: Arc<dyn Transport>) -> BridgeResult<()> {
        let runtime = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;

        // Wired before the dispatcher goes in: a transport may deliver
        // buffered envelopes from inside `on_receive`.
        {
            let mut wiring = self.inner.wiring.write();
            if wiring.is_some() {
                return Err(BridgeError::AlreadyInitialized);
            }
            *wiring = Some(Arc::new(Wiring {
                transport: Arc::clone(&transport),
                runtime,
            }));
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let dispatcher: Dispatcher = Arc::new(move |envelope| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_inbound(envelope);
            }
        });
        if let Err(e) = transport.on_receive(dispatcher) {
            *self.inner.wiring.write() = None;
            warn!("Transport refused dispatcher: {}", e);
            return Err(e.into());
        }

        info!("Bridge ready");
        Ok(())
    }

    /// `setup` from a raw send function and receive-registration function.
    pub fn setup_with<S, R>(&self, send_fn: S, register_receive_fn: R) -> BridgeResult<()>
    where
        S: Fn(Envelope) + Send + Sync + 'static,
        R: FnOnce(Dispatcher) + Send + 'static,
    {
        self.setup(Arc::new(FnTransport::new(send_fn, register_receive_fn)))
    }

    /// Non-owning handle to this bridge.
    pub fn downgrade(&self) -> WeakBridge {
        WeakBridge {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        if self.inner.wiring.read().is_some() {
            BridgeState::Ready
        } else {
            BridgeState::Uninitialized
        }
    }

    /// Configuration this bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Name of the wired transport, if any.
    pub fn transport_name(&self) -> Option<&'static str> {
        self.inner
            .wiring
            .read()
            .as_ref()
            .map(|w| w.transport.name())
    }

    /// Register the worker-side handler for `event`.
    ///
    /// Registering a second handler for the same event is an error.
    pub fn register_call<P, R, E, F, Fut>(&self, event: impl AsRef<str>, handler: F) -> BridgeResult<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let event = event.as_ref();
        self.inner
            .calls
            .register(event, calls::erase(event, handler))?;
        debug!(event, "Call handler registered");
        Ok(())
    }

    /// Returns true if a handler is registered for `event`.
    pub fn has_handler(&self, event: impl AsRef<str>) -> bool {
        self.inner.calls.contains(event.as_ref())
    }

    /// Call the remote handler for `event` and decode its result.
    ///
    /// There is no built-in deadline: if the worker never answers, the
    /// future never completes. See [`call_with_timeout`](Self::call_with_timeout).
    pub async fn call<P, R>(&self, event: impl AsRef<str>, params: P) -> BridgeResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let event = event.as_ref();
        let payload = encode(event, params)?;
        let value = self.call_raw(event, payload).await?;
        decode(event, value)
    }

    /// `call` with a caller-side deadline.
    ///
    /// On expiry the pending record is dropped; a late response is then
    /// treated as orphaned and ignored.
    pub async fn call_with_timeout<P, R>(
        &self,
        event: impl AsRef<str>,
        params: P,
        limit: Duration,
    ) -> BridgeResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let event = event.as_ref();
        let payload = encode(event, params)?;
        let value = self.call_raw_with_timeout(event, payload, limit).await?;
        decode(event, value)
    }

    /// Untyped call.
    pub async fn call_raw(&self, event: &str, payload: Value) -> BridgeResult<Value> {
        let (_, rx) = self.issue(event, payload)?;
        await_outcome(event, rx).await
    }

    /// Untyped call with a deadline.
    pub async fn call_raw_with_timeout(
        &self,
        event: &str,
        payload: Value,
        limit: Duration,
    ) -> BridgeResult<Value> {
        let (id, rx) = self.issue(event, payload)?;

        match tokio::time::timeout(limit, await_outcome(event, rx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.inner.pending.take(id);
                warn!(event, %id, ?limit, "Call timed out");
                Err(BridgeError::Timeout {
                    event: event.to_string(),
                    after: limit,
                })
            }
        }
    }

    /// Issue a call nobody awaits. Failures are logged, never returned.
    pub fn call_and_log<P: Serialize>(&self, event: impl AsRef<str>, params: P) {
        let event = event.as_ref().to_string();
        let payload = match encode(&event, params) {
            Ok(payload) => payload,
            Err(e) => {
                error!(event = %event, "Unawaited call not sent: {}", e);
                return;
            }
        };
        let Some(wiring) = self.inner.wiring() else {
            error!(event = %event, "Unawaited call not sent: {}", BridgeError::NotReady);
            return;
        };

        let core = self.clone();
        let limit = self.inner.config.call_and_log_timeout();
        wiring.runtime.spawn(async move {
            let outcome = match limit {
                Some(limit) => core.call_raw_with_timeout(&event, payload, limit).await,
                None => core.call_raw(&event, payload).await,
            };
            match outcome {
                Ok(_) => debug!(event = %event, "Unawaited call completed"),
                Err(e) => error!(event = %event, "Unawaited call failed: {}", e),
            }
        });
    }

    fn issue(
        &self,
        event: &str,
        payload: Value,
    ) -> BridgeResult<(CorrelationId, oneshot::Receiver<CallOutcome>)> {
        let wiring = self.inner.wiring().ok_or(BridgeError::NotReady)?;
        let (id, rx) = self.inner.pending.issue(event);

        debug!(event, %id, "Call issued");
        wiring.transport.send(Envelope::call(event, id, payload));
        Ok((id, rx))
    }

    /// Send a fire-and-forget event to the other side.
    pub fn trigger_event<T: Serialize>(&self, event: impl AsRef<str>, payload: T) {
        let event = event.as_ref();
        let Some(wiring) = self.inner.wiring() else {
            warn!(event, "Bridge not set up, dropping event");
            return;
        };
        match serde_json::to_value(payload) {
            Ok(payload) => wiring.transport.send(Envelope::event(event, payload)),
            Err(e) => warn!(event, "Failed to encode event payload: {}", e),
        }
    }

    /// Observe `event`. The same callback may be registered more than once.
    pub fn listen(&self, event: impl AsRef<str>, callback: Listener) {
        self.inner.listeners.add(event.as_ref(), callback);
    }

    /// Observe `event` with a decoded payload. Payloads that do not decode
    /// as `T` are logged and skipped. Remove with the same `callback`.
    pub fn listen_typed<T>(&self, event: impl AsRef<str>, callback: &TypedListener<T>)
    where
        T: DeserializeOwned + 'static,
    {
        let event = event.as_ref().to_string();
        let original = Arc::clone(callback);
        let wrapped: Listener = {
            let event = event.clone();
            Arc::new(move |payload: &Value| match T::deserialize(payload) {
                Ok(decoded) => original(decoded),
                Err(e) => warn!(event = %event, "Listener skipped undecodable payload: {}", e),
            })
        };
        self.inner.listeners.add_wrapped(&event, callback, wrapped);
    }

    /// Stop observing `event` with `callback`. Unknown callbacks are ignored.
    pub fn remove_listener<T: ?Sized>(&self, event: impl AsRef<str>, callback: &Arc<T>) {
        let event = event.as_ref();
        let removed = self.inner.listeners.remove(event, callback);
        debug!(event, removed, "Listener removed");
    }

    /// Number of listeners for `event`.
    pub fn listener_count(&self, event: impl AsRef<str>) -> usize {
        self.inner.listeners.count(event.as_ref())
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Reject every outstanding call with `WorkerCrashed(reason)`.
    pub fn reject_all_pending(&self, reason: &str) -> usize {
        self.inner.reject_all_pending(reason)
    }
}

impl Inner {
    fn wiring(&self) -> Option<Arc<Wiring>> {
        self.wiring.read().clone()
    }

    fn handle_inbound(&self, envelope: Envelope) {
        if let Err(e) = envelope.validate() {
            warn!("Ignoring invalid envelope: {}", e);
            return;
        }

        match envelope.kind {
            EnvelopeKind::Call => self.handle_call(envelope),
            EnvelopeKind::CallResult | EnvelopeKind::CallError => self.handle_response(envelope),
            EnvelopeKind::Event => {
                let invoked = self.listeners.dispatch(&envelope.event, &envelope.payload);
                if invoked == 0 {
                    debug!(event = %envelope.event, "No listeners for event");
                }
            }
        }
    }

    fn handle_call(&self, envelope: Envelope) {
        let Some(id) = envelope.correlation_id else {
            return;
        };
        let Some(wiring) = self.wiring() else {
            warn!(event = %envelope.event, "Call received before setup");
            return;
        };

        let Some(handler) = self.calls.get(&envelope.event) else {
            warn!(event = %envelope.event, %id, "No handler registered");
            let message = format!("No handler registered for '{}'", envelope.event);
            wiring
                .transport
                .send(Envelope::call_error(envelope.event, id, message));
            return;
        };

        let transport = Arc::clone(&wiring.transport);
        let runtime = wiring.runtime.clone();
        let Envelope { event, payload, .. } = envelope;

        wiring.runtime.spawn(async move {
            // The handler is invoked inside the task so a panic before it
            // returns its future is caught too.
            let reply = match runtime.spawn(async move { handler(payload).await }).await {
                Ok(Ok(result)) => Envelope::call_result(&event, id, result),
                Ok(Err(message)) => {
                    debug!(event = %event, %id, "Handler failed: {}", message);
                    Envelope::call_error(&event, id, message)
                }
                Err(e) => {
                    error!(event = %event, %id, "Handler panicked: {}", e);
                    Envelope::call_error(&event, id, format!("Handler for '{event}' panicked"))
                }
            };
            transport.send(reply);
        });
    }

    fn handle_response(&self, envelope: Envelope) {
        let Some(id) = envelope.correlation_id else {
            return;
        };
        let Some(pending) = self.pending.take(id) else {
            warn!(event = %envelope.event, %id, "Orphaned response ignored");
            return;
        };

        debug!(
            event = %pending.event,
            %id,
            elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
            "Call settled"
        );

        let outcome = match envelope.kind {
            EnvelopeKind::CallResult => Ok(envelope.payload),
            _ => Err(BridgeError::Remote(error_message(&envelope.payload))),
        };
        pending.settle(outcome);
    }

    fn reject_all_pending(&self, reason: &str) -> usize {
        let calls = self.pending.drain();
        let count = calls.len();
        for call in calls {
            call.settle(Err(BridgeError::WorkerCrashed(reason.to_string())));
        }
        if count > 0 {
            warn!(count, reason, "Rejected outstanding calls");
        }
        count
    }
}

async fn await_outcome(event: &str, rx: oneshot::Receiver<CallOutcome>) -> BridgeResult<Value> {
    rx.await
        .unwrap_or_else(|_| Err(BridgeError::Abandoned(event.to_string())))
}

fn encode<P: Serialize>(event: &str, params: P) -> BridgeResult<Value> {
    serde_json::to_value(params).map_err(|source| BridgeError::Encode {
        event: event.to_string(),
        source,
    })
}

fn decode<R: DeserializeOwned>(event: &str, value: Value) -> BridgeResult<R> {
    serde_json::from_value(value).map_err(|source| BridgeError::Decode {
        event: event.to_string(),
        source,
    })
}

/// Message carried by an error payload, tolerating bare strings.
fn error_message(payload: &Value) -> String {
    match ErrorPayload::deserialize(payload) {
        Ok(error) => error.message,
        Err(_) => match payload {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        },
    }
}

impl Default for BridgeCore {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;
    use wallet_bridge_transport::TransportError;
    use tokio::time::timeout;

    /// Bridge wired to a transport the test drives by hand.
    struct Harness {
        core: BridgeCore,
        sent: mpsc::UnboundedReceiver<Envelope>,
        inbound: Arc<Mutex<Option<Dispatcher>>>,
    }

    impl Harness {
        fn new(config: BridgeConfig) -> Self {
            let core = BridgeCore::new(config);
            let (tx, sent) = mpsc::unbounded_channel();
            let inbound = Arc::new(Mutex::new(None));
            let slot = Arc::clone(&inbound);

            core.setup_with(
                move |envelope| {
                    let _ = tx.send(envelope);
                },
                move |dispatcher| *slot.lock() = Some(dispatcher),
            )
            .unwrap();

            Self { core, sent, inbound }
        }

        fn deliver(&self, envelope: Envelope) {
            let dispatcher = self.inbound.lock().clone().unwrap();
            dispatcher(envelope);
        }

        async fn next_sent(&mut self) -> Envelope {
            timeout(Duration::from_secs(1), self.sent.recv())
                .await
                .unwrap()
                .unwrap()
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u64,
    }

    #[tokio::test]
    async fn test_call_before_setup_fails() {
        let core = BridgeCore::default();
        assert_eq!(core.state(), BridgeState::Uninitialized);

        let err = core.call::<_, Value>("ping", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotReady));
    }

    #[tokio::test]
    async fn test_second_setup_rejected() {
        let harness = Harness::new(BridgeConfig::default());
        assert!(harness.core.state().is_ready());
        assert_eq!(harness.core.transport_name(), Some("fn"));

        let err = harness.core.setup_with(|_| {}, |_| {}).unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyInitialized));
    }

    #[test]
    fn test_setup_requires_runtime() {
        let core = BridgeCore::default();
        let err = core.setup_with(|_| {}, |_| {}).unwrap_err();
        assert!(matches!(err, BridgeError::NoRuntime));
        assert_eq!(core.state(), BridgeState::Uninitialized);
    }

    #[tokio::test]
    async fn test_call_resolves_with_result() {
        let mut harness = Harness::new(BridgeConfig::default());
        let core = harness.core.clone();
        let call = tokio::spawn(async move { core.call::<_, u64>("ping", Ping { n: 4 }).await });

        let sent = harness.next_sent().await;
        assert_eq!(sent.kind, EnvelopeKind::Call);
        assert_eq!(sent.payload, json!({ "n": 4 }));

        harness.deliver(Envelope::call_result("ping", sent.correlation_id.unwrap(), json!(5)));
        assert_eq!(call.await.unwrap().unwrap(), 5);
        assert_eq!(harness.core.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_error_rejects_with_message() {
        let mut harness = Harness::new(BridgeConfig::default());
        let core = harness.core.clone();
        let call = tokio::spawn(async move { core.call::<_, Value>("fail", json!({})).await });

        let sent = harness.next_sent().await;
        harness.deliver(Envelope::call_error("fail", sent.correlation_id.unwrap(), "boom"));

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Remote(_)));
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_reverse_order_responses_do_not_cross() {
        let mut harness = Harness::new(BridgeConfig::default());
        let calls: Vec<_> = (0..8u64)
            .map(|n| {
                let core = harness.core.clone();
                tokio::spawn(async move { (n, core.call::<_, u64>("slow", Ping { n }).await) })
            })
            .collect();

        let mut sent = Vec::new();
        for _ in 0..8 {
            sent.push(harness.next_sent().await);
        }
        for envelope in sent.into_iter().rev() {
            let n = envelope.payload["n"].as_u64().unwrap();
            harness.deliver(Envelope::call_result(
                "slow",
                envelope.correlation_id.unwrap(),
                json!(n * 10),
            ));
        }

        for call in calls {
            let (n, result) = call.await.unwrap();
            assert_eq!(result.unwrap(), n * 10);
        }
    }

    #[tokio::test]
    async fn test_orphaned_response_ignored() {
        let harness = Harness::new(BridgeConfig::default());
        harness.deliver(Envelope::call_result("ping", CorrelationId(999), json!(1)));
        assert_eq!(harness.core.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_drops_pending_and_ignores_late_response() {
        let mut harness = Harness::new(BridgeConfig::default());
        let err = harness
            .core
            .call_with_timeout::<_, Value>("slow", json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
        assert_eq!(harness.core.pending_count(), 0);

        let sent = harness.next_sent().await;
        harness.deliver(Envelope::call_result("slow", sent.correlation_id.unwrap(), json!(1)));
        assert_eq!(harness.core.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_decode_mismatch_reported() {
        let mut harness = Harness::new(BridgeConfig::default());
        let core = harness.core.clone();
        let call = tokio::spawn(async move { core.call::<_, u64>("ping", json!({})).await });

        let sent = harness.next_sent().await;
        harness.deliver(Envelope::call_result("ping", sent.correlation_id.unwrap(), json!("five")));

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_registered_handler_answers_call() {
        let mut harness = Harness::new(BridgeConfig::default());
        harness
            .core
            .register_call("ping", |params: Ping| async move { Ok::<_, String>(params.n + 1) })
            .unwrap();

        harness.deliver(Envelope::call("ping", CorrelationId(3), json!({ "n": 4 })));

        let reply = harness.next_sent().await;
        assert_eq!(reply.kind, EnvelopeKind::CallResult);
        assert_eq!(reply.correlation_id, Some(CorrelationId(3)));
        assert_eq!(reply.payload, json!(5));
    }

    #[tokio::test]
    async fn test_duplicate_register_call_rejected() {
        let harness = Harness::new(BridgeConfig::default());
        harness
            .core
            .register_call("ping", |_: Value| async move { Ok::<_, String>(()) })
            .unwrap();

        let err = harness
            .core
            .register_call("ping", |_: Value| async move { Ok::<_, String>(()) })
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateHandler(_)));
    }

    #[tokio::test]
    async fn test_unregistered_call_answered_with_error() {
        let mut harness = Harness::new(BridgeConfig::default());
        harness.deliver(Envelope::call("missing", CorrelationId(1), json!({})));

        let reply = harness.next_sent().await;
        assert_eq!(reply.kind, EnvelopeKind::CallError);
        assert_eq!(reply.payload["message"], "No handler registered for 'missing'");
    }

    #[tokio::test]
    async fn test_panicking_handler_answered_with_error() {
        let mut harness = Harness::new(BridgeConfig::default());
        harness
            .core
            .register_call("crash", |_: Value| async move {
                if true {
                    panic!("handler bug");
                }
                Ok::<_, String>(())
            })
            .unwrap();

        harness.deliver(Envelope::call("crash", CorrelationId(1), json!({})));

        let reply = harness.next_sent().await;
        assert_eq!(reply.kind, EnvelopeKind::CallError);
        assert_eq!(reply.payload["message"], "Handler for 'crash' panicked");
    }

    #[tokio::test]
    async fn test_handler_panicking_before_its_future_answered_with_error() {
        let mut harness = Harness::new(BridgeConfig::default());
        harness
            .core
            .register_call("crash", |_: Value| -> std::future::Ready<Result<(), String>> {
                panic!("handler bug")
            })
            .unwrap();

        harness.deliver(Envelope::call("crash", CorrelationId(7), json!({})));

        let reply = harness.next_sent().await;
        assert_eq!(reply.kind, EnvelopeKind::CallError);
        assert_eq!(reply.correlation_id, Some(CorrelationId(7)));
        assert_eq!(reply.payload["message"], "Handler for 'crash' panicked");
    }

    #[tokio::test]
    async fn test_refused_dispatcher_leaves_bridge_uninitialized() {
        let transport: Arc<dyn Transport> = Arc::new(FnTransport::new(|_| {}, |_| {}));
        let first = BridgeCore::default();
        first.setup(Arc::clone(&transport)).unwrap();

        let second = BridgeCore::default();
        let err = second.setup(transport).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Transport(TransportError::DispatcherAlreadySet)
        ));
        assert_eq!(second.state(), BridgeState::Uninitialized);
        assert_eq!(second.transport_name(), None);

        let err = second.call::<_, Value>("ping", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotReady));

        second.setup_with(|_| {}, |_| {}).unwrap();
        assert!(second.state().is_ready());
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_last_handle_dropped_releases_transport() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(Arc::clone(&released));
        let core = BridgeCore::new(BridgeConfig {
            reject_pending_on_uncaught_exception: true,
            ..Default::default()
        });
        core.setup_with(
            move |_| {
                let _keep = &flag;
            },
            |_| {},
        )
        .unwrap();

        let weak = core.downgrade();
        let captured = core.downgrade();
        core.register_call("alive", move |_: Value| {
            let alive = captured.upgrade().is_some();
            async move { Ok::<_, String>(alive) }
        })
        .unwrap();
        assert!(weak.upgrade().is_some());

        drop(core);

        assert!(released.load(Ordering::SeqCst));
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_events_reach_listeners() {
        let harness = Harness::new(BridgeConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener: TypedListener<String> = {
            let seen = Arc::clone(&seen);
            Arc::new(move |message| seen.lock().push(message))
        };
        harness.core.listen_typed(BridgeEvent::Message, &listener);

        harness.deliver(Envelope::event("message", json!("one")));
        harness.core.remove_listener(BridgeEvent::Message, &listener);
        harness.deliver(Envelope::event("message", json!("two")));

        assert_eq!(*seen.lock(), vec!["one".to_string()]);
        assert_eq!(harness.core.listener_count(BridgeEvent::Message), 0);
    }

    #[tokio::test]
    async fn test_trigger_event_sends_event_envelope() {
        let mut harness = Harness::new(BridgeConfig::default());
        harness.core.trigger_event(BridgeEvent::Message, "hello");

        let sent = harness.next_sent().await;
        assert_eq!(sent.kind, EnvelopeKind::Event);
        assert_eq!(sent.event, "message");
        assert_eq!(sent.payload, json!("hello"));
    }

    #[tokio::test]
    async fn test_uncaught_exception_rejects_pending_when_enabled() {
        let mut harness = Harness::new(BridgeConfig {
            reject_pending_on_uncaught_exception: true,
            ..Default::default()
        });
        let core = harness.core.clone();
        let call = tokio::spawn(async move { core.call::<_, Value>("slow", json!({})).await });
        harness.next_sent().await;

        harness.deliver(Envelope::event(
            BridgeEvent::UncaughtException.as_str(),
            json!({ "message": "worker died" }),
        ));

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::WorkerCrashed(ref reason) if reason == "worker died"));
    }

    #[tokio::test]
    async fn test_uncaught_exception_leaves_pending_by_default() {
        let mut harness = Harness::new(BridgeConfig::default());
        let core = harness.core.clone();
        let _call = tokio::spawn(async move { core.call::<_, Value>("slow", json!({})).await });
        harness.next_sent().await;

        harness.deliver(Envelope::event(
            BridgeEvent::UncaughtException.as_str(),
            json!({ "message": "worker died" }),
        ));
        assert_eq!(harness.core.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_call_and_log_never_rejects() {
        let mut harness = Harness::new(BridgeConfig {
            call_and_log_timeout_ms: Some(20),
            ..Default::default()
        });
        harness.core.call_and_log("fire", json!({ "x": 1 }));

        let sent = harness.next_sent().await;
        assert_eq!(sent.event, "fire");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(harness.core.pending_count(), 0);
    }

    #[test]
    fn test_error_message_variants() {
        assert_eq!(error_message(&json!({ "message": "boom" })), "boom");
        assert_eq!(error_message(&json!("boom")), "boom");
        assert_eq!(error_message(&json!(42)), "42");
    }
}
