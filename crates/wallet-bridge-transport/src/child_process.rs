//! Newline-delimited JSON over a byte stream, and the child process adapter
//! built on it.

use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, instrument};

use wallet_bridge_ipc::Envelope;

use crate::{DispatchSlot, Dispatcher, Transport, TransportError, TransportResult};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// What a line transport does when its input stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    /// Log and stop.
    Quiet,

    /// Dispatch a local `uncaughtException` event.
    ReportCrash,
}

/// Envelopes as one JSON document per line over any async byte stream.
pub struct LineTransport {
    name: &'static str,
    outbound: mpsc::UnboundedSender<String>,
    reader: Mutex<Option<BoxedReader>>,
    slot: Arc<DispatchSlot>,
    closed: Arc<Notify>,
    on_close: CloseBehavior,
    runtime: Handle,
}

impl LineTransport {
    /// Create a transport over `reader`/`writer`. Must be called inside a
    /// Tokio runtime; the writer task starts immediately.
    pub fn new<R, W>(
        name: &'static str,
        reader: R,
        writer: W,
        on_close: CloseBehavior,
    ) -> TransportResult<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let slot = Arc::new(DispatchSlot::new());

        runtime.spawn(write_loop(name, writer, outbound_rx, Arc::clone(&slot)));

        Ok(Self {
            name,
            outbound,
            reader: Mutex::new(Some(Box::new(reader))),
            slot,
            closed: Arc::new(Notify::new()),
            on_close,
            runtime,
        })
    }

    /// Worker side of a child process bridge: this process' stdin/stdout.
    pub fn stdio() -> TransportResult<Self> {
        Self::new(
            "stdio",
            tokio::io::stdin(),
            tokio::io::stdout(),
            CloseBehavior::Quiet,
        )
    }

    /// Resolves once the input stream has ended.
    pub async fn closed(&self) {
        self.closed.notified().await
    }
}

impl Transport for LineTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn send(&self, envelope: Envelope) {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                self.slot
                    .report_error(self.name, format!("Failed to encode '{}': {}", envelope.event, e));
                return;
            }
        };

        if self.outbound.send(text).is_err() {
            self.slot.report_error(
                self.name,
                format!("Output stream closed, '{}' not delivered", envelope.event),
            );
        }
    }

    fn on_receive(&self, dispatcher: Dispatcher) -> TransportResult<()> {
        self.slot.set(dispatcher)?;
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or(TransportError::DispatcherAlreadySet)?;

        self.runtime.spawn(read_loop(
            self.name,
            reader,
            Arc::clone(&self.slot),
            Arc::clone(&self.closed),
            self.on_close,
        ));

        Ok(())
    }
}

async fn write_loop<W>(
    name: &'static str,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<String>,
    slot: Arc<DispatchSlot>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = outbound.recv().await {
        line.push('\n');
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            slot.report_error(name, format!("Write failed: {e}"));
            break;
        }
    }
    debug!(transport = name, "Write loop stopped");
}

async fn read_loop(
    name: &'static str,
    reader: BoxedReader,
    slot: Arc<DispatchSlot>,
    closed: Arc<Notify>,
    on_close: CloseBehavior,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    slot.deliver_text(name, &line);
                }
            }
            Ok(None) => {
                info!(transport = name, "Input stream ended");
                if on_close == CloseBehavior::ReportCrash {
                    slot.report_crash(name, "Worker process exited");
                }
                break;
            }
            Err(e) => {
                slot.report_error(name, format!("Read failed: {e}"));
                if on_close == CloseBehavior::ReportCrash {
                    slot.report_crash(name, format!("Worker stream broken: {e}"));
                }
                break;
            }
        }
    }

    closed.notify_one();
}

/// Host side of a bridge to a child process running an embedded runtime.
pub struct ChildProcessTransport {
    lines: LineTransport,
    child: Mutex<Child>,
}

impl ChildProcessTransport {
    /// Spawn `command` with piped stdin/stdout. The child's stderr is
    /// inherited so its logs reach the host's terminal.
    #[instrument(name = "spawn_worker_process", skip(command))]
    pub fn spawn(mut command: Command) -> TransportResult<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or(TransportError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(TransportError::MissingPipe("stdout"))?;

        info!(pid = ?child.id(), "Worker process spawned");

        let lines = LineTransport::new("child-process", stdout, stdin, CloseBehavior::ReportCrash)?;

        Ok(Self {
            lines,
            child: Mutex::new(child),
        })
    }

    /// OS process id, if the child is still running.
    pub fn id(&self) -> Option<u32> {
        self.child.lock().id()
    }

    /// Ask the child to terminate.
    pub fn kill(&self) -> TransportResult<()> {
        self.child.lock().start_kill()?;
        Ok(())
    }

    /// Resolves once the child's output has closed.
    pub async fn closed(&self) {
        self.lines.closed().await
    }
}

impl Transport for ChildProcessTransport {
    fn name(&self) -> &'static str {
        self.lines.name()
    }

    fn send(&self, envelope: Envelope) {
        self.lines.send(envelope)
    }

    fn on_receive(&self, dispatcher: Dispatcher) -> TransportResult<()> {
        self.lines.on_receive(dispatcher)
    }
}
