//! Host bridge: commands in, responses and events out.
//!
//! The host names a method and passes loosely typed JSON arguments. Both
//! are parsed into a closed [`Command`] up front, so the dispatcher only
//! ever deals with commands it knows.

use crate::config::EngineConfig;
use crate::connectivity::{ConnectivityMonitor, SignalSource};
use crate::errors::BridgeError;
use crate::events::{Event, EventSink};
use crate::probes::{CarrierLookup, StatsAggregator};
use crate::scheduler::PollingScheduler;
use crate::snapshot::NetworkSnapshot;
use crate::transport::Transport;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;

/// Method names as the host sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum CommandName {
    StartListening,
    StopListening,
    RunTest,
    StartConnectivityListening,
    StopConnectivityListening,
}

/// A host request the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start polling. `None` means the configured default interval.
    StartListening { interval_seconds: Option<u64> },
    StopListening,
    /// One measurement cycle, answered directly.
    RunTest,
    StartConnectivityListening,
    StopConnectivityListening,
}

impl Command {
    /// Parse a method name and its arguments.
    ///
    /// The `interval` argument of `startListening` is lenient: a negative
    /// value becomes 0 (and is clamped by the scheduler), anything that is
    /// not a number falls back to the default.
    pub fn parse(method: &str, arguments: &Value) -> Result<Command, BridgeError> {
        let name: CommandName = serde_plain::from_str(method)
            .map_err(|_| BridgeError::NotImplemented(method.to_string()))?;

        Ok(match name {
            CommandName::StartListening => Command::StartListening {
                interval_seconds: parse_interval(arguments),
            },
            CommandName::StopListening => Command::StopListening,
            CommandName::RunTest => Command::RunTest,
            CommandName::StartConnectivityListening => {
                Command::StartConnectivityListening
            }
            CommandName::StopConnectivityListening => Command::StopConnectivityListening,
        })
    }
}

fn parse_interval(arguments: &Value) -> Option<u64> {
    let value = arguments.get("interval")?;
    if value.is_null() {
        return None;
    }

    if let Some(seconds) = value.as_u64() {
        Some(seconds)
    } else if value.as_i64().is_some() {
        Some(0)
    } else if let Some(seconds) = value.as_f64().filter(|s| s.is_finite()) {
        Some(seconds.max(0.0) as u64)
    } else {
        warn!("Ignoring malformed interval argument: {}", value);
        None
    }
}

/// Answer to a [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Void commands.
    Done,
    Snapshot(NetworkSnapshot),
}

impl Response {
    /// JSON form handed back to the host: `null` for void commands.
    pub fn into_value(self) -> Value {
        match self {
            Response::Done => Value::Null,
            Response::Snapshot(snapshot) => json!(snapshot),
        }
    }
}

/// The engine as the host sees it: one dispatcher over both pipelines.
pub struct NetworkPlugin {
    aggregator: Arc<StatsAggregator>,
    scheduler: PollingScheduler,
    monitor: ConnectivityMonitor,
    default_interval: Duration,
}

impl NetworkPlugin {
    pub fn new(
        transport: Arc<dyn Transport>,
        carrier: Arc<dyn CarrierLookup>,
        signals: Arc<dyn SignalSource>,
        sink: Arc<dyn EventSink>,
        config: &EngineConfig,
        runtime: Handle,
    ) -> Self {
        let aggregator = Arc::new(StatsAggregator::new(transport, carrier, config));
        let scheduler = PollingScheduler::new(aggregator.clone(), sink.clone(), runtime.clone())
            .with_min_interval(config.min_interval);
        let monitor = ConnectivityMonitor::new(signals, sink, runtime);

        Self {
            aggregator,
            scheduler,
            monitor,
            default_interval: config.default_interval,
        }
    }

    /// Execute one command.
    pub async fn dispatch(&self, command: Command) -> Response {
        debug!("Dispatching {:?}", command);

        match command {
            Command::StartListening { interval_seconds } => {
                let interval = interval_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(self.default_interval);
                self.scheduler.start(interval);
                Response::Done
            }
            Command::StopListening => {
                self.scheduler.stop();
                Response::Done
            }
            Command::RunTest => Response::Snapshot(self.aggregator.collect().await),
            Command::StartConnectivityListening => {
                self.monitor.start();
                Response::Done
            }
            Command::StopConnectivityListening => {
                self.monitor.stop();
                Response::Done
            }
        }
    }

    /// Parse and dispatch a raw host call. Unknown methods are rejected
    /// without touching any state.
    pub async fn handle_call(&self, method: &str, arguments: &Value) -> Result<Value, BridgeError> {
        let command = Command::parse(method, arguments).inspect_err(|e| {
            warn!("{}", e);
        })?;
        Ok(self.dispatch(command).await.into_value())
    }

    /// Host teardown: stop both pipelines.
    pub fn detach(&self) {
        info!("Detaching from host");
        self.scheduler.stop();
        self.monitor.stop();
    }

    pub fn is_listening(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn is_connectivity_listening(&self) -> bool {
        self.monitor.is_listening()
    }
}

impl Drop for NetworkPlugin {
    fn drop(&mut self) {
        self.detach();
    }
}

/// One line of host input.
#[derive(Debug, Deserialize)]
struct LineRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    arguments: Value,
}

/// Serve `plugin` as JSON lines: one request per input line, one answer or
/// event per output line.
///
/// Requests look like `{"id": 1, "method": "runTest", "arguments": {}}` and
/// are answered with `{"id": 1, "result": ...}` or `{"id": 1, "error": ...}`.
/// Each request runs on its own task, so a `stopListening` sent during a
/// `runTest` is answered without waiting for the measurement. Returns once
/// the input is closed and every request has been answered.
pub async fn serve_json_lines<R, W>(
    plugin: Arc<NetworkPlugin>,
    mut events: UnboundedReceiver<Event>,
    input: R,
    mut output: W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut pending = JoinSet::new();
    let mut input_open = true;

    while input_open || !pending.is_empty() {
        let message = tokio::select! {
            line = lines.next_line(), if input_open => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        let plugin = plugin.clone();
                        pending.spawn(async move { answer(&plugin, &line).await });
                    }
                    None => {
                        debug!("Bridge input closed, {} requests pending", pending.len());
                        input_open = false;
                    }
                }
                continue;
            }
            Some(joined) = pending.join_next() => match joined {
                Ok(answer) => answer,
                Err(e) => {
                    warn!("Bridge request task failed: {}", e);
                    continue;
                }
            },
            Some(event) = events.recv() => serde_json::to_value(&event)?,
        };

        write_line(&mut output, &message).await?;
    }

    Ok(())
}

async fn answer(plugin: &NetworkPlugin, line: &str) -> Value {
    let request: LineRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed bridge request: {}", e);
            return json!({"id": Value::Null, "error": "invalidRequest"});
        }
    };

    match plugin.handle_call(&request.method, &request.arguments).await {
        Ok(result) => json!({"id": request.id, "result": result}),
        Err(_) => json!({"id": request.id, "error": "notImplemented"}),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, message: &Value) -> io::Result<()> {
    let mut text = serde_json::to_string(message)?;
    text.push('\n');
    output.write_all(text.as_bytes()).await?;
    output.flush().await
}
