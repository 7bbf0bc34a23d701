extern crate clap;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::Colorize;
use log::{error, info};
use realtime_network::bridge::{serve_json_lines, Command, NetworkPlugin, Response};
use realtime_network::config::EngineConfig;
use realtime_network::connectivity::ReachabilitySource;
use realtime_network::errors::{exit_codes, ProbeError};
use realtime_network::events::{ChannelSink, Event};
use realtime_network::probes::FixedCarrier;
use realtime_network::snapshot::NetworkSnapshot;
use realtime_network::transport::client::HttpTransport;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

static VERSION: LazyLock<String> = LazyLock::new(|| {
    match option_env!("REALTIME_NETWORK_BUILD_GIT_HASH") {
        Some(hash) => format!("{} (rev {})", env!("CARGO_PKG_VERSION"), hash),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
});

#[derive(Parser)]
#[command(author, version = VERSION.as_str(), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Mode>,

    #[command(flatten)]
    endpoints: Endpoints,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[derive(Subcommand)]
enum Mode {
    /// Run one measurement and print it (default)
    Run {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Measure repeatedly until interrupted
    Listen {
        /// Seconds between measurement cycles
        #[arg(long, default_value_t = 10)]
        interval: u64,
        /// Print each snapshot as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Report connectivity changes until interrupted
    Watch {
        /// Seconds between reachability checks
        #[arg(long, default_value_t = 5)]
        period: u64,
    },
    /// Serve the host bridge as JSON lines on stdin / stdout
    Bridge,
}

#[derive(Args)]
struct Endpoints {
    /// Carrier / ISP name to report
    #[arg(long, global = true)]
    isp: Option<String>,
    /// Endpoint for round trip samples
    #[arg(long, global = true)]
    latency_url: Option<String>,
    /// Endpoint serving the download payload
    #[arg(long, global = true)]
    download_url: Option<String>,
    /// Endpoint accepting the upload payload
    #[arg(long, global = true)]
    upload_url: Option<String>,
    /// Public IP echo endpoint
    #[arg(long, global = true)]
    ip_url: Option<String>,
}

impl Endpoints {
    fn engine_config(&self) -> Result<EngineConfig, ProbeError> {
        let mut config = EngineConfig::default();
        if let Some(url) = &self.latency_url {
            config = config.with_latency_url(url)?;
        }
        if let Some(url) = &self.download_url {
            config = config.with_download_url(url)?;
        }
        if let Some(url) = &self.upload_url {
            config = config.with_upload_url(url)?;
        }
        if let Some(url) = &self.ip_url {
            config = config.with_identity_url(url)?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let config = match cli.endpoints.engine_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".bold().red(), e);
            return exit_codes::CONFIG_ERROR;
        }
    };

    let transport = match HttpTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            eprintln!("{} {}", "Error:".bold().red(), e);
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let mode = cli.command.unwrap_or(Mode::Run { json: false });
    let period = match mode {
        Mode::Watch { period } => Duration::from_secs(period.max(1)),
        _ => Duration::from_secs(5),
    };

    let signals = Arc::new(
        ReachabilitySource::new(transport.clone(), config.latency.url.clone(), period)
            .with_timeout(config.latency.timeout),
    );
    let (sink, events) = ChannelSink::new();
    let plugin = Arc::new(NetworkPlugin::new(
        transport,
        Arc::new(FixedCarrier(cli.endpoints.isp.clone())),
        signals,
        Arc::new(sink),
        &config,
        Handle::current(),
    ));

    let result = match mode {
        Mode::Run { json } => run_once(&plugin, json).await,
        Mode::Listen { interval, json } => listen(&plugin, events, interval, json).await,
        Mode::Watch { .. } => watch(&plugin, events).await,
        Mode::Bridge => bridge(plugin.clone(), events).await,
    };

    plugin.detach();

    match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            error!("{}", e);
            exit_codes::RUNTIME_ERROR
        }
    }
}

async fn run_once(plugin: &NetworkPlugin, json: bool) -> std::io::Result<()> {
    let Response::Snapshot(snapshot) = plugin.dispatch(Command::RunTest).await else {
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }

    Ok(())
}

async fn listen(
    plugin: &NetworkPlugin,
    mut events: UnboundedReceiver<Event>,
    interval: u64,
    json: bool,
) -> std::io::Result<()> {
    plugin
        .dispatch(Command::StartListening { interval_seconds: Some(interval) })
        .await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted");
                break;
            }
            Some(event) = events.recv() => {
                if let Event::NetworkStats(snapshot) = event {
                    if json {
                        println!("{}", serde_json::to_string(&snapshot)?);
                    } else {
                        print_snapshot_line(&snapshot);
                    }
                }
            }
        }
    }

    plugin.dispatch(Command::StopListening).await;
    Ok(())
}

async fn watch(
    plugin: &NetworkPlugin,
    mut events: UnboundedReceiver<Event>,
) -> std::io::Result<()> {
    plugin.dispatch(Command::StartConnectivityListening).await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted");
                break;
            }
            Some(event) = events.recv() => {
                if let Event::ConnectivityChanged(connected) = event {
                    let state = if connected {
                        "connected".bright_green()
                    } else {
                        "disconnected".bright_red()
                    };
                    println!("{} {}", timestamp().dimmed(), state);
                }
            }
        }
    }

    plugin.dispatch(Command::StopConnectivityListening).await;
    Ok(())
}

/// JSON-lines bridge on stdin / stdout until the input closes or the
/// process is interrupted.
async fn bridge(
    plugin: Arc<NetworkPlugin>,
    events: UnboundedReceiver<Event>,
) -> std::io::Result<()> {
    let input = BufReader::new(tokio::io::stdin());

    tokio::select! {
        served = serve_json_lines(plugin, events, input, tokio::io::stdout()) => served,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted");
            Ok(())
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_snapshot(snapshot: &NetworkSnapshot) {
    println!(
        "{} {}",
        "Your IP:".bold().white(),
        display_or(&snapshot.public_ip, "unavailable").bright_blue()
    );
    println!("{} {}", "ISP:".bold().white(), snapshot.isp_name.bright_blue());
    println!("{} {} ms", "Latency:".bold().white(), snapshot.ping_ms);
    println!("{} {} ms", "Jitter:".bold().white(), snapshot.jitter_ms);
    println!(
        "{} {}",
        "Download speed:".bold().white(),
        format!("{:.2} Mbps", snapshot.download_speed_mbps).bright_cyan()
    );
    println!(
        "{} {}",
        "Upload speed:".bold().white(),
        format!("{:.2} Mbps", snapshot.upload_speed_mbps).bright_cyan()
    );
}

fn print_snapshot_line(snapshot: &NetworkSnapshot) {
    println!(
        "{} down {} up {} ping {} ms jitter {} ms {}",
        timestamp().dimmed(),
        format!("{:.2} Mbps", snapshot.download_speed_mbps).bright_cyan(),
        format!("{:.2} Mbps", snapshot.upload_speed_mbps).bright_cyan(),
        snapshot.ping_ms,
        snapshot.jitter_ms,
        display_or(&snapshot.public_ip, "-").bright_blue()
    );
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
