//! Coinjar - command-line client for the device ledger.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use coinjar_client::{
    ActionOutcome, AutoConfirm, ClientConfig, ConfirmGate, Cue, FeedbackSink, HttpTransport,
    LedgerTransport, PollOutcome, Status, SyncSession, Tone, VersionPoller,
};
use coinjar_core::DeviceId;

/// Coinjar ledger client.
#[derive(Parser, Debug)]
#[command(name = "coinjar")]
#[command(about = "Add to, reset and watch a device's savings total", long_about = None)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,

    /// Device identifier (overrides COINJAR_DEVICE_ID).
    #[arg(long, short)]
    device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add an amount to the total.
    Add {
        /// Amount to add; must be a positive number.
        #[arg(allow_negative_numbers = true)]
        amount: f64,
    },
    /// Reset the total to zero.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    /// Print the current total and version.
    Show,
    /// Print the current version only.
    Version,
    /// Poll the version and print every change until interrupted.
    Watch {
        /// Poll interval in milliseconds (overrides COINJAR_POLL_INTERVAL_MS).
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

/// Feedback sink printing the status line to the terminal.
struct ConsoleFeedback;

impl FeedbackSink for ConsoleFeedback {
    fn status(&self, status: &Status) {
        match status.tone {
            Tone::Pending => eprintln!("{}", status.message),
            Tone::Positive => println!("{}", status.message),
            Tone::Negative => eprintln!("error: {}", status.message),
        }
    }

    fn cue(&self, cue: Cue) {
        if cue == Cue::Failure {
            // Terminal bell.
            eprint!("\x07");
        }
    }
}

/// Confirmation gate asking on stdin.
struct StdinConfirm;

#[async_trait]
impl ConfirmGate for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        print!("{prompt} [y/N] ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read confirmation");
                false
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env()?;
    let raw_device = args
        .device
        .or_else(|| config.device_id.clone())
        .ok_or_else(|| anyhow::anyhow!("no device: pass --device or set COINJAR_DEVICE_ID"))?;
    let device_id = DeviceId::parse(&raw_device)?;

    let transport: Arc<dyn LedgerTransport> =
        Arc::new(HttpTransport::new(&config.server_url, config.request_timeout)?);

    match args.command {
        Command::Add { amount } => {
            let session = build_session(device_id, transport, &config);
            finish(session.refresh().await)?;
            finish(session.increment(amount).await)?;
            println!("total {}", session.total());
        }
        Command::Reset { yes } => {
            let confirm: Arc<dyn ConfirmGate> = if yes {
                Arc::new(AutoConfirm(true))
            } else {
                Arc::new(StdinConfirm)
            };
            let session = build_session(device_id, transport, &config)
                .with_confirm_gate(confirm);
            finish(session.refresh().await)?;
            match session.reset().await {
                ActionOutcome::Declined => println!("Reset cancelled."),
                outcome => {
                    finish(outcome)?;
                    println!("total {}", session.total());
                }
            }
        }
        Command::Show => {
            let session = build_session(device_id, transport, &config);
            finish(session.refresh().await)?;
            match session.version() {
                Some(version) => println!("total {} (version {version})", session.total()),
                None => println!("total {}", session.total()),
            }
        }
        Command::Version => {
            let raw = transport.version(&device_id).await?;
            println!("{}", raw.trim());
        }
        Command::Watch { interval_ms } => {
            let interval = interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(config.poll_interval);
            watch(device_id, transport, interval, config.request_timeout).await;
        }
    }

    Ok(())
}

fn build_session(
    device_id: DeviceId,
    transport: Arc<dyn LedgerTransport>,
    config: &ClientConfig,
) -> SyncSession {
    SyncSession::new(device_id, transport)
        .with_feedback(Arc::new(ConsoleFeedback))
        .with_request_timeout(config.request_timeout)
}

/// Turn a failed action into a non-zero exit.
fn finish(outcome: ActionOutcome) -> anyhow::Result<()> {
    match outcome.error() {
        Some(error) => Err(anyhow::anyhow!("{error}")),
        None => Ok(()),
    }
}

async fn watch(
    device_id: DeviceId,
    transport: Arc<dyn LedgerTransport>,
    interval: Duration,
    request_timeout: Duration,
) {
    let running = Arc::new(AtomicBool::new(true));
    let stop = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            stop.store(false, Ordering::SeqCst);
        }
    });

    let mut poller = VersionPoller::new(device_id, transport)
        .with_interval(interval)
        .with_request_timeout(request_timeout);

    poller
        .run(running, |outcome| match outcome {
            PollOutcome::Advanced { state, .. } => {
                println!("total {} (version {})", state.total, state.version);
            }
            PollOutcome::Restarted { previous, state } => {
                println!(
                    "server restarted (version {previous} -> {}); total {}",
                    state.version, state.total
                );
            }
            PollOutcome::Unchanged { .. } => {}
        })
        .await;
}
