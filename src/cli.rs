use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use zendroid_client::{ApiClient, RunController, SendOutcome};
use zendroid_core::{ChatEntry, EventReconciler, RunId, RunStatus};
use zendroid_settings::{TransportMode, ZendroidSettings};
use zendroid_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Debug, Parser)]
#[command(name = "zendroid", about = "Drive and watch AI-run Android app tests")]
pub struct Cli {
    /// Server base URL; overrides settings and ZENDROID_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Settings file (default: ~/.zendroid/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload an .apk and print its server-side path
    Upload {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Start a test run and follow it until it finishes
    Run(RunArgs),
    /// Print the current state of a run
    Status {
        #[arg(value_name = "RUN_ID")]
        run_id: String,
    },
}

#[derive(Debug, Args, Clone)]
struct RunArgs {
    /// Package path as known to the server, or a local file with --upload.
    #[arg(long)]
    apk: String,
    /// Natural-language test instructions.
    #[arg(long)]
    prompt: String,
    /// Upload --apk first and run against the uploaded copy.
    #[arg(long)]
    upload: bool,
    /// duplex or polling.
    #[arg(long)]
    transport: Option<TransportMode>,
    /// Keep the latest screenshot at this path.
    #[arg(long)]
    screenshot_out: Option<PathBuf>,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut settings = match &self.config {
            Some(path) => zendroid_settings::load_settings_from_path(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => zendroid_settings::load_settings().context("failed to load settings")?,
        };
        if let Some(base_url) = self.base_url {
            settings.server.base_url = base_url;
        }
        init_logging(&settings)?;

        match self.command {
            Command::Upload { file } => {
                let api = ApiClient::new(&settings.server)?;
                let receipt = api.upload(&file).await?;
                println!("{}", receipt.path);
                Ok(())
            }
            Command::Status { run_id } => print_status(&settings, RunId::from_raw(run_id)).await,
            Command::Run(args) => {
                if let Some(mode) = args.transport {
                    settings.transport.mode = mode;
                }
                follow_run(settings, args).await
            }
        }
    }
}

fn init_logging(settings: &ZendroidSettings) -> anyhow::Result<()> {
    let (config, rejected) = TelemetryConfig::from_settings(&settings.logging);
    init_telemetry(&config).context("failed to initialise logging")?;
    for level in rejected {
        warn!(level = %level, "ignoring invalid log level");
    }
    Ok(())
}

async fn print_status(settings: &ZendroidSettings, run_id: RunId) -> anyhow::Result<()> {
    let api = ApiClient::new(&settings.server)?;
    let snapshot = api
        .fetch_status(&run_id)
        .await
        .with_context(|| format!("failed to fetch run {run_id}"))?;

    let mut reconciler = EventReconciler::new();
    reconciler.apply_snapshot(&snapshot);
    for entry in reconciler.transcript().entries() {
        print_entry(entry);
    }
    println!("status: {}", snapshot.status.as_deref().unwrap_or("unknown"));
    Ok(())
}

async fn follow_run(settings: ZendroidSettings, args: RunArgs) -> anyhow::Result<()> {
    let mut ctl = RunController::new(settings)?;

    let apk_path = if args.upload {
        let receipt = ctl.api().upload(Path::new(&args.apk)).await?;
        info!(path = %receipt.path, "package uploaded");
        receipt.path
    } else {
        args.apk.clone()
    };

    let run_id = ctl.start(&apk_path, &args.prompt).await?;
    eprintln!("run {run_id} started");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut printed = 0;

    loop {
        tokio::select! {
            reduction = ctl.next() => {
                let Some(reduction) = reduction else { break };
                printed = print_since(&ctl, printed);
                if reduction.state_changed {
                    if let Some(out) = &args.screenshot_out {
                        save_screenshot(&ctl, out).await;
                    }
                }
                if reduction.gate_changed && ctl.gate().is_waiting() {
                    eprintln!("agent is waiting for your reply");
                }
                if is_finished(ctl.is_complete(), ctl.state().status) {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open => {
                match line.context("failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match ctl.reply(&line).await {
                        Ok(SendOutcome::Sent) => printed = print_since(&ctl, printed),
                        Ok(SendOutcome::NotConnected) => eprintln!("not connected, reply dropped"),
                        Ok(SendOutcome::Unsupported) => eprintln!("this transport cannot carry replies"),
                        Err(e) => eprintln!("{e}"),
                    },
                    None => stdin_open = false,
                }
            }
        }
    }

    let status = ctl.state().status;
    let complete = ctl.is_complete();
    ctl.shutdown().await;
    println!("status: {status}");
    if run_succeeded(complete, status) {
        Ok(())
    } else if complete {
        anyhow::bail!("run {run_id} ended with status {status}")
    } else {
        anyhow::bail!("session for run {run_id} ended before the run completed")
    }
}

// The agent's `complete` envelope may omit `status`; completion alone ends
// the run.
fn is_finished(complete: bool, status: RunStatus) -> bool {
    complete || status.is_terminal()
}

fn run_succeeded(complete: bool, status: RunStatus) -> bool {
    match status {
        RunStatus::Passed => true,
        RunStatus::Failed | RunStatus::Timeout => false,
        RunStatus::Idle | RunStatus::Running => complete,
    }
}

fn print_since(ctl: &RunController, printed: usize) -> usize {
    let fresh = ctl.transcript().since(printed);
    for entry in fresh {
        print_entry(entry);
    }
    printed + fresh.len()
}

fn print_entry(entry: &ChatEntry) {
    println!("[{}] {:<6} {}", entry.timestamp.format("%H:%M:%S"), entry.kind.as_str(), entry.text);
}

async fn save_screenshot(ctl: &RunController, out: &Path) {
    let Some(bytes) = ctl.state().screenshot_bytes() else {
        return;
    };
    if let Err(e) = tokio::fs::write(out, bytes).await {
        warn!(path = %out.display(), error = %e, "failed to write screenshot");
    }
}
