use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use db::{DataStoreEmulator, StoreSlot};
use events::{EventBus, EventBusEmulator};
use orchestrator::{
    CloseOutcome, ConfigResolver, Sandbox, ServiceLifecycleCoordinator, StartMode, StartParams,
};
use server::GatewayStarter;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const START_COMMAND: &str = "start";

#[derive(Parser)]
#[command(name = "sandbox")]
#[command(about = "Run a cloud application's services locally", long_about = None)]
#[command(version)]
struct Cli {
    /// Suppress the startup report
    #[arg(short, long)]
    quiet: bool,

    #[arg(long, default_value = "extended")]
    mode: StartMode,

    /// Project root (defaults to the current directory)
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Sandbox options, e.g. `-p 4000`, `port 4000`, `verbose`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    options: Vec<String>,
}

impl Cli {
    /// Option tokens with a leading `start` command removed.
    fn start_options(&self) -> Vec<String> {
        match self.options.split_first() {
            Some((first, rest)) if first == START_COMMAND => rest.to_vec(),
            _ => self.options.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = cli.start_options();
    init_tracing(ConfigResolver::is_verbose(&options));

    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    let bus = EventBus::new();
    let store = StoreSlot::new();
    let services = ServiceLifecycleCoordinator::new(
        Arc::new(DataStoreEmulator::new(store.clone())),
        Arc::new(EventBusEmulator::new(bus.clone(), store.clone())),
        Arc::new(GatewayStarter::new(bus, store)),
    );
    let sandbox = Sandbox::builder(services).build();

    // Ctrl-C cancels startup between steps, and afterwards shuts down.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut session = sandbox
        .start(StartParams {
            options,
            port: None,
            project_dir,
            quiet: cli.quiet,
            mode: cli.mode,
            cancel: Some(cancel.clone()),
        })
        .await
        .context("Sandbox failed to start")?;

    if !cli.quiet {
        println!();
        println!("  Started HTTP gateway @ http://localhost:{}", session.port());
        println!();
        println!("Press Ctrl+C to stop");
        println!();
    }

    cancel.cancelled().await;
    tracing::info!("Shutting down sandbox");

    match session.close().await.context("Sandbox did not shut down cleanly")? {
        CloseOutcome::Closed { handles } => tracing::debug!(handles, "All subsystems closed"),
        CloseOutcome::AlreadyClosed => {}
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "sandbox=info,orchestrator=debug,server=info,events=info,db=info,tower_http=info"
    } else {
        "sandbox=info,orchestrator=info,server=info,events=info,db=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
