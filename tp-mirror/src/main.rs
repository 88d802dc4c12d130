//! tp-mirror - Main entry point
//!
//! `tp-mirror <update|restore|clean> <target>`

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tp_mirror::backup::{CleanOutcome, RestoreOutcome};
use tp_mirror::layout::MirrorLayout;
use tp_mirror::resolve::{StrategyChoice, TreeResolver};
use tp_mirror::transfer::{ConsoleProgress, LogProgress, ProgressSink};
use tp_mirror::{config, utils, MirrorSession, Operation, SessionOutcome, Settings, TargetConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Mirror target platform", long_about = None)]
struct Args {
    /// update: update the current target platform. restore: restore the previous
    /// target platform. clean: remove a backup left by an aborted update.
    operation: String,

    /// The target platform to use
    target: String,

    /// Directory holding the urls/account files and the mirrors
    #[arg(long, env = "TP_MIRROR_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of download workers (overrides settings, 0 = all cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Resolution strategy: auto, metadata or listing
    #[arg(long)]
    strategy: Option<String>,

    /// Log progress instead of drawing a progress bar
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let home = match args.home {
        Some(home) => home,
        None => config::default_home()?,
    };

    // Load configuration
    let mut settings = Settings::load(&home)?;
    if let Some(workers) = args.workers {
        settings.download.workers = workers;
    }
    if let Some(strategy) = &args.strategy {
        settings.resolve.strategy = strategy.parse::<StrategyChoice>()?;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&settings.log.level);
    utils::logger::init(log_level)?;

    // Nothing below may touch the mirror until the operation and target are known
    let operation: Operation = args.operation.parse()?;
    let target = TargetConfig::load(&home, &args.target)?;
    let name = target.name.clone();

    tracing::info!(
        "Starting tp-mirror v{} ({} {} from {})",
        env!("CARGO_PKG_VERSION"),
        operation,
        name,
        target.root_url
    );

    let resolver = TreeResolver::from_choice(settings.resolve.strategy);
    let session =
        MirrorSession::new(target, MirrorLayout::new(&home), settings).with_resolver(resolver);

    let signals = (operation == Operation::Update).then(|| session.interrupts().install());

    let mut progress: Box<dyn ProgressSink> = if args.no_progress {
        Box::new(LogProgress::new())
    } else {
        Box::new(ConsoleProgress::new())
    };

    let outcome = session.run(operation, progress.as_mut()).await;
    if let Some(handle) = signals {
        handle.abort();
    }

    match outcome? {
        SessionOutcome::Updated(summary) => {
            println!("Updated {}: {} files downloaded", name, summary.files)
        }
        SessionOutcome::Interrupted(RestoreOutcome::Restored) => {
            println!("Update of {} interrupted, restored backup", name)
        }
        SessionOutcome::Interrupted(RestoreOutcome::NothingToRestore) => {
            println!("Update of {} interrupted, no backup to restore", name)
        }
        SessionOutcome::Restored(RestoreOutcome::Restored) => {
            println!("Restored backup for {}", name)
        }
        SessionOutcome::Restored(RestoreOutcome::NothingToRestore) => {
            println!("No backup available for {}", name)
        }
        SessionOutcome::Cleaned(CleanOutcome::Removed) => println!("Backup for {} removed", name),
        SessionOutcome::Cleaned(CleanOutcome::NothingToClean) => {
            println!("No backup for {} available", name)
        }
    }

    Ok(())
}
