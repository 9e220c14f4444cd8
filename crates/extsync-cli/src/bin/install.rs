use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use extsync_cli::init_tracing;
use extsync_store::Processor;
use tracing::error;

/// Install and manage extension packages extracted from CI bundles.
#[derive(Parser)]
#[command(name = "extsync-install", version, about = "Extension package installer")]
struct Args {
    /// Source directory holding downloaded bundles
    #[arg(long)]
    source: PathBuf,
    /// Target install directory (holds the extension list)
    #[arg(long)]
    target: PathBuf,
    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.debug);

    let result = Processor::new(&args.source, &args.target).and_then(Processor::run);
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("installation failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
