use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use havefits_core::validator::rejected_names_diagnostic;
use havefits_core::BatchCoordinator;

mod terminal_sink;
use terminal_sink::TerminalStatusSink;

#[derive(Parser)]
#[command(name = "havefits", about = "Fetch a list of FITS files from a base URL")]
struct Args {
    /// Base URL the file names are relative to
    #[arg(short, long)]
    base_url: String,

    /// File with one FITS file name per line
    #[arg(short = 'f', long)]
    names_file: Option<PathBuf>,

    /// FITS file names
    names: Vec<String>,

    /// Download folder (defaults to $HAVEFITS_DOWNLOAD_DIR)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print a JSON summary of the batch when it finishes
    #[arg(long)]
    json: bool,
}

/// Names from the names file followed by the positional ones, trimmed, with
/// blank lines dropped.
fn collect_names(args: &Args) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    if let Some(path) = &args.names_file {
        let text = std::fs::read_to_string(path)?;
        names.extend(text.lines().map(str::to_string));
    }
    names.extend(args.names.iter().cloned());
    Ok(names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let names = match collect_names(&args) {
        Ok(names) => names,
        Err(e) => {
            eprintln!("Error: could not read names file: {}", e);
            return ExitCode::from(2);
        }
    };

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| std::env::var("HAVEFITS_DOWNLOAD_DIR").ok().map(PathBuf::from));

    let sink = Arc::new(TerminalStatusSink::new());
    let coordinator = match BatchCoordinator::new(sink.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(dir) = output_dir {
        coordinator.set_destination_directory(dir).await;
    }

    let start = Instant::now();
    let receipt = match coordinator.submit_batch(&args.base_url, &names).await {
        Ok(receipt) => receipt,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    sink.set_total(receipt.dispatched);

    if let Some(diagnostic) = rejected_names_diagnostic(&receipt.rejected) {
        eprintln!("{}", diagnostic);
    }

    coordinator.wait_until_idle().await;
    sink.finish();

    let snapshot = coordinator.snapshot().await;
    if args.json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: could not encode summary: {}", e),
        }
    } else {
        println!(
            "{} downloaded, {} failed, {} errors in {:.2}s",
            snapshot.succeeded,
            snapshot.remote_failures,
            snapshot.errors,
            start.elapsed().as_secs_f64()
        );
    }

    if snapshot.remote_failures + snapshot.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
