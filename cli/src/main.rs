mod commands;

use anyhow::Result;
use clap::Parser;
use commands::backup::BackupCommand;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "stashbox",
    about = "Back up directories to object storage",
    long_about = "Stashbox zips each configured directory and uploads it, skipping the upload when an archive with the same contents is already stored"
)]
pub struct Cli {
    #[command(flatten)]
    backup: BackupCommand,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode", conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    info!("Starting Stashbox");

    let failures = cli.backup.run().await?;
    if failures != 0 {
        std::process::exit(failures);
    }
    Ok(())
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "stashbox={level},stashbox_core={level},stashbox_backends={level}"
        )))
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default subscriber failed");
}
