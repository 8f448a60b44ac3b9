mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Logging is initialized once the CLI is parsed: verbosity comes from flags.
    if let Err(err) = CliCommand::run_from_args().await {
        tracing::error!("{:#}", err);
        eprintln!("hprobe error: {:#}", err);
        std::process::exit(1);
    }
}
