use clap::Parser;
use std::process;
use tracing::Level;

mod cli;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    let level = if args.quiet {
        Level::ERROR
    } else {
        match args.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    if let Err(e) = cli::run(args).await {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}
