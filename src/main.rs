mod cli;
mod config;
mod engine;
mod imap;
mod logging;
mod session;
mod tree;

use std::process::ExitCode;

use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    logging::init(args.verbose, args.color());

    cli::run(args).await
}
