use clap::Parser;

mod cli;
mod commands;
mod exit_codes;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let debug = match &cli.command {
        cli::Command::Simulate(args) => args.debug,
        cli::Command::Control(args) => args.debug,
    };
    if let Err(e) = syncstream_runtime::telemetry::init(debug) {
        eprintln!("Error: {}", e);
        std::process::exit(exit_codes::CONFIG_ERROR);
    }

    let exit_code = match cli.command {
        cli::Command::Simulate(args) => commands::simulate::execute(args).await,
        cli::Command::Control(args) => commands::control::execute(args).await,
    };

    std::process::exit(exit_code);
}
