// Educational single-node UTXO blockchain - CLI entry point

use clap::Parser;
use tinychain::cli::{Cli, CliHandler};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let handler = CliHandler::new("./data");

    if let Err(e) = handler.run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
