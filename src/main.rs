use clap::Parser;

use paintfe_core::cli::{self, CliArgs};
use paintfe_core::logger;

fn main() -> std::process::ExitCode {
    let args = CliArgs::parse();

    // --list-ops only prints; everything else gets a session log.
    if !args.list_ops {
        logger::init(args.log.as_deref());
    }

    cli::run(args)
}
