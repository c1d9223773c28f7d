mod cli;

use std::process::ExitCode;

use clap::Parser;
use hairlinefe::logger;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Session log (overwrites the previous run's log)
    logger::init();
    logger::set_echo(args.verbose);

    cli::run(args)
}
