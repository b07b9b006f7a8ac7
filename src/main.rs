//! `jpc` entry point.

use clap::Parser as ClapParser;

use jpc::cli::Cli;

fn main() {
    let cli = Cli::parse();
    std::process::exit(jpc::cli::run_cli(cli));
}
