mod args;
mod tab;

use clap::Parser;
use log::LevelFilter;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    if let Err(e) = tab::run_election_cli(&args) {
        eprintln!("An error occured: {}", e);
        std::process::exit(1);
    }
}
