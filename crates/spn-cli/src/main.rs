use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    channels::{self, ChannelsArgs},
    flow::{self, FlowArgs},
    mesons::{self, MesonsArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "spn", about = "Bootstrap meson spectroscopy on lattice correlators")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse the meson channels listed in a configuration.
    Mesons(MesonsArgs),
    /// List the built-in channel presets.
    Channels(ChannelsArgs),
    /// Bootstrap the gradient-flow scales w0 and sqrt(8 t0).
    Flow(FlowArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let filter = match &cli.command {
        Command::Mesons(args) if args.verbose => "debug",
        Command::Mesons(args) if args.silent => "warn",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .target(env_logger::Target::Stderr)
        .init();
    match cli.command {
        Command::Mesons(args) => mesons::run(&args),
        Command::Channels(args) => channels::run(&args),
        Command::Flow(args) => flow::run(&args),
    }
}
