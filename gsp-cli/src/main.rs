//! GSP CLI - normalize per-site power-meter exports into one aligned dataset.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "gsp-cli",
    version,
    about = "Grid supply point power data toolkit"
)]
struct Cli {
    #[command(subcommand)]
    command: gsp_cmd::Command,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("gsp-cli {}", env!("CARGO_PKG_VERSION"));
    gsp_cmd::run(cli.command)
}
