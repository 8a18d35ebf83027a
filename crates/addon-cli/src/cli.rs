use addon_common::{metadata::LevelFilter, util::tracing::setup_tracing};
use clap::Parser;
use info::InfoArgs;

use crate::{error::AddonCliResult, init::init_config};

mod crd;
mod info;
mod run;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[clap(
        short('l'),
        long,
        global = true,
        env = "LOG_LEVEL",
        value_name("LEVEL"),
        default_value("info")
    )]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Parser, Clone)]
pub enum Command {
    #[command(about = "Run the GPU add-on operator")]
    Run(run::RunArgs),
    #[command(about = "Print the custom resource definitions as YAML")]
    Crd(crd::CrdArgs),
    #[command(about = "Show version and build information")]
    Info(InfoArgs),
}

pub async fn exec() -> AddonCliResult {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    setup_tracing(Some(cli.log_level));

    match cli.cmd {
        Command::Run(args) => run::run(args, init_config()?).await?,
        Command::Crd(args) => crd::run(args)?,
        Command::Info(args) => info::run(args)?,
    }
    Ok(())
}
