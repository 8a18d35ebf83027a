use addon_common::settings::Settings;
use addon_operator::RunOptions;
use clap::Parser;

use crate::error::AddonCliResult;

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Address the metrics endpoint would bind to
    #[arg(long, default_value = ":8080")]
    pub metrics_bind_address: String,

    /// Address the health probe endpoint binds to, `0` to disable
    #[arg(long, default_value = ":8081")]
    pub health_probe_bind_address: String,

    /// Enable leader election for the controller manager
    #[arg(long, default_value_t = false)]
    pub leader_elect: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        RunOptions {
            metrics_bind_address: args.metrics_bind_address,
            health_probe_bind_address: args.health_probe_bind_address,
            leader_elect: args.leader_elect,
        }
    }
}

pub async fn run(args: RunArgs, config: Settings) -> AddonCliResult<()> {
    addon_operator::operator(args.into(), config).await?;
    Ok(())
}
