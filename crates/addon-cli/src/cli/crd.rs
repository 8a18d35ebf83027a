use addon_operator::operator::crd::{GpuAddon, Monitoring};
use clap::Parser;
use kube::CustomResourceExt;

use crate::error::AddonCliResult;

#[derive(Parser, Debug, Clone)]
pub struct CrdArgs {}

pub fn render() -> AddonCliResult<String> {
    let addon = serde_yaml::to_string(&GpuAddon::crd())?;
    let monitoring = serde_yaml::to_string(&Monitoring::crd())?;
    Ok(format!("{addon}---\n{monitoring}"))
}

pub fn run(_args: CrdArgs) -> AddonCliResult<()> {
    print!("{}", render()?);
    Ok(())
}
