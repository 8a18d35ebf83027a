use addon_operator::version::build_info;
use clap::Parser;

use crate::error::AddonCliResult;

#[derive(Parser, Debug, Clone)]
pub struct InfoArgs {}

pub fn run(_args: InfoArgs) -> AddonCliResult<()> {
    println!("{}", build_info());
    Ok(())
}
