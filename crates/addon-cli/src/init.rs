use addon_common::settings::Settings;

use crate::error::AddonCliResult;

/// Reads the settings snapshot once, after `.env` has been applied to the environment.
pub fn init_config() -> AddonCliResult<Settings> {
    let settings = Settings::from_env()?;
    Ok(settings)
}
