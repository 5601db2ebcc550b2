use anyhow::Result;
use emrecon_core::config::RefineConfig;

/// Print a default `RefineConfig` as TOML to stdout, for the user to
/// copy and edit before a `refine` run.
pub fn run() -> Result<()> {
    let config = RefineConfig::default();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
