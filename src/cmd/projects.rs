//! `relay projects`

use anyhow::Result;
use relay::config::Config;

pub fn cmd_projects(config: &Config) -> Result<()> {
    config.require_projects()?;
    for (name, path) in &config.projects {
        println!("{}\t{}", name, path.display());
    }
    Ok(())
}
