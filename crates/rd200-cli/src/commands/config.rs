//! Config command implementation.

use anyhow::Result;

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, mut config: Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", Config::path().display());
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            eprintln!("Set {} = {}", key, value);
        }
        ConfigAction::Unset { key } => {
            config.unset(&key)?;
            config.save()?;
            eprintln!("Unset {}", key);
        }
    }
    Ok(())
}
