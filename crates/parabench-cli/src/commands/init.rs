//! Init - Default Configuration Writer
//!
//! @version 0.1.0
//! @author `Parabench` Development Team

use std::fs;

use parabench::TrainConfig;

use super::utils::print_success;
use crate::cli::InitArgs;
use crate::error::{CliError, CliResult};

/// Execute the `init` command
pub fn execute(args: InitArgs) -> CliResult<()> {
    if args.path.exists() && !args.force {
        return Err(CliError::Config(format!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        )));
    }
    let content = toml::to_string_pretty(&TrainConfig::default())?;
    fs::write(&args.path, content)?;
    print_success(&format!("Wrote default configuration to {}", args.path.display()));
    Ok(())
}
