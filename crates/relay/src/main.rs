//! Relay binary.
//!
//! ```bash
//! relay --config relay.yaml
//! RELAY_PROFILE=production relay
//! relay --config relay.yaml --check
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use relay::runtime::RuntimeBuilder;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file; searched in the current directory if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, overrides RELAY_PROFILE
    #[arg(short, long)]
    profile: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

impl Args {
    fn builder(&self) -> RuntimeBuilder {
        let mut builder = RuntimeBuilder::new().with_user_config_dir();
        if let Some(path) = &self.config {
            builder = builder.config_file(path);
        }
        if let Some(profile) = &self.profile {
            builder = builder.profile(profile);
        }
        builder
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.check {
        let config = args
            .builder()
            .load_config()
            .context("configuration is invalid")?;
        println!(
            "Configuration OK: {} network(s) as {}",
            config.networks.len(),
            config.nickname
        );
        return Ok(());
    }

    let runtime = args.builder().build().context("failed to start relay")?;
    info!(
        nickname = %runtime.config().nickname,
        networks = runtime.config().networks.len(),
        "Relay starting"
    );
    runtime.run().await?;

    Ok(())
}
