//! rosterlink daemon: entry point for running the bridge.

use anyhow::Context;
use clap::Parser;
use rosterlink_node::{init_logging, BridgeConfig, BridgeNode, LogFormat};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rosterlink-daemon",
    about = "Keeps a chat community's verified role in sync with a media server's users"
)]
struct Cli {
    /// Media server base URL.
    #[arg(long, env = "ROSTERLINK_MEDIA_SERVER_URL")]
    media_server_url: Option<String>,

    /// Media server API key.
    #[arg(long, env = "ROSTERLINK_MEDIA_SERVER_TOKEN", hide_env_values = true)]
    media_server_token: Option<String>,

    /// Chat REST API base URL.
    #[arg(long, env = "ROSTERLINK_CHAT_API_URL")]
    chat_api_url: Option<String>,

    /// Chat bot token.
    #[arg(long, env = "ROSTERLINK_CHAT_TOKEN", hide_env_values = true)]
    chat_token: Option<String>,

    /// Community id (looked up from the claim channel when omitted).
    #[arg(long, env = "ROSTERLINK_GUILD_ID")]
    guild_id: Option<u64>,

    /// Role that marks verified members.
    #[arg(long, env = "ROSTERLINK_VERIFIED_ROLE_ID")]
    verified_role_id: Option<u64>,

    /// Channel where members post claims.
    #[arg(long, env = "ROSTERLINK_CLAIM_CHANNEL_ID")]
    claim_channel_id: Option<u64>,

    /// JSON file holding the verification mapping.
    #[arg(long, env = "ROSTERLINK_MAPPING_FILE")]
    mapping_file: Option<PathBuf>,

    /// Seconds between reconciliation cycles.
    #[arg(long, env = "ROSTERLINK_RECONCILE_INTERVAL_SECS")]
    reconcile_interval_secs: Option<u64>,

    /// Deadline in seconds for each remote call.
    #[arg(long, env = "ROSTERLINK_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Members requested per roster page (at most 1000).
    #[arg(long, env = "ROSTERLINK_ROSTER_PAGE_SIZE")]
    roster_page_size: Option<usize>,

    /// Roster size beyond which a fetch is treated as possibly truncated.
    #[arg(long, env = "ROSTERLINK_MAX_ROSTER_SIZE")]
    max_roster_size: Option<usize>,

    /// Seconds between claim channel polls.
    #[arg(long, env = "ROSTERLINK_CLAIM_POLL_INTERVAL_SECS")]
    claim_poll_interval_secs: Option<u64>,

    /// Serve /metrics and /health.
    #[arg(long, env = "ROSTERLINK_ENABLE_STATUS_SERVER")]
    status_server: bool,

    /// Status server port.
    #[arg(long, env = "ROSTERLINK_STATUS_PORT")]
    status_port: Option<u16>,

    /// Log format: "human" or "json".
    #[arg(long, env = "ROSTERLINK_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "ROSTERLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "ROSTERLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the bridge until SIGINT or SIGTERM.
    Run,
    /// Validate the merged configuration and print it with secrets hidden.
    CheckConfig,
}

impl Cli {
    /// File settings first, then env vars and flags on top.
    fn into_config(self) -> anyhow::Result<(BridgeConfig, Command)> {
        let mut config = match &self.config {
            Some(path) => {
                let path_str = path.to_string_lossy();
                BridgeConfig::from_toml_file(&path_str)
                    .with_context(|| format!("loading {}", path.display()))?
            }
            None => BridgeConfig::default(),
        };

        if let Some(v) = self.media_server_url {
            config.media_server_url = v;
        }
        if let Some(v) = self.media_server_token {
            config.media_server_token = v;
        }
        if let Some(v) = self.chat_api_url {
            config.chat_api_url = v;
        }
        if let Some(v) = self.chat_token {
            config.chat_token = v;
        }
        if self.guild_id.is_some() {
            config.guild_id = self.guild_id;
        }
        if let Some(v) = self.verified_role_id {
            config.verified_role_id = v;
        }
        if let Some(v) = self.claim_channel_id {
            config.claim_channel_id = v;
        }
        if let Some(v) = self.mapping_file {
            config.mapping_file = v;
        }
        if let Some(v) = self.reconcile_interval_secs {
            config.reconcile_interval_secs = v;
        }
        if let Some(v) = self.request_timeout_secs {
            config.request_timeout_secs = v;
        }
        if let Some(v) = self.roster_page_size {
            config.roster_page_size = v;
        }
        if let Some(v) = self.max_roster_size {
            config.max_roster_size = v;
        }
        if let Some(v) = self.claim_poll_interval_secs {
            config.claim_poll_interval_secs = v;
        }
        config.enable_status_server |= self.status_server;
        if let Some(v) = self.status_port {
            config.status_port = v;
        }
        if let Some(v) = self.log_format {
            config.log_format = v;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }

        Ok((config, self.command))
    }
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, command) = Cli::parse().into_config()?;

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    match command {
        Command::CheckConfig => {
            config.validate()?;
            println!("{config:#?}");
        }
        Command::Run => {
            let status_port = if config.enable_status_server {
                config.status_port.to_string()
            } else {
                "off".into()
            };
            tracing::info!(
                media_server = %config.media_server_url,
                mapping_file = %config.mapping_file.display(),
                interval_secs = config.reconcile_interval_secs,
                status_port = %status_port,
                "starting rosterlink bridge"
            );

            let mut node = BridgeNode::new(config).await?;
            node.start().await?;

            tracing::info!("shutdown signal received, stopping bridge");
            node.stop().await?;

            tracing::info!("rosterlink daemon exited cleanly");
        }
    }

    Ok(())
}
