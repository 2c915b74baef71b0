//! volguard CLI Application

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use volguard_core::domain::audio::{notification_channel, percent, Scope};
use volguard_core::domain::{Config, ConfigError, Controller, DEFAULT_PROXY_MARKER};
use volguard_infra::audio::{Pactl, PulseAudioSubsystem};

#[derive(Parser)]
#[command(name = "volguard")]
#[command(about = "Clamp an audio device's volume back to a safe default", long_about = None)]
struct Cli {
    /// Audio device to monitor. Quote the name if it contains spaces
    #[arg(required_unless_present = "list_devices")]
    target_device_name: Option<String>,

    /// Volume to set the device to, between 0 and 1
    #[arg(required_unless_present = "list_devices")]
    default_volume: Option<f32>,

    /// Reset to the default volume whenever the device exceeds this
    #[arg(required_unless_present = "list_devices")]
    dangerous_volume: Option<f32>,

    /// Channel to change the volume for (use 0 in most cases)
    #[arg(required_unless_present = "list_devices")]
    channel: Option<u32>,

    /// Scope to apply to when changing the volume
    /// (output, global, input, main, playthrough or wildcard)
    #[arg(required_unless_present = "list_devices", value_parser = Scope::from_str)]
    scope: Option<Scope>,

    /// Name substring identifying the pass-through proxy device
    #[arg(long, default_value = DEFAULT_PROXY_MARKER)]
    proxy_marker: String,

    /// Print the current output devices as JSON lines and exit
    #[arg(long)]
    list_devices: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Result<Config, ConfigError> {
        let (Some(name), Some(default_volume), Some(dangerous_volume), Some(channel), Some(scope)) = (
            self.target_device_name.as_deref(),
            self.default_volume,
            self.dangerous_volume,
            self.channel,
            self.scope,
        ) else {
            Cli::command()
                .error(ErrorKind::MissingRequiredArgument, "all five positional arguments are required")
                .exit()
        };

        Config::new(name, default_volume, dangerous_volume, channel, scope)?
            .with_proxy_marker(self.proxy_marker.as_str())
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// One-shot listing; no event monitor is started
fn list_devices(pactl: &Pactl) -> anyhow::Result<()> {
    let default_sink = pactl.default_sink_name()?;
    for sink in pactl.sinks()? {
        let line = serde_json::json!({
            "id": sink.name,
            "name": sink.description,
            "default": default_sink.as_deref() == Some(sink.name.as_str()),
        });
        println!("{}", line);
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list_devices {
        return list_devices(&Pactl::default()).context("Failed to list devices");
    }

    let config = match cli.config() {
        Ok(config) => config,
        Err(e) => Cli::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    info!("🔈 volguard starting...");
    info!(device = %config.target_device_name, "Target");
    info!(volume_pct = percent(config.default_volume), "Default volume");
    info!(volume_pct = percent(config.dangerous_volume), "Dangerous volume");
    info!(channel = config.channel, scope = %config.scope, "Control");
    info!(marker = %config.proxy_marker, "Proxy marker");

    let (tx, mut rx) = notification_channel();
    let audio = Arc::new(
        PulseAudioSubsystem::connect(tx).context("Failed to connect to the sound server")?,
    );

    let mut controller = Controller::new(audio, config);
    controller
        .start()
        .context("Failed to watch the device list")?;

    controller
        .run(&mut rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("volguard stopped");
    Ok(())
}
