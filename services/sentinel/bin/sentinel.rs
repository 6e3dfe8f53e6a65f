//! Main entrypoint for the Sentinel console monitor.
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and the command line.
//! 2. Opening the Gemini Live session.
//! 3. Starting the selected audio source once the session is up.
//! 4. Reporting risk verdicts and reacting to console commands until shutdown.

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use gemini_live::{LiveClient, LiveEvent, RiskAssessment};
use sentinel::{config::Config, monitor::Monitor};
use sentinel_audio::{AudioSource, MicrophoneSource, SimulatedSource};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Capture from an input device.
    Live,
    /// Loop a pre-recorded PCM16 16 kHz mono asset.
    Demo,
}

#[derive(Debug, Parser)]
#[command(version, about = "Real-time fraud risk monitor for call audio")]
struct Cli {
    /// Audio source started once the session is connected.
    #[arg(long, value_enum, default_value_t = Mode::Live)]
    mode: Mode,
    /// Input device name for live mode; the default device when omitted.
    #[arg(long)]
    device: Option<String>,
    /// Raw PCM asset for demo mode.
    #[arg(long)]
    asset: Option<PathBuf>,
    /// Print the available input devices and exit.
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    fn source(&self, mode: Mode) -> anyhow::Result<Box<dyn AudioSource>> {
        let source: Box<dyn AudioSource> = match mode {
            Mode::Live => Box::new(MicrophoneSource::new(self.device.clone())),
            Mode::Demo => {
                let asset = self
                    .asset
                    .as_ref()
                    .context("--asset is required for demo mode")?;
                Box::new(SimulatedSource::new(asset))
            }
        };
        Ok(source)
    }
}

async fn switch(monitor: &mut Monitor, cli: &Cli, mode: Mode) {
    let source = match cli.source(mode) {
        Ok(source) => source,
        Err(e) => {
            warn!(error = %e, "Cannot start audio source");
            return;
        }
    };
    if let Err(e) = monitor.switch_to(source).await {
        warn!(error = %e, "Failed to start audio source");
    }
}

fn report(assessment: &RiskAssessment, threshold: i32) {
    if assessment.is_danger(threshold) {
        warn!(
            risk_level = assessment.risk_level,
            reason = %assessment.reason,
            "DANGER: likely fraud in progress"
        );
    } else {
        info!(
            risk_level = assessment.risk_level,
            reason = %assessment.reason,
            "Risk update"
        );
    }
}

/// Stops audio and asks the session to close. Returns `true` when no
/// `Disconnected` event will follow.
async fn shutdown(client: &LiveClient, monitor: &mut Monitor) -> bool {
    monitor.stop().await;
    client.disconnect().await.is_err()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let cli = Cli::parse();
    if cli.list_devices {
        for name in MicrophoneSource::list_devices().context("Failed to enumerate input devices")? {
            println!("{name}");
        }
        return Ok(());
    }
    let config = Config::from_env().context("Failed to load configuration")?;
    if cli.mode == Mode::Demo && cli.asset.is_none() {
        bail!("--asset is required for demo mode");
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!(mode = ?cli.mode, "Configuration loaded. Starting Sentinel...");

    // --- 3. Open the Session ---
    let live_config = config
        .to_live_config()
        .context("Failed to build session configuration")?;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let client = LiveClient::new(live_config, Arc::new(events_tx));
    let mut monitor = Monitor::new(Arc::new(client.clone()));
    client.connect().context("Failed to start the session")?;

    // --- 4. Run until the session ends ---
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(LiveEvent::Connected) => {
                    info!("Session connected. Commands: live, demo, stop, quit");
                    switch(&mut monitor, &cli, cli.mode).await;
                }
                Some(LiveEvent::RiskAnalysis(assessment)) => {
                    report(&assessment, config.danger_threshold);
                }
                Some(LiveEvent::Error(message)) => error!(error = %message, "Session error"),
                Some(LiveEvent::Disconnected) | None => {
                    monitor.stop().await;
                    info!("Session closed.");
                    break;
                }
            },
            line = commands.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "live" => switch(&mut monitor, &cli, Mode::Live).await,
                    "demo" => switch(&mut monitor, &cli, Mode::Demo).await,
                    "stop" => monitor.stop().await,
                    "quit" => {
                        if shutdown(&client, &mut monitor).await {
                            break;
                        }
                    }
                    "" => {}
                    other => warn!(command = other, "Unknown command. Expected live, demo, stop or quit"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "Failed to read console input");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal. Shutting down gracefully...");
                if shutdown(&client, &mut monitor).await {
                    break;
                }
            }
        }
    }

    Ok(())
}
