use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use huemirror::bulb::{self, BulbClient};
use huemirror::presentation::{auto_label, StatusMessage, UiEvent};
use huemirror::registry::DeviceRegistry;
use huemirror::testing::SyntheticCamera;
use huemirror::{CameraBackend, ColorSample, MirrorConfig, MirrorPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "huemirror")]
#[command(about = "Mirror the dominant camera color onto a smart bulb")]
#[command(version)]
struct Cli {
    /// Config file (default: ./huemirror.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the detection pipeline until Ctrl-C
    Run {
        /// Camera id to use (from 'huemirror devices')
        #[arg(short, long)]
        device: Option<String>,

        /// Start with auto mode on
        #[arg(short, long)]
        auto: bool,

        /// Use a synthetic camera showing this color, e.g. 200,100,50
        #[arg(long, value_parser = parse_color)]
        synthetic: Option<ColorSample>,
    },

    /// Send one color to the bulb
    #[command(allow_negative_numbers = true)]
    Send { red: i64, green: i64, blue: i64 },
}

fn parse_color(value: &str) -> Result<ColorSample, String> {
    let channels: Vec<i64> = value
        .split(',')
        .map(|part| part.trim().parse::<i64>().map_err(|e| format!("{}: {}", part, e)))
        .collect::<Result<_, _>>()?;
    match channels.as_slice() {
        [r, g, b] => ColorSample::try_from_channels(*r, *g, *b),
        _ => Err("expected R,G,B".to_string()),
    }
}

fn camera_backend(synthetic: Option<ColorSample>) -> Result<Arc<dyn CameraBackend>> {
    if let Some(color) = synthetic {
        return Ok(Arc::new(SyntheticCamera::with_device("synthetic", color)));
    }
    native_backend()
}

#[cfg(feature = "native")]
fn native_backend() -> Result<Arc<dyn CameraBackend>> {
    Ok(Arc::new(huemirror::NativeCamera::new()))
}

#[cfg(not(feature = "native"))]
fn native_backend() -> Result<Arc<dyn CameraBackend>> {
    anyhow::bail!("built without camera support; rebuild with --features native or pass --synthetic R,G,B")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    huemirror::init_logging();
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(MirrorConfig::default_path);
    let config = MirrorConfig::load_layered(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    match cli.command {
        Commands::Devices { json } => list_devices(json).await,
        Commands::Run {
            device,
            auto,
            synthetic,
        } => run(config, device, auto, synthetic).await,
        Commands::Send { red, green, blue } => send(config, red, green, blue).await,
    }
}

async fn list_devices(json: bool) -> Result<()> {
    let devices = DeviceRegistry::new(native_backend()?).list_devices().await?;
    if json {
        println!("{}", serde_json::to_string(&devices)?);
    } else if devices.is_empty() {
        println!("{}", huemirror::pipeline::NO_CAMERAS_MESSAGE);
    } else {
        for d in &devices {
            println!("{}: {}", d.id, d.label);
        }
    }
    Ok(())
}

async fn run(
    mut config: MirrorConfig,
    device: Option<String>,
    auto: bool,
    synthetic: Option<ColorSample>,
) -> Result<()> {
    if device.is_some() {
        config.camera.preferred_device = device;
    }
    let camera = camera_backend(synthetic)?;
    let client = bulb::from_config(&config.bulb, &config.sync)?;
    log::info!("Sending colors to {}", client.describe());

    let mut printer = EventPrinter::new(config.presentation.status_hide());
    let (pipeline, mut events) = MirrorPipeline::new(config, camera, client);
    pipeline.start().await;
    if auto {
        pipeline.set_auto(true);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => printer.print(&event, Utc::now()),
                None => break,
            },
        }
    }

    pipeline.shutdown().await;
    Ok(())
}

/// Terminal rendering of the event stream
struct EventPrinter {
    status_hide: Duration,
    last_color: Option<ColorSample>,
}

impl EventPrinter {
    fn new(status_hide: Duration) -> Self {
        Self {
            status_hide,
            last_color: None,
        }
    }

    fn print(&mut self, event: &UiEvent, now: DateTime<Utc>) {
        match event {
            // Only print color changes, detection runs at frame rate
            UiEvent::ColorDetected(color) => {
                if self.last_color != Some(*color) {
                    println!("{}  ({})", color, color.css());
                    self.last_color = Some(*color);
                }
            }
            UiEvent::Status(status) => {
                if let Some(line) = self.status_line(status, now) {
                    println!("{}", line);
                }
            }
            UiEvent::SendControl { state } => log::debug!("{}", state.label()),
            UiEvent::AutoMode { enabled } => println!("{}", auto_label(*enabled)),
            UiEvent::CameraReady { device_id } => {
                println!("Camera ready: {}", device_id.as_deref().unwrap_or("default"))
            }
            UiEvent::CameraDisconnected { .. } => {}
        }
    }

    /// `None` once the status would already have been hidden
    fn status_line(&self, status: &StatusMessage, now: DateTime<Utc>) -> Option<String> {
        if !status.is_visible_at(now, self.status_hide) {
            log::debug!("Dropping expired status: {}", status.text);
            return None;
        }
        let tag = if status.is_error() { "error" } else { "ok" };
        Some(format!("[{}] {}", tag, status.text))
    }
}

async fn send(config: MirrorConfig, red: i64, green: i64, blue: i64) -> Result<()> {
    let color = ColorSample::try_from_channels(red, green, blue).map_err(|e| anyhow!(e))?;
    let client = bulb::from_config(&config.bulb, &config.sync)?;
    let reply = client.submit(color).await?;
    println!(
        "{}",
        reply
            .message
            .unwrap_or_else(|| huemirror::sync::DEFAULT_SUCCESS_MESSAGE.to_string())
    );
    Ok(())
}
